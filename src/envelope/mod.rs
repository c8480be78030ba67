//! Wire envelopes exchanged over the broker.
//!
//! # Data Flow
//! ```text
//! outgoing side:
//!     HTTP request → Request envelope → encode → request queue
//!     response queue → decode → Response envelope → HTTP response
//!
//! incoming side:
//!     request queue → decode → Request envelope → local HTTP call
//!     local HTTP reply → Response envelope → encode → requester's
//!     response queue
//! ```
//!
//! # Design Decisions
//! - Field tags are frozen; they are the wire contract with every other
//!   sidecar instance and must never be renumbered
//! - Bodies are `bytes`, not `string`: same wire type, but arbitrary
//!   octets survive a round trip
//! - Header lines are flat `"Name: value; value2"` strings so the
//!   envelope stays free of any HTTP library type

use prost::Message;

/// A request addressed to another service's request queue.
///
/// An empty `response_queue` means the sender does not expect a
/// response.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Request {
    /// Unique request identifier; generated at send time when empty.
    #[prost(string, tag = "1")]
    pub id: String,
    /// HTTP verb, e.g. `GET`.
    #[prost(string, tag = "2")]
    pub method: String,
    /// Path on the destination service, e.g. `/users/42`.
    #[prost(string, tag = "3")]
    pub endpoint: String,
    /// Header lines in `"Name: value; value2"` form.
    #[prost(string, repeated, tag = "4")]
    pub headers: Vec<String>,
    /// Queue the response should be published to; empty for
    /// fire-and-forget.
    #[prost(string, tag = "5")]
    pub response_queue: String,
    #[prost(bytes = "vec", tag = "6")]
    pub body: Vec<u8>,
    /// Name of the originating service.
    #[prost(string, tag = "7")]
    pub service: String,
}

/// A response correlated back to a [`Request`] by `request_id`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Response {
    #[prost(string, tag = "1")]
    pub request_id: String,
    #[prost(int32, tag = "2")]
    pub status_code: i32,
    /// Header lines in `"Name: value"` form.
    #[prost(string, repeated, tag = "3")]
    pub headers: Vec<String>,
    #[prost(bytes = "vec", tag = "4")]
    pub body: Vec<u8>,
}

impl Request {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(buf)
    }
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(buf)
    }
}

/// Split a header line at the first `:`, trimming whitespace around the
/// value. Lines without a `:` are not header lines.
pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim(), value.trim()))
}

/// Build a header line from a name and its values.
pub fn header_line(name: &str, values: &[&str]) -> String {
    format!("{}: {}", name, values.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let request = Request {
            id: "abc-123".into(),
            method: "POST".into(),
            endpoint: "/orders".into(),
            headers: vec!["Content-Type: application/json".into()],
            response_queue: "resp.deadbeef".into(),
            body: b"{\"total\": 10}".to_vec(),
            service: "billing".into(),
        };
        let decoded = Request::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn response_round_trip() {
        let response = Response {
            request_id: "abc-123".into(),
            status_code: 404,
            headers: vec!["Content-Length: 0".into()],
            body: Vec::new(),
        };
        let decoded = Response::from_bytes(&response.to_bytes()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn body_admits_arbitrary_octets() {
        let request = Request {
            body: vec![0x00, 0xff, 0xfe, 0x80, 0x00],
            ..Default::default()
        };
        let decoded = Request::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(decoded.body, vec![0x00, 0xff, 0xfe, 0x80, 0x00]);
    }

    #[test]
    fn missing_fields_decode_to_zero_values() {
        let request = Request::from_bytes(&[]).unwrap();
        assert!(request.id.is_empty());
        assert!(request.headers.is_empty());
        assert!(request.response_queue.is_empty());

        let response = Response::from_bytes(&[]).unwrap();
        assert_eq!(response.status_code, 0);
        assert!(response.body.is_empty());
    }

    #[test]
    fn header_line_splits_on_first_colon_only() {
        let (name, value) = split_header_line("Referer: http://example.com/a").unwrap();
        assert_eq!(name, "Referer");
        assert_eq!(value, "http://example.com/a");

        assert!(split_header_line("not a header").is_none());
    }

    #[test]
    fn header_line_joins_values() {
        assert_eq!(
            header_line("Accept", &["text/html", "application/json"]),
            "Accept: text/html; application/json"
        );
    }
}
