//! Conversions between HTTP requests/responses and wire envelopes.

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;

use crate::envelope;

/// First path segment, the destination service name.
pub fn service_name_from_path(path: &str) -> Option<&str> {
    let segment = path.trim_start_matches('/').split('/').next()?;
    if segment.is_empty() {
        None
    } else {
        Some(segment)
    }
}

/// The path with its leading service segment removed, normalized to
/// start with `/`.
pub fn endpoint_from_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((_service, rest)) => format!("/{rest}"),
        None => "/".to_string(),
    }
}

/// Flatten an HTTP header map into envelope header lines, grouping
/// repeated names.
pub fn header_lines(headers: &HeaderMap) -> Vec<String> {
    headers
        .keys()
        .map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .collect();
            envelope::header_line(name.as_str(), &values)
        })
        .collect()
}

/// Apply envelope header lines onto an HTTP header map, skipping lines
/// that do not form a valid header.
pub fn apply_header_lines(lines: &[String], headers: &mut HeaderMap) {
    for line in lines {
        let Some((name, value)) = envelope::split_header_line(line) else {
            tracing::debug!(line = %line, "skipping malformed header line");
            continue;
        };
        match (HeaderName::from_str(name), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => {
                tracing::debug!(line = %line, "skipping unrepresentable header line");
            }
        }
    }
}
