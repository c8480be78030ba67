//! Local delivery: forward brokered requests to the real microservice.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::broker::{BrokerError, LocalDelivery};
use crate::envelope;
use crate::proxy::convert;

/// Build the local-delivery hook that turns an incoming request
/// envelope into an HTTP call against `fwd_host`.
pub fn http_forwarder(fwd_host: &str) -> LocalDelivery {
    let base = fwd_host.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();
    Arc::new(
        move |request| -> BoxFuture<'static, Result<envelope::Response, BrokerError>> {
            let client = client.clone();
            let base = base.clone();
            Box::pin(async move { forward(&client, &base, request).await })
        },
    )
}

async fn forward(
    client: &reqwest::Client,
    base: &str,
    request: envelope::Request,
) -> Result<envelope::Response, BrokerError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|_| BrokerError::unexpected(format!("invalid method {:?}", request.method)))?;
    let url = format!("{base}{}", request.endpoint);

    let mut builder = client.request(method, &url);
    for line in &request.headers {
        if let Some((name, value)) = envelope::split_header_line(line) {
            builder = builder.header(name, value);
        }
    }
    if !request.body.is_empty() {
        builder = builder.body(request.body.clone());
    }

    let reply = builder
        .send()
        .await
        .map_err(|err| BrokerError::unexpected(format!("local delivery failed: {err}")))?;

    let status_code = i32::from(reply.status().as_u16());
    let headers = convert::header_lines(reply.headers());
    let body = reply
        .bytes()
        .await
        .map_err(|err| BrokerError::unexpected(format!("local delivery body read failed: {err}")))?
        .to_vec();

    Ok(envelope::Response {
        request_id: request.id.clone(),
        status_code,
        headers,
        body,
    })
}
