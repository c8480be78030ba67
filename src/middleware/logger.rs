//! Debug logging at all four interception points.

use crate::middleware::MiddlewareChain;

/// Register debug-level log observers on every interception point.
pub fn install(chain: &mut MiddlewareChain) {
    chain.on_outgoing_request(|request| {
        tracing::debug!(
            endpoint = %request.endpoint,
            method = %request.method,
            request_id = %request.id,
            "outgoing request"
        );
    });
    chain.on_incoming_request(|request| {
        tracing::debug!(
            endpoint = %request.endpoint,
            method = %request.method,
            request_id = %request.id,
            requester = %request.service,
            "incoming request"
        );
    });
    chain.on_incoming_response(|response| {
        tracing::debug!(
            status_code = response.status_code,
            request_id = %response.request_id,
            "incoming response"
        );
    });
    chain.on_outgoing_response(|response| {
        tracing::debug!(
            status_code = response.status_code,
            request_id = %response.request_id,
            "outgoing response"
        );
    });
}
