//! HTTP proxy server.
//!
//! # Responsibilities
//! - Accept any-method requests shaped `/<service>/<path>`
//! - Convert them into request envelopes and send them over the broker
//! - Enforce the per-request response deadline
//! - Honor `Discard-Response: Yes` as fire-and-forget

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request as HttpRequest, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::broker::{BrokerError, Session};
use crate::config::Config;
use crate::envelope;
use crate::middleware::MiddlewareChain;
use crate::observability::metrics;
use crate::proxy::convert;

/// Response header echoing the request id back to the local producer.
pub const COURIER_ID_HEADER: &str = "Courier-Id";

/// Request header marking a call as fire-and-forget.
pub const DISCARD_RESPONSE_HEADER: &str = "Discard-Response";

/// Application state injected into handlers.
#[derive(Clone)]
struct ProxyState {
    session: Session,
    middleware: Arc<MiddlewareChain>,
    receive_timeout: Duration,
}

/// HTTP proxy server: the outgoing half of the sidecar.
pub struct ProxyServer {
    router: Router,
}

impl ProxyServer {
    pub fn new(session: Session, middleware: Arc<MiddlewareChain>, config: &Config) -> Self {
        let state = ProxyState {
            session,
            middleware,
            receive_timeout: Duration::from_secs(config.message.receive_timeout_secs),
        };
        let router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http());
        Self { router }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "proxy server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("proxy server stopped");
        Ok(())
    }
}

async fn proxy_handler(
    State(state): State<ProxyState>,
    request: HttpRequest<Body>,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    let Some(service) = convert::service_name_from_path(&path).map(str::to_string) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            json!({ "error": "invalid service name" }),
        );
    };
    let endpoint = convert::endpoint_from_path(&path);
    let headers = convert::header_lines(request.headers());
    let discard = request
        .headers()
        .get(DISCARD_RESPONSE_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("yes"));

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("unreadable request body: {err}") }),
            )
        }
    };

    tracing::debug!(service = %service, endpoint = %endpoint, "new outgoing request");

    // A short-lived channel per call: a channel killed by the broker
    // then affects only this request.
    let channel = match state.session.create_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(error = %err, "channel creation failed");
            metrics::record_proxy_request(&service, "error");
            return error_response(StatusCode::BAD_REQUEST, err.as_json());
        }
    };

    let envelope_request = envelope::Request {
        id: String::new(),
        method,
        endpoint,
        headers,
        response_queue: if discard {
            String::new()
        } else {
            state.session.response_queue().unwrap_or_default()
        },
        body: body.to_vec(),
        service: state.session.service_name().to_string(),
    };

    if discard {
        let sent = state
            .session
            .send_and_forget(&channel, &service, envelope_request)
            .await;
        release_channel(channel).await;
        return match sent {
            Ok(()) => {
                metrics::record_proxy_request(&service, "discarded");
                StatusCode::CREATED.into_response()
            }
            Err(err) => {
                metrics::record_proxy_request(&service, "error");
                error_response(StatusCode::BAD_REQUEST, err.as_json())
            }
        };
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    let id = state
        .session
        .send_request(
            &channel,
            &service,
            envelope_request,
            Box::new(move |result| {
                let _ = reply_tx.send(result);
            }),
        )
        .await;
    // The channel's work ends at the publish; the response arrives on
    // the session's own consumer.
    release_channel(channel).await;

    match tokio::time::timeout(state.receive_timeout, reply_rx).await {
        Ok(Ok(Ok(response))) => {
            state.middleware.outgoing_response(&response);
            metrics::record_proxy_request(&service, "ok");
            envelope_to_http(&response)
        }
        Ok(Ok(Err(err))) => {
            tracing::warn!(error = %err, request_id = %id, "message response error");
            metrics::record_proxy_request(&service, "error");
            error_response(StatusCode::BAD_REQUEST, err.as_json())
        }
        Ok(Err(_dropped)) => {
            metrics::record_proxy_request(&service, "error");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                BrokerError::unexpected("response dispatch dropped").as_json(),
            )
        }
        Err(_elapsed) => {
            // Evict so a late response is dropped as unmatched instead
            // of firing a dead continuation.
            state.session.evict(&id);
            metrics::record_proxy_request(&service, "timeout");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "timeout" }))
        }
    }
}

async fn release_channel(channel: lapin::Channel) {
    // Already-dead channels (failed passive declare) refuse the close.
    if let Err(err) = channel.close(200, "request complete").await {
        tracing::debug!(error = %err, "request channel close");
    }
}

fn envelope_to_http(response: &envelope::Response) -> Response {
    let status = u16::try_from(response.status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut http_response = HttpResponse::new(Body::from(response.body.clone()));
    *http_response.status_mut() = status;
    convert::apply_header_lines(&response.headers, http_response.headers_mut());
    if let Ok(id) = response.request_id.parse() {
        http_response.headers_mut().insert(COURIER_ID_HEADER, id);
    }
    http_response
}

fn error_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
