//! Metrics collection and exposition.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("metrics server listening on http://{}", addr);
}

/// Count one proxied request by destination service and outcome.
pub fn record_proxy_request(service: &str, outcome: &'static str) {
    counter!(
        "courier_requests_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count one successful broker (re)connection.
pub fn record_reconnect() {
    counter!("courier_reconnects_total").increment(1);
}
