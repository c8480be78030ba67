//! Observability subsystem.
//!
//! Structured logging goes through `tracing` at every call site; this
//! module holds the metrics side: a Prometheus exporter installed on
//! demand plus the counter helpers used by the proxy and the broker
//! session supervisor.

pub mod metrics;
