//! Dashboard service.
//!
//! A small JSON API next to the proxy: an overview of this instance,
//! last-minute request counts per service, and the active settings.

use std::io;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::broker::Session;
use crate::config::Config;
use crate::stats::{Direction, StatsRecorder};

#[derive(Clone)]
struct DashboardState {
    session: Session,
    stats: Arc<StatsRecorder>,
    settings: Value,
}

/// Dashboard HTTP server.
pub struct DashboardServer {
    router: Router,
}

impl DashboardServer {
    pub fn new(session: Session, stats: Arc<StatsRecorder>, config: &Config) -> Self {
        let state = DashboardState {
            session,
            stats,
            settings: settings_view(config),
        };
        let router = Router::new()
            .route("/", get(overview))
            .route("/stats/requests", get(request_stats))
            .route("/settings", get(settings))
            .with_state(state);
        Self { router }
    }

    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "dashboard server starting");
        axum::serve(listener, self.router).await
    }
}

async fn overview(State(state): State<DashboardState>) -> Json<Value> {
    let service = state.session.service_name().to_string();
    let instances = state.session.service_instances(&service).await;
    Json(json!({
        "service": service,
        "instances": instances,
        "process_id": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
        "incoming_requests": state.stats.per_service_last_minute(Direction::Incoming),
        "outgoing_requests": state.stats.per_service_last_minute(Direction::Outgoing),
    }))
}

async fn request_stats(State(state): State<DashboardState>) -> Json<Value> {
    Json(json!({
        "incoming": state.stats.per_service_last_minute(Direction::Incoming),
        "outgoing": state.stats.per_service_last_minute(Direction::Outgoing),
    }))
}

async fn settings(State(state): State<DashboardState>) -> Json<Value> {
    Json(state.settings.clone())
}

/// The config sections safe to expose. The broker section stays
/// private: its URI embeds credentials.
fn settings_view(config: &Config) -> Value {
    json!({
        "service": config.service,
        "http": config.http,
        "dashboard": config.dashboard,
        "message": config.message,
        "observability": config.observability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_view_never_exposes_the_broker_section() {
        let view = settings_view(&Config::default());
        assert!(view.get("broker").is_none());
        assert_eq!(view["service"]["name"], "my-service");
        assert_eq!(view["http"]["listen_port"], 8130);
        assert_eq!(view["dashboard"]["enabled"], true);
    }
}
