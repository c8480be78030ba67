//! courier sidecar binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use courier::broker::Session;
use courier::config::{load_config, Config};
use courier::dashboard::DashboardServer;
use courier::middleware::{self, MiddlewareChain};
use courier::observability::metrics;
use courier::proxy::{http_forwarder, ProxyServer};
use courier::stats::StatsRecorder;

#[derive(Parser)]
#[command(name = "courier")]
#[command(version, about = "Per-service sidecar bridging HTTP to asynchronous AMQP RPC")]
struct Cli {
    /// Configuration file to use (defaults apply without one).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace + envelope logging).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "courier=info",
        1 => "courier=debug",
        _ => "courier=trace,tower_http=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "courier starting");

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    tracing::info!(
        service = %config.service.name,
        broker_uri = %config.broker.uri,
        listen_port = config.http.listen_port,
        "configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "failed to parse metrics address"
            ),
        }
    }

    let stats = Arc::new(StatsRecorder::new());
    stats.clone().spawn_purge_task();

    let mut chain = MiddlewareChain::new();
    middleware::trace::install(&mut chain, stats.clone());
    if cli.verbose >= 2 {
        middleware::logger::install(&mut chain);
    }
    let chain = Arc::new(chain);

    let local_delivery = http_forwarder(&config.http.fwd_host);
    let session = Session::connect(
        config.broker.uri.clone(),
        config.service.name.clone(),
        chain.clone(),
        Some(local_delivery),
        stats.clone(),
    );
    session.wait_until_live().await;
    tracing::info!(broker_uri = %config.broker.uri, "connected to broker");

    if config.dashboard.enabled {
        let dashboard = DashboardServer::new(session.clone(), stats.clone(), &config);
        let addr = SocketAddr::from(([0, 0, 0, 0], config.dashboard.listen_port));
        let listener = TcpListener::bind(addr).await?;
        tokio::spawn(async move {
            if let Err(err) = dashboard.run(listener).await {
                tracing::error!(error = %err, "dashboard server failed");
            }
        });
    }

    let proxy = ProxyServer::new(session.clone(), chain, &config);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.listen_port));
    let listener = TcpListener::bind(addr).await?;
    proxy.run(listener).await?;

    session.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
