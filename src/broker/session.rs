//! Broker session supervision.
//!
//! One session per sidecar process. The supervisor task owns the
//! connection lifecycle: it blocks on a connection-closed signal, dials
//! with infinite retry, regenerates the instance's response queue name,
//! and restarts both consumers. The bootstrap signal sent by
//! [`Session::connect`] drives the very first connection through the
//! same path as every reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::{mpsc, watch};

use crate::broker::error::BrokerError;
use crate::broker::registry::PendingRegistry;
use crate::broker::{publisher, request_consumer, response_consumer, topology, LocalDelivery};
use crate::middleware::MiddlewareChain;
use crate::observability::metrics;
use crate::stats::StatsRecorder;

const REDIAL_BACKOFF: Duration = Duration::from_secs(1);
const CLOSE_REPLY_CODE: u16 = 200;

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Live,
}

/// Connection state owned by the supervisor. `Live` holds the only
/// handle from which channels may be created.
pub(crate) enum ConnState {
    Disconnected,
    Connecting,
    Live {
        connection: Arc<Connection>,
        response_queue: String,
    },
}

pub(crate) struct SessionInner {
    pub(crate) uri: String,
    pub(crate) service_name: String,
    pub(crate) conn: RwLock<ConnState>,
    pub(crate) status_tx: watch::Sender<SessionStatus>,
    pub(crate) close_tx: mpsc::UnboundedSender<()>,
    pub(crate) closing: AtomicBool,
    pub(crate) registry: PendingRegistry,
    pub(crate) middleware: Arc<MiddlewareChain>,
    pub(crate) local_delivery: Option<LocalDelivery>,
    pub(crate) stats: Arc<StatsRecorder>,
}

/// Handle to a supervised broker session. Cloning is cheap; all clones
/// share the same connection, registry and consumers.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl Session {
    /// Start a session for `service_name` against the broker at `uri`.
    ///
    /// Returns immediately; the supervisor task dials in the background
    /// and keeps retrying every second until the broker accepts. Await
    /// [`Session::wait_until_live`] for readiness.
    pub fn connect(
        uri: impl Into<String>,
        service_name: impl Into<String>,
        middleware: Arc<MiddlewareChain>,
        local_delivery: Option<LocalDelivery>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Disconnected);
        let (close_tx, close_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SessionInner {
            uri: uri.into(),
            service_name: service_name.into(),
            conn: RwLock::new(ConnState::Disconnected),
            status_tx,
            close_tx: close_tx.clone(),
            closing: AtomicBool::new(false),
            registry: PendingRegistry::new(),
            middleware,
            local_delivery,
            stats,
        });

        tokio::spawn(supervise(inner.clone(), close_rx));
        // Bootstrap: the first connection is just a reconnect from
        // nothing.
        let _ = close_tx.send(());

        Self { inner }
    }

    /// Name of the service this sidecar represents.
    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Current supervisor state.
    pub fn status(&self) -> SessionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Wait until the session reaches `Live`.
    pub async fn wait_until_live(&self) {
        let mut status_rx = self.inner.status_tx.subscribe();
        let _ = status_rx
            .wait_for(|status| *status == SessionStatus::Live)
            .await;
    }

    /// This instance's current response queue name, if connected. The
    /// name changes on every reconnect.
    pub fn response_queue(&self) -> Option<String> {
        let state = self.inner.conn.read().expect("session state lock poisoned");
        match &*state {
            ConnState::Live { response_queue, .. } => Some(response_queue.clone()),
            _ => None,
        }
    }

    /// Open a fresh channel on the live connection.
    ///
    /// Fails with `unexpected` in any state other than `Live`; that
    /// failure is transient, the supervisor is already reconnecting.
    pub async fn create_channel(&self) -> Result<Channel, BrokerError> {
        let connection = {
            let state = self.inner.conn.read().expect("session state lock poisoned");
            match &*state {
                ConnState::Live { connection, .. } => connection.clone(),
                _ => {
                    return Err(BrokerError::unexpected(
                        "broker connection is not live",
                    ))
                }
            }
        };
        connection
            .create_channel()
            .await
            .map_err(|err| BrokerError::unexpected(format!("unable to create channel: {err}")))
    }

    /// Number of consumers on `service`'s request queue, i.e. how many
    /// sidecar instances currently serve it. Zero when the queue (or
    /// the connection) is unavailable.
    pub async fn service_instances(&self, service: &str) -> u32 {
        let Ok(channel) = self.create_channel().await else {
            return 0;
        };
        let passive = lapin::options::QueueDeclareOptions {
            passive: true,
            ..Default::default()
        };
        match channel
            .queue_declare(
                &topology::request_queue_name(service),
                passive,
                lapin::types::FieldTable::default(),
            )
            .await
        {
            Ok(queue) => queue.consumer_count(),
            Err(_) => 0,
        }
    }

    /// Drop the pending record for `id` without firing its
    /// continuation. Called by the outgoing caller when its deadline
    /// elapses; a response arriving later is dropped as unmatched.
    pub fn evict(&self, id: &str) {
        self.inner.registry.evict(id);
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }

    /// Tear down consumers and the connection. The supervisor exits and
    /// the session will not reconnect.
    pub async fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        // Wake the supervisor so it observes the closing flag.
        let _ = self.inner.close_tx.send(());

        let connection = {
            let state = self.inner.conn.read().expect("session state lock poisoned");
            match &*state {
                ConnState::Live { connection, .. } => Some(connection.clone()),
                _ => None,
            }
        };
        if let Some(connection) = connection {
            if let Err(err) = connection.close(CLOSE_REPLY_CODE, "client shutdown").await {
                tracing::debug!(error = %err, "broker connection close");
            }
        }

        *self.inner.conn.write().expect("session state lock poisoned") = ConnState::Disconnected;
        self.inner.status_tx.send_replace(SessionStatus::Disconnected);
    }
}

/// Supervisor loop. Each received signal means the connection is gone
/// (or never existed); each iteration produces a fresh connection with
/// fresh consumers. Never gives up.
async fn supervise(inner: Arc<SessionInner>, mut close_rx: mpsc::UnboundedReceiver<()>) {
    while close_rx.recv().await.is_some() {
        if inner.closing.load(Ordering::SeqCst) {
            break;
        }
        // Coalesce queued signals so one reconnect serves them all.
        while close_rx.try_recv().is_ok() {}

        *inner.conn.write().expect("session state lock poisoned") = ConnState::Connecting;
        inner.status_tx.send_replace(SessionStatus::Connecting);

        tracing::info!(uri = %inner.uri, "connecting to broker");
        let Some(connection) = dial_until_connected(&inner).await else {
            break;
        };
        metrics::record_reconnect();

        let connection = Arc::new(connection);
        {
            let close_tx = inner.close_tx.clone();
            connection.on_error(move |err| {
                tracing::warn!(error = %err, "broker connection error");
                let _ = close_tx.send(());
            });
        }

        let response_queue = topology::response_queue_name();
        *inner.conn.write().expect("session state lock poisoned") = ConnState::Live {
            connection: connection.clone(),
            response_queue: response_queue.clone(),
        };

        if let Err(err) =
            response_consumer::start(inner.clone(), connection.clone(), response_queue.clone())
                .await
        {
            tracing::error!(error = %err, "response consumer setup failed");
            continue; // wait for the next closed signal
        }
        if let Err(err) = request_consumer::start(inner.clone(), connection.clone()).await {
            tracing::error!(error = %err, "request consumer setup failed");
            continue;
        }

        inner.status_tx.send_replace(SessionStatus::Live);
        tracing::info!(
            service = %inner.service_name,
            response_queue = %response_queue,
            "broker session live"
        );
    }
}

async fn dial_until_connected(inner: &SessionInner) -> Option<Connection> {
    loop {
        if inner.closing.load(Ordering::SeqCst) {
            return None;
        }
        match Connection::connect(&inner.uri, ConnectionProperties::default()).await {
            Ok(connection) => return Some(connection),
            Err(err) => {
                tracing::warn!(error = %err, "broker dial failed, retrying");
                tokio::time::sleep(REDIAL_BACKOFF).await;
            }
        }
    }
}

/// Publish a response envelope back to the requester's response queue
/// on a dedicated short-lived channel. Failures are logged only: the
/// original delivery is acked regardless and the requester recovers by
/// timeout.
pub(crate) async fn publish_response_back(
    connection: &Connection,
    queue_name: &str,
    payload: &[u8],
    request_id: &str,
) {
    let channel = match connection.create_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            tracing::warn!(
                error = %err,
                request_id = %request_id,
                "unable to open channel for response publish"
            );
            return;
        }
    };
    match publisher::queue_exists(&channel, queue_name).await {
        Ok(true) => {}
        Ok(false) => {
            // Requester gone; it recovers by its own timeout.
            tracing::warn!(
                request_id = %request_id,
                response_queue = %queue_name,
                "response queue no longer exists"
            );
            return;
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                request_id = %request_id,
                "response queue inspection failed"
            );
            return;
        }
    }
    if let Err(err) = publisher::publish(&channel, queue_name, payload).await {
        tracing::warn!(
            error = %err,
            request_id = %request_id,
            response_queue = %queue_name,
            "response publish failed"
        );
        return;
    }
    if let Err(err) = channel.close(CLOSE_REPLY_CODE, "response published").await {
        tracing::debug!(error = %err, "response channel close");
    }
}
