//! Brokered async RPC core.
//!
//! # Data Flow
//! ```text
//! outgoing:
//!     proxy → outgoing API → publisher → req.<target> queue
//!     resp.<uuid> queue → response consumer → registry → continuation
//!
//! incoming:
//!     req.<service> queue → request consumer → local delivery hook
//!     → publisher → requester's response queue
//!
//! supervision:
//!     session supervisor owns the connection; on any closed signal it
//!     redials, regenerates the response queue, and restarts both
//!     consumers
//! ```
//!
//! # Design Decisions
//! - One session object per `connect()` instead of process globals;
//!   everything hangs off its `Arc`'d inner
//! - Publisher channels are never shared across parallel publishers;
//!   each publishing site owns its channel
//! - Pending correlations are in-memory only and do not survive a
//!   reconnect; callers recover via their own deadline

pub mod error;
pub mod outgoing;
pub mod publisher;
pub mod registry;
mod request_consumer;
mod response_consumer;
pub mod session;
pub mod topology;

use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::envelope;

pub use error::BrokerError;
pub use registry::{PendingRegistry, PendingRequest, ResponseCallback};
pub use session::{Session, SessionStatus};

/// Hook that delivers a brokered request to the local microservice and
/// returns its response. Injected by the proxy component.
pub type LocalDelivery = Arc<
    dyn Fn(envelope::Request) -> BoxFuture<'static, Result<envelope::Response, BrokerError>>
        + Send
        + Sync,
>;
