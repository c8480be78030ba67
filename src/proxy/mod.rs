//! HTTP proxy surface.
//!
//! # Data Flow
//! ```text
//! local producer
//!     → ANY /<service>/<path>   (server.rs)
//!     → envelope request → outgoing API → broker
//!     ← correlated response (or deadline) → HTTP response
//!
//! brokered request for this service
//!     → local delivery hook (forward.rs)
//!     → HTTP call on http.fwd_host
//!     ← reply converted back into a response envelope
//! ```

pub mod convert;
pub mod forward;
pub mod server;

pub use forward::http_forwarder;
pub use server::ProxyServer;
