//! courier: per-service sidecar bridging HTTP to asynchronous AMQP RPC.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                     COURIER                      │
//!                 │                                                  │
//!  local producer │  ┌───────┐   ┌──────────┐   ┌────────────────┐  │
//!  ───────────────┼─▶│ proxy │──▶│ outgoing │──▶│ publisher      │──┼──▶ req.<target>
//!                 │  └───────┘   │ API      │   └────────────────┘  │
//!                 │      ▲       └──────────┘                       │
//!                 │      │            │ append                      │
//!                 │      │       ┌──────────┐   ┌────────────────┐  │
//!  resp.<uuid> ───┼──────┴───────│ registry │◀──│ response       │◀─┼─── broker
//!                 │   correlate  └──────────┘   │ consumer       │  │
//!                 │                             └────────────────┘  │
//!                 │                                                  │
//!  req.<service> ─┼─▶┌────────────────┐   ┌─────────────────┐       │
//!                 │  │ request        │──▶│ local delivery  │───────┼──▶ local service
//!                 │  │ consumer       │◀──│ (HTTP forward)  │       │
//!                 │  └──────┬─────────┘   └─────────────────┘       │
//!                 │         └──▶ requester's response queue         │
//!                 │                                                  │
//!                 │  session supervisor · middleware · stats ·       │
//!                 │  dashboard · config · observability              │
//!                 └──────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod broker;
pub mod config;
pub mod envelope;

// Surfaces
pub mod dashboard;
pub mod proxy;

// Cross-cutting concerns
pub mod middleware;
pub mod observability;
pub mod stats;

pub use broker::{BrokerError, Session, SessionStatus};
pub use config::Config;
pub use middleware::MiddlewareChain;
pub use stats::StatsRecorder;
