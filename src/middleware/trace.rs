//! Statistics tracing.
//!
//! Records an incoming event per brokered request delivered to this
//! instance, keyed by the requester service. The outgoing counterpart is
//! recorded by the outgoing API itself at publish time.

use std::sync::Arc;

use crate::middleware::MiddlewareChain;
use crate::stats::{Direction, StatsRecorder};

pub fn install(chain: &mut MiddlewareChain, stats: Arc<StatsRecorder>) {
    chain.on_incoming_request(move |request| {
        stats.record(&request.service, Direction::Incoming);
    });
}
