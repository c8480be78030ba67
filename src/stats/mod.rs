//! Per-service request statistics.
//!
//! # Data Flow
//! ```text
//! outgoing API / trace middleware
//!     → record(service, direction)   (append under write lock)
//!
//! dashboard
//!     → count_last_minute / per_service_last_minute   (read lock)
//!
//! purge task (60 s cadence)
//!     → drop events older than 10 minutes   (write lock)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Which side of the sidecar a request event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    value: u32,
    timestamp: i64,
    direction: Direction,
}

const COUNT_WINDOW_SECS: i64 = 60;
const RETENTION_SECS: i64 = 60 * 10;

/// Side-effect-free counter sink for request events, keyed by the
/// destination service.
#[derive(Default)]
pub struct StatsRecorder {
    events: RwLock<HashMap<String, Vec<Event>>>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request event against `service`.
    pub fn record(&self, service: &str, direction: Direction) {
        self.record_at(service, direction, now_unix());
    }

    fn record_at(&self, service: &str, direction: Direction, timestamp: i64) {
        let mut events = self.events.write().expect("stats lock poisoned");
        events.entry(service.to_string()).or_default().push(Event {
            value: 1,
            timestamp,
            direction,
        });
    }

    /// Number of `direction` events for `service` in the last minute.
    pub fn count_last_minute(&self, service: &str, direction: Direction) -> u32 {
        let cutoff = now_unix() - COUNT_WINDOW_SECS;
        let events = self.events.read().expect("stats lock poisoned");
        events
            .get(service)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| event.direction == direction && event.timestamp > cutoff)
                    .map(|event| event.value)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Last-minute counts for every known service.
    pub fn per_service_last_minute(&self, direction: Direction) -> HashMap<String, u32> {
        let services: Vec<String> = {
            let events = self.events.read().expect("stats lock poisoned");
            events.keys().cloned().collect()
        };
        services
            .into_iter()
            .map(|service| {
                let count = self.count_last_minute(&service, direction);
                (service, count)
            })
            .collect()
    }

    /// Drop events older than the retention window.
    pub fn purge_old_events(&self) {
        let cutoff = now_unix() - RETENTION_SECS;
        let mut events = self.events.write().expect("stats lock poisoned");
        for service_events in events.values_mut() {
            service_events.retain(|event| event.timestamp >= cutoff);
        }
        events.retain(|_, service_events| !service_events.is_empty());
    }

    /// Spawn the background purge loop.
    pub fn spawn_purge_task(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                tracing::debug!("purging old stat events");
                self.purge_old_events();
            }
        });
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
