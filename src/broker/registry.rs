//! Pending request registry.
//!
//! Maps request id → pending continuation while an outgoing request is
//! in flight. A record lives here from just before a successful publish
//! until either its response dispatches the continuation or the caller's
//! deadline evicts it. Take is get-and-remove, so at most one
//! continuation fires per id.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::broker::error::BrokerError;
use crate::envelope;

/// Continuation invoked exactly once with the correlated response or an
/// error.
pub type ResponseCallback = Box<dyn FnOnce(Result<envelope::Response, BrokerError>) + Send>;

/// An outgoing request awaiting its response.
pub struct PendingRequest {
    pub request: Option<envelope::Request>,
    pub on_response: ResponseCallback,
}

#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<String, PendingRequest>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending record. Ids are caller-generated v4 uuids, so a
    /// duplicate is a caller bug, not an input condition.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered.
    pub fn append(&self, id: String, record: PendingRequest) {
        let mut entries = self.entries.lock().expect("pending registry mutex poisoned");
        match entries.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(record);
            }
            Entry::Occupied(slot) => {
                panic!("request id {:?} is already pending", slot.key());
            }
        }
    }

    /// Atomically remove and return the record for `id`.
    ///
    /// The lock is released before the caller runs the continuation.
    pub fn take(&self, id: &str) -> Option<PendingRequest> {
        let mut entries = self.entries.lock().expect("pending registry mutex poisoned");
        entries.remove(id)
    }

    /// Drop the record for `id` without invoking its continuation. Used
    /// by the outgoing caller on deadline expiry; unknown ids are a
    /// no-op.
    pub fn evict(&self, id: &str) {
        let mut entries = self.entries.lock().expect("pending registry mutex poisoned");
        entries.remove(id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("pending registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn noop_record() -> PendingRequest {
        PendingRequest {
            request: None,
            on_response: Box::new(|_| {}),
        }
    }

    #[test]
    fn take_removes_the_record() {
        let registry = PendingRegistry::new();
        registry.append("a".into(), noop_record());
        assert_eq!(registry.len(), 1);

        assert!(registry.take("a").is_some());
        assert!(registry.take("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn evict_is_silent_for_unknown_ids() {
        let registry = PendingRegistry::new();
        registry.evict("never-registered");
        registry.append("a".into(), noop_record());
        registry.evict("a");
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "already pending")]
    fn duplicate_append_panics() {
        let registry = PendingRegistry::new();
        registry.append("a".into(), noop_record());
        registry.append("a".into(), noop_record());
    }

    #[test]
    fn taken_continuation_can_be_invoked() {
        let registry = PendingRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        registry.append(
            "a".into(),
            PendingRequest {
                request: None,
                on_response: Box::new(move |result| {
                    assert!(result.is_ok());
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
        );

        let pending = registry.take("a").unwrap();
        (pending.on_response)(Ok(envelope::Response::default()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_append_and_take_is_consistent() {
        let registry = Arc::new(PendingRegistry::new());
        let taken = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    registry.append(format!("{i}-{j}"), PendingRequest {
                        request: None,
                        on_response: Box::new(|_| {}),
                    });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            let taken = taken.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    if registry.take(&format!("{i}-{j}")).is_some() {
                        taken.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(taken.load(Ordering::SeqCst), 800);
        assert!(registry.is_empty());
    }
}
