//! Outgoing request API.
//!
//! The continuation contract: `on_response` is invoked at most once,
//! with either the correlated response or an error. Error callbacks are
//! always dispatched asynchronously so a caller holding locks is never
//! re-entered on its own stack. The deadline is the caller's: on expiry
//! it evicts its pending id and answers its own client.

use lapin::Channel;
use uuid::Uuid;

use crate::broker::error::BrokerError;
use crate::broker::registry::{PendingRequest, ResponseCallback};
use crate::broker::session::Session;
use crate::broker::{publisher, topology};
use crate::envelope;
use crate::stats::Direction;

impl Session {
    /// Publish `request` to `target_service`'s request queue and
    /// register `on_response` for the correlated reply.
    ///
    /// Generates a request id when the caller supplied none; the id in
    /// use is returned so the caller can evict it on deadline expiry.
    pub async fn send_request(
        &self,
        channel: &Channel,
        target_service: &str,
        mut request: envelope::Request,
        on_response: ResponseCallback,
    ) -> String {
        let queue_name = topology::request_queue_name(target_service);
        if request.id.is_empty() {
            request.id = Uuid::new_v4().to_string();
        }
        let id = request.id.clone();

        match publisher::queue_exists(channel, &queue_name).await {
            Ok(true) => {}
            Ok(false) => {
                dispatch_error(on_response, BrokerError::queue_not_found(queue_name));
                return id;
            }
            Err(err) => {
                dispatch_error(on_response, err);
                return id;
            }
        }

        self.inner.middleware.outgoing_request(&request);
        let payload = request.to_bytes();

        // Registered before the publish so a fast response can never
        // beat its own record into the registry.
        self.inner.registry.append(
            id.clone(),
            PendingRequest {
                request: Some(request),
                on_response,
            },
        );

        match publisher::publish(channel, &queue_name, &payload).await {
            Ok(()) => {
                self.inner.stats.record(target_service, Direction::Outgoing);
            }
            Err(err) => {
                // The record only leaves through us here; a concurrent
                // take means a response somehow won, and wins.
                if let Some(pending) = self.inner.registry.take(&id) {
                    dispatch_error(pending.on_response, err);
                }
            }
        }
        id
    }

    /// Publish `request` without expecting a response: the response
    /// queue is cleared, nothing is registered, and the publish result
    /// is returned directly.
    pub async fn send_and_forget(
        &self,
        channel: &Channel,
        target_service: &str,
        mut request: envelope::Request,
    ) -> Result<(), BrokerError> {
        let queue_name = topology::request_queue_name(target_service);
        if request.id.is_empty() {
            request.id = Uuid::new_v4().to_string();
        }
        request.response_queue = String::new();

        if !publisher::queue_exists(channel, &queue_name).await? {
            return Err(BrokerError::queue_not_found(queue_name));
        }

        self.inner.middleware.outgoing_request(&request);
        publisher::publish(channel, &queue_name, &request.to_bytes()).await?;
        self.inner.stats.record(target_service, Direction::Outgoing);
        Ok(())
    }
}

fn dispatch_error(on_response: ResponseCallback, err: BrokerError) {
    tokio::spawn(async move {
        on_response(Err(err));
    });
}
