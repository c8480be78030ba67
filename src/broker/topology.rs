//! Queue topology.
//!
//! Each sidecar participates in exactly two queues:
//! - the shared request queue `req.<service>`, competed over by every
//!   instance of the service
//! - an instance-scoped response queue `resp.<uuid>`, regenerated on
//!   every reconnect
//!
//! No exchange bindings; publication routes by queue name through the
//! default exchange.

use lapin::options::QueueDeclareOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Queue};
use uuid::Uuid;

/// Deterministic request queue name for a service.
pub fn request_queue_name(service: &str) -> String {
    format!("req.{service}")
}

/// A fresh, instance-unique response queue name.
pub fn response_queue_name() -> String {
    format!("resp.{}", Uuid::new_v4())
}

fn sidecar_queue_options() -> QueueDeclareOptions {
    // Durable so the broker keeps messages across its own restarts,
    // auto-delete so abandoned queues disappear once unused.
    QueueDeclareOptions {
        durable: true,
        auto_delete: true,
        exclusive: false,
        ..QueueDeclareOptions::default()
    }
}

/// Ensure the shared request queue for `service` exists.
pub async fn declare_request_queue(channel: &Channel, service: &str) -> Result<Queue, lapin::Error> {
    channel
        .queue_declare(
            &request_queue_name(service),
            sidecar_queue_options(),
            FieldTable::default(),
        )
        .await
}

/// Declare this instance's response queue. The declaration is
/// non-exclusive; exclusivity is enforced at consume time instead.
pub async fn declare_response_queue(channel: &Channel, name: &str) -> Result<Queue, lapin::Error> {
    channel
        .queue_declare(name, sidecar_queue_options(), FieldTable::default())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_queue_name_is_deterministic() {
        assert_eq!(request_queue_name("billing"), "req.billing");
        assert_eq!(request_queue_name("billing"), request_queue_name("billing"));
    }

    #[test]
    fn response_queue_name_is_unique_per_call() {
        let a = response_queue_name();
        let b = response_queue_name();
        assert_ne!(a, b);
    }

    #[test]
    fn response_queue_name_embeds_a_uuid() {
        let name = response_queue_name();
        let suffix = name.strip_prefix("resp.").expect("resp. prefix");
        assert!(Uuid::parse_str(suffix).is_ok());
    }
}
