//! Queue publication.
//!
//! The caller owns the channel. Senders driven by external requests use
//! a dedicated short-lived channel per call so a channel killed by the
//! broker affects only that call; fire-and-forget sites may reuse a
//! long-lived one. The publisher is oblivious either way.

use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};

use crate::broker::error::BrokerError;

const CONTENT_TYPE: &str = "application/octet-stream";
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Check whether `queue_name` exists, via a passive declare on the
/// caller's channel.
///
/// Distinguishes an unusable channel (`Unexpected`) from an absent
/// queue (`Ok(false)`). A failed passive declare closes the channel per
/// AMQP semantics, which is why callers hand in short-lived channels.
pub async fn queue_exists(channel: &Channel, queue_name: &str) -> Result<bool, BrokerError> {
    let passive = QueueDeclareOptions {
        passive: true,
        ..QueueDeclareOptions::default()
    };
    match channel
        .queue_declare(queue_name, passive, FieldTable::default())
        .await
    {
        Ok(_) => Ok(true),
        Err(lapin::Error::InvalidChannelState(_)) | Err(lapin::Error::InvalidConnectionState(_)) => {
            Err(BrokerError::unexpected(
                "channel is unusable for queue inspection",
            ))
        }
        // The broker refused the passive declare: no such queue.
        Err(_) => Ok(false),
    }
}

/// Publish `payload` to `queue_name` through the default exchange.
///
/// Callers verify the destination with [`queue_exists`] first; a
/// missing queue is the primary invalid service signal and must surface
/// as `queue_not_found`, not as a transport error. Messages are
/// persistent octet streams without mandatory or immediate flags.
pub async fn publish(
    channel: &Channel,
    queue_name: &str,
    payload: &[u8],
) -> Result<(), BrokerError> {
    let properties = BasicProperties::default()
        .with_content_type(CONTENT_TYPE.into())
        .with_delivery_mode(DELIVERY_MODE_PERSISTENT);

    channel
        .basic_publish(
            "",
            queue_name,
            BasicPublishOptions::default(),
            payload,
            properties,
        )
        .await
        .map_err(|err| BrokerError::unexpected(err.to_string()))?
        .await
        .map_err(|err| BrokerError::unexpected(err.to_string()))?;

    Ok(())
}
