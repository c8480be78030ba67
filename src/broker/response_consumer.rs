//! Exclusive consumer on this instance's response queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, Consumer};

use crate::broker::session::SessionInner;
use crate::broker::topology;
use crate::envelope;

/// Declare the response queue and start consuming it.
///
/// Auto-ack is on: a delivery that cannot be decoded or matched has
/// already been taken off the queue and is dropped with a log line.
pub(crate) async fn start(
    inner: Arc<SessionInner>,
    connection: Arc<Connection>,
    queue_name: String,
) -> Result<(), lapin::Error> {
    let channel = connection.create_channel().await?;
    topology::declare_response_queue(&channel, &queue_name).await?;
    let consumer = subscribe(&channel, &queue_name).await?;
    tokio::spawn(run(inner, connection, channel, queue_name, consumer));
    Ok(())
}

async fn subscribe(channel: &Channel, queue_name: &str) -> Result<Consumer, lapin::Error> {
    let options = BasicConsumeOptions {
        no_ack: true,
        exclusive: true,
        ..BasicConsumeOptions::default()
    };
    channel
        .basic_consume(queue_name, "", options, FieldTable::default())
        .await
}

async fn run(
    inner: Arc<SessionInner>,
    connection: Arc<Connection>,
    // Held so the consumer's channel outlives the delivery loop.
    mut _channel: Channel,
    queue_name: String,
    mut consumer: Consumer,
) {
    loop {
        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => dispatch(&inner, &delivery.data),
                Err(err) => {
                    tracing::warn!(error = %err, "response delivery error");
                    break;
                }
            }
        }

        tracing::warn!("stopped consuming response messages");
        if inner.closing.load(Ordering::SeqCst) || !connection.status().connected() {
            // The supervisor owns connection-level recovery.
            return;
        }
        // The stream died but the connection is alive: resubscribe on a
        // fresh channel.
        match restart(&connection, &queue_name).await {
            Ok((new_channel, new_consumer)) => {
                _channel = new_channel;
                consumer = new_consumer;
            }
            Err(err) => {
                tracing::error!(error = %err, "response consumer restart failed");
                return;
            }
        }
    }
}

async fn restart(
    connection: &Connection,
    queue_name: &str,
) -> Result<(Channel, Consumer), lapin::Error> {
    let channel = connection.create_channel().await?;
    let consumer = subscribe(&channel, queue_name).await?;
    Ok((channel, consumer))
}

/// Decode one delivery and hand it to its waiting continuation.
fn dispatch(inner: &SessionInner, payload: &[u8]) {
    let response = match envelope::Response::from_bytes(payload) {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable response");
            return;
        }
    };

    inner.middleware.incoming_response(&response);

    match inner.registry.take(&response.request_id) {
        Some(pending) => (pending.on_response)(Ok(response)),
        None => {
            tracing::warn!(
                request_id = %response.request_id,
                "dropping unmatched response"
            );
        }
    }
}
