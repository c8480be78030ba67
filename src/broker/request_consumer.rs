//! Shared consumer on this service's request queue.
//!
//! Every instance of the service competes on `req.<service>`; the
//! broker load-balances deliveries across them. Acks are manual and
//! happen after local delivery, whether or not the response could be
//! published back; the requester's own deadline covers that gap.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::StreamExt;
use lapin::options::{BasicAckOptions, BasicConsumeOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, Consumer};

use crate::broker::session::{publish_response_back, SessionInner};
use crate::broker::topology;
use crate::envelope;

const STATUS_NOT_IMPLEMENTED: i32 = 501;
const STATUS_BAD_GATEWAY: i32 = 502;

/// Ensure the request queue exists and start consuming it.
pub(crate) async fn start(
    inner: Arc<SessionInner>,
    connection: Arc<Connection>,
) -> Result<(), lapin::Error> {
    let channel = connection.create_channel().await?;
    topology::declare_request_queue(&channel, &inner.service_name).await?;
    let consumer = subscribe(&channel, &inner.service_name).await?;
    tokio::spawn(run(inner, connection, channel, consumer));
    Ok(())
}

async fn subscribe(channel: &Channel, service_name: &str) -> Result<Consumer, lapin::Error> {
    channel
        .basic_consume(
            &topology::request_queue_name(service_name),
            "",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
}

async fn run(
    inner: Arc<SessionInner>,
    connection: Arc<Connection>,
    // Held so the consumer's channel outlives the delivery loop.
    mut _channel: Channel,
    mut consumer: Consumer,
) {
    loop {
        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(err) => {
                    tracing::warn!(error = %err, "request delivery error");
                    break;
                }
            };
            handle(&inner, &connection, &delivery.data).await;
            if let Err(err) = delivery.ack(BasicAckOptions::default()).await {
                tracing::warn!(error = %err, "request ack failed");
            }
        }

        tracing::warn!("stopped consuming request messages");
        if inner.closing.load(Ordering::SeqCst) || !connection.status().connected() {
            return;
        }
        match restart(&connection, &inner.service_name).await {
            Ok((new_channel, new_consumer)) => {
                _channel = new_channel;
                consumer = new_consumer;
            }
            Err(err) => {
                tracing::error!(error = %err, "request consumer restart failed");
                return;
            }
        }
    }
}

async fn restart(
    connection: &Connection,
    service_name: &str,
) -> Result<(Channel, Consumer), lapin::Error> {
    let channel = connection.create_channel().await?;
    let consumer = subscribe(&channel, service_name).await?;
    Ok((channel, consumer))
}

/// Process one delivery end to end. The caller acks afterwards in every
/// case; an undecodable message is acked away rather than left to
/// poison the queue.
async fn handle(inner: &Arc<SessionInner>, connection: &Connection, payload: &[u8]) {
    let request = match envelope::Request::from_bytes(payload) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(error = %err, "dropping undecodable request");
            return;
        }
    };

    inner.middleware.incoming_request(&request);

    let response = deliver_locally(inner, &request).await;

    inner.middleware.incoming_response(&response);

    if request.response_queue.is_empty() {
        // The requester does not expect a response.
        return;
    }
    publish_response_back(
        connection,
        &request.response_queue,
        &response.to_bytes(),
        &request.id,
    )
    .await;
}

/// Run the injected local-delivery hook, synthesizing a response when
/// it is absent or fails so the requester always gets an answer.
async fn deliver_locally(inner: &SessionInner, request: &envelope::Request) -> envelope::Response {
    let Some(hook) = &inner.local_delivery else {
        return synthesized(request, STATUS_NOT_IMPLEMENTED, Vec::new());
    };
    match hook(request.clone()).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(
                error = %err,
                request_id = %request.id,
                endpoint = %request.endpoint,
                "local delivery failed"
            );
            synthesized(request, STATUS_BAD_GATEWAY, err.to_string().into_bytes())
        }
    }
}

fn synthesized(request: &envelope::Request, status_code: i32, body: Vec<u8>) -> envelope::Response {
    envelope::Response {
        request_id: request.id.clone(),
        status_code,
        headers: Vec::new(),
        body,
    }
}
