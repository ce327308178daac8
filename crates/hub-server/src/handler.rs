//! Message handling hooks.
//!
//! The hub itself is payload-agnostic. What happens to an inbound frame is
//! decided by a [`MessageHandler`]; [`Relay`] is the default one.

use async_trait::async_trait;
use hub_core::{ClientInfo, Envelope};
use hub_protocol::{decode_inbound, Inbound};
use tracing::{debug, warn};

use crate::hub::Hub;

/// Hooks invoked by the hub loop and the client read pumps.
///
/// `on_connect` / `on_disconnect` run inside the hub loop right after the
/// registry changes, so they must not block.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    fn on_connect(&self, _client: &ClientInfo) {}

    fn on_disconnect(&self, _client: &ClientInfo) {}

    /// One decoded inbound frame from `from`.
    async fn on_message(&self, hub: &Hub, from: &ClientInfo, message: Inbound);
}

/// Re-broadcasts `broadcast` envelopes to every other client, stamped with
/// the sender's id. Everything else is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relay;

#[async_trait]
impl MessageHandler for Relay {
    async fn on_message(&self, hub: &Hub, from: &ClientInfo, message: Inbound) {
        match message {
            Inbound::Known(envelope) if envelope.is_server_only() => {
                debug!(client = %from.id, kind = envelope.kind(), "ignoring server-only kind")
            }
            Inbound::Known(Envelope::Broadcast { data, .. }) => {
                let envelope = Envelope::broadcast(Some(from.id), data);
                match hub.broadcast(&envelope, Some(from.id)).await {
                    Ok(delivery) => debug!(
                        client = %from.id,
                        delivered = delivery.delivered_count(),
                        dropped = delivery.dropped_count(),
                        "relayed broadcast"
                    ),
                    Err(e) => warn!(client = %from.id, error = %e, "relay failed"),
                }
            }
            other => debug!(client = %from.id, kind = other.kind(), "ignoring unknown kind"),
        }
    }
}

/// Decode a raw frame and hand it to the hub's handler.
///
/// Malformed frames are logged and dropped.
pub async fn dispatch(hub: &Hub, from: &ClientInfo, frame: &[u8]) {
    match decode_inbound(frame) {
        Ok(message) => hub.handler().on_message(hub, from, message).await,
        Err(e) => warn!(client = %from.id, error = %e, "dropping malformed frame"),
    }
}
