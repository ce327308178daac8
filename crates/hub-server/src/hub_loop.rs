//! Central hub loop.
//!
//! This task owns the client registry and applies every `HubEvent` in
//! arrival order. It is the only place the registry is mutated and the
//! only long-lived holder of the clients' queue senders.
//!
//! Fan-out policy:
//! - enqueue is `try_send`; the loop never waits on a client,
//! - a full or closed queue drops the message for that client and is
//!   reported in the `Delivery`.

use std::sync::Arc;

use bytes::Bytes;
use hub_core::{ClientId, ClientInfo, ClientState, Envelope, Registry, RegistryError};
use hub_protocol::encode;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::client::ClientHandle;
use crate::error::HubError;
use crate::handler::MessageHandler;
use crate::hub::HubConfig;
use crate::metrics::HubMetrics;
use crate::types::{Delivery, HubEvent, HubEventRx, SendOutcome};

/// Run the hub loop until a `Shutdown` event arrives or every `Hub` handle
/// is gone.
pub(crate) async fn run_hub_loop(
    mut events: HubEventRx,
    config: HubConfig,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<HubMetrics>,
) {
    let mut state = HubState {
        clients: Registry::new(),
        config,
        handler,
        metrics,
    };

    while let Some(event) = events.recv().await {
        match event {
            HubEvent::Register { client, reply } => {
                let _ = reply.send(state.register(client));
            }
            HubEvent::Unregister { id, reply } => {
                let _ = reply.send(state.unregister(id));
            }
            HubEvent::Broadcast {
                payload,
                exclude,
                reply,
            } => {
                let _ = reply.send(state.fan_out(&payload, exclude));
            }
            HubEvent::Send {
                payload,
                target,
                reply,
            } => {
                let _ = reply.send(state.deliver(&payload, target));
            }
            HubEvent::Snapshot { reply } => {
                let _ = reply.send(state.snapshot());
            }
            HubEvent::Shutdown { reply } => {
                let watchers = state.remove_all();
                info!(clients = watchers.len(), "hub loop shutting down");
                let _ = reply.send(watchers);
                return;
            }
        }
    }

    // Every handle dropped without an explicit shutdown.
    let remaining = state.remove_all();
    info!(clients = remaining.len(), "hub loop stopped (event channel closed)");
}

struct HubState {
    clients: Registry<ClientHandle>,
    config: HubConfig,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<HubMetrics>,
}

impl HubState {
    fn register(&mut self, client: ClientHandle) -> Result<(), HubError> {
        let id = client.id();

        if !client.state().is_active() {
            warn!(client = %id, state = ?client.state().get(), "refusing to register inactive client");
            return Err(HubError::NotActive(id));
        }

        let info = client.info().clone();
        if let Err(RegistryError::Duplicate(id)) = self.clients.insert(id, client) {
            warn!(client = %id, "duplicate registration rejected");
            self.metrics.inc_duplicate();
            return Err(HubError::DuplicateClient(id));
        }

        debug!(client = %id, clients = self.clients.len(), "client registered");
        self.handler.on_connect(&info);

        if self.config.announce_presence {
            self.announce_join(&info);
        }
        Ok(())
    }

    fn unregister(&mut self, id: ClientId) -> bool {
        let Some(client) = self.clients.remove(&id) else {
            debug!(client = %id, "unregister for unknown client ignored");
            self.metrics.inc_unknown_unregister();
            return false;
        };

        client.state().advance(ClientState::Closing);
        let info = client.info().clone();
        // Dropping the handle closes the client's queue.
        drop(client);

        debug!(client = %id, clients = self.clients.len(), "client unregistered");
        self.handler.on_disconnect(&info);

        if self.config.announce_presence {
            self.announce(&Envelope::leave(id), None);
        }
        true
    }

    fn remove_all(&mut self) -> Vec<watch::Receiver<ClientState>> {
        self.clients
            .drain()
            .into_iter()
            .map(|(_, client)| {
                client.state().advance(ClientState::Closing);
                let watcher = client.state().subscribe();
                let info = client.info().clone();
                drop(client);
                self.handler.on_disconnect(&info);
                watcher
            })
            .collect()
    }

    fn fan_out(&self, payload: &Bytes, exclude: Option<ClientId>) -> Delivery {
        let mut delivery = Delivery::default();

        for (id, client) in self.clients.iter() {
            if Some(*id) == exclude {
                continue;
            }
            match client.try_enqueue(payload.clone()) {
                Ok(()) => delivery.delivered.push(*id),
                Err(err) => {
                    log_drop(*id, &err);
                    delivery.dropped.push(*id);
                }
            }
        }

        self.metrics.add_delivered(delivery.delivered.len() as u64);
        self.metrics.add_dropped(delivery.dropped.len() as u64);
        trace!(
            delivered = delivery.delivered.len(),
            dropped = delivery.dropped.len(),
            "fan-out"
        );
        delivery
    }

    fn deliver(&self, payload: &Bytes, target: ClientId) -> SendOutcome {
        let Some(client) = self.clients.get(&target) else {
            debug!(client = %target, "send to unknown client");
            return SendOutcome::NotConnected;
        };

        match client.try_enqueue(payload.clone()) {
            Ok(()) => {
                self.metrics.add_delivered(1);
                SendOutcome::Delivered
            }
            Err(err) => {
                log_drop(target, &err);
                self.metrics.add_dropped(1);
                SendOutcome::Dropped
            }
        }
    }

    fn snapshot(&self) -> Vec<ClientInfo> {
        self.clients
            .iter()
            .map(|(_, client)| client.info().clone())
            .collect()
    }

    /// Welcome the new client and tell everyone else it joined.
    fn announce_join(&self, info: &ClientInfo) {
        let peers = self
            .clients
            .iter()
            .filter(|(id, _)| **id != info.id)
            .map(|(_, client)| client.info().clone())
            .collect();

        if let Some(bytes) = self.encode_presence(&Envelope::welcome(info, peers)) {
            self.deliver(&bytes, info.id);
        }
        self.announce(&Envelope::join(info), Some(info.id));
    }

    fn announce(&self, envelope: &Envelope, exclude: Option<ClientId>) {
        if let Some(bytes) = self.encode_presence(envelope) {
            self.fan_out(&bytes, exclude);
        }
    }

    fn encode_presence(&self, envelope: &Envelope) -> Option<Bytes> {
        match encode(envelope) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                self.metrics.inc_encode_failure();
                warn!(kind = envelope.kind(), error = %e, "failed to encode presence message");
                None
            }
        }
    }
}

fn log_drop(id: ClientId, err: &TrySendError<Bytes>) {
    match err {
        TrySendError::Full(_) => warn!(client = %id, "outbound queue full; message dropped"),
        TrySendError::Closed(_) => debug!(client = %id, "outbound queue closed; message dropped"),
    }
}
