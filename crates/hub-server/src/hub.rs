//! Cloneable handle to the hub loop.
//!
//! Every operation is an event on one ordered channel; the loop applies
//! them in arrival order and answers over a oneshot. The handle never
//! touches the registry itself.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use hub_core::state::wait_closed;
use hub_core::{ClientId, ClientInfo};
use hub_protocol::encode;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::client::ClientHandle;
use crate::error::HubError;
use crate::handler::{MessageHandler, Relay};
use crate::hub_loop::run_hub_loop;
use crate::metrics::HubMetrics;
use crate::types::{Delivery, HubEvent, HubEventTx, SendOutcome};

/// Settings for the hub loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub event_capacity: usize,
    pub announce_presence: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            event_capacity: 1024,
            announce_presence: false,
        }
    }
}

#[derive(Clone)]
pub struct Hub {
    events: HubEventTx,
    metrics: Arc<HubMetrics>,
    handler: Arc<dyn MessageHandler>,
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("closed", &self.events.is_closed())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl Hub {
    /// Start the hub loop on the current runtime.
    pub fn spawn(config: HubConfig, handler: Arc<dyn MessageHandler>) -> (Hub, JoinHandle<()>) {
        let (events, rx) = mpsc::channel(config.event_capacity.max(1));
        let metrics = Arc::new(HubMetrics::new());

        let task = tokio::spawn(run_hub_loop(rx, config, handler.clone(), metrics.clone()));

        let hub = Hub {
            events,
            metrics,
            handler,
        };
        (hub, task)
    }

    /// Start a hub with the [`Relay`] handler.
    pub fn with_relay(config: HubConfig) -> (Hub, JoinHandle<()>) {
        Self::spawn(config, Arc::new(Relay))
    }

    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    pub fn metrics(&self) -> &HubMetrics {
        &self.metrics
    }

    /// Admit a client. Once this returns `Ok`, later broadcasts reach it.
    pub async fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.request(|reply| HubEvent::Register { client, reply })
            .await?
    }

    /// Remove a client and close its queue. `false` if it was not registered.
    pub async fn unregister(&self, id: ClientId) -> Result<bool, HubError> {
        self.request(|reply| HubEvent::Unregister { id, reply }).await
    }

    /// Encode `payload` once and enqueue it for every client but `exclude`.
    pub async fn broadcast<T>(&self, payload: &T, exclude: Option<ClientId>) -> Result<Delivery, HubError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = self.encode(payload)?;
        self.broadcast_bytes(bytes, exclude).await
    }

    pub async fn broadcast_bytes(&self, payload: Bytes, exclude: Option<ClientId>) -> Result<Delivery, HubError> {
        self.request(|reply| HubEvent::Broadcast {
            payload,
            exclude,
            reply,
        })
        .await
    }

    /// Encode `payload` and enqueue it for one client.
    pub async fn send<T>(&self, payload: &T, target: ClientId) -> Result<SendOutcome, HubError>
    where
        T: Serialize + ?Sized,
    {
        let bytes = self.encode(payload)?;
        self.send_bytes(bytes, target).await
    }

    pub async fn send_bytes(&self, payload: Bytes, target: ClientId) -> Result<SendOutcome, HubError> {
        self.request(|reply| HubEvent::Send {
            payload,
            target,
            reply,
        })
        .await
    }

    /// Registered clients, in registration order.
    pub async fn clients(&self) -> Result<Vec<ClientInfo>, HubError> {
        self.request(|reply| HubEvent::Snapshot { reply }).await
    }

    pub async fn client_count(&self) -> Result<usize, HubError> {
        self.clients().await.map(|clients| clients.len())
    }

    /// Remove every client, stop the loop and wait up to `timeout` for the
    /// removed clients to finish closing.
    ///
    /// Returns how many clients were removed. Later calls on any handle
    /// fail with [`HubError::Closed`].
    pub async fn shutdown(&self, timeout: Duration) -> Result<usize, HubError> {
        let watchers = self.request(|reply| HubEvent::Shutdown { reply }).await?;
        let removed = watchers.len();

        let all_closed = join_all(watchers.into_iter().map(wait_closed));
        match tokio::time::timeout(timeout, all_closed).await {
            Ok(_) => info!(clients = removed, "hub shut down"),
            Err(_) => warn!(clients = removed, ?timeout, "timed out waiting for clients to close"),
        }
        Ok(removed)
    }

    fn encode<T>(&self, payload: &T) -> Result<Bytes, HubError>
    where
        T: Serialize + ?Sized,
    {
        encode(payload).map_err(|e| {
            self.metrics.inc_encode_failure();
            warn!(error = %e, "dropping unencodable payload");
            HubError::Encode(e)
        })
    }

    async fn request<T, F>(&self, make: F) -> Result<T, HubError>
    where
        F: FnOnce(oneshot::Sender<T>) -> HubEvent,
    {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(make(tx))
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }
}
