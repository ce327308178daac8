//! Shared types for the hub server.
//!
//! This module defines:
//! - channel aliases between the hub loop and client write pumps
//! - `HubEvent`: messages flowing from `Hub` handles into the hub loop
//! - delivery reports and disconnect reasons

use std::fmt;

use bytes::Bytes;
use hub_core::{ClientId, ClientInfo, ClientState};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use crate::client::ClientHandle;
use crate::error::HubError;

/// Encoded frames from the hub to one client's write pump.
pub type OutboundTx = mpsc::Sender<Bytes>;
pub type OutboundRx = mpsc::Receiver<Bytes>;

/// Channel from `Hub` handles to the hub loop.
pub type HubEventTx = mpsc::Sender<HubEvent>;
pub type HubEventRx = mpsc::Receiver<HubEvent>;

/// Event applied by the hub loop, in arrival order.
#[derive(Debug)]
pub enum HubEvent {
    Register {
        client: ClientHandle,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Unregister {
        id: ClientId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        payload: Bytes,
        exclude: Option<ClientId>,
        reply: oneshot::Sender<Delivery>,
    },
    Send {
        payload: Bytes,
        target: ClientId,
        reply: oneshot::Sender<SendOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
    /// Remove every client and stop the loop. The reply carries one state
    /// watcher per removed client.
    Shutdown {
        reply: oneshot::Sender<Vec<watch::Receiver<ClientState>>>,
    },
}

/// Outcome of a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delivery {
    /// Clients whose queue accepted the payload.
    pub delivered: Vec<ClientId>,
    /// Clients whose queue was full or already closed.
    pub dropped: Vec<ClientId>,
}

impl Delivery {
    pub fn delivered_count(&self) -> usize {
        self.delivered.len()
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Outcome of a unicast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Delivered,
    /// Queue full or closed; the payload was discarded.
    Dropped,
    NotConnected,
}

/// Why a client's supervisor finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the connection failed.
    Transport(String),
    /// Nothing was received within the idle window.
    IdleTimeout,
    /// The hub removed the client (unregister from elsewhere, or shutdown).
    Evicted,
    /// Writing to the connection failed.
    WriteFailed(String),
    /// The peer did not finish closing within the close timeout.
    CloseTimeout,
    /// Registration was refused.
    Rejected(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => f.write_str("peer closed"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {e}"),
            DisconnectReason::IdleTimeout => f.write_str("idle timeout"),
            DisconnectReason::Evicted => f.write_str("evicted by hub"),
            DisconnectReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            DisconnectReason::CloseTimeout => f.write_str("close timeout"),
            DisconnectReason::Rejected(e) => write!(f, "rejected: {e}"),
        }
    }
}
