//! Message envelope exchanged over the hub.
//!
//! Every frame is a JSON object carrying a `kind` discriminator. This module
//! defines the closed set of kinds the hub itself understands:
//! - [`Envelope::Join`] / [`Envelope::Leave`]: presence notifications.
//! - [`Envelope::Welcome`]: sent once to a newly registered client.
//! - [`Envelope::Broadcast`]: generic payload relayed to other clients.
//!
//! Note: decoding of raw frames (and tolerance for unknown kinds) lives in
//! the `hub-protocol` crate; this module is purely logical.

use serde::{Deserialize, Serialize};

use crate::client_id::{ClientId, ClientInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Envelope {
    /// A client joined the hub.
    Join { id: ClientId, color: String },

    /// A client left the hub.
    Leave { id: ClientId },

    /// Greeting for a new client: its own identity plus who is already here.
    Welcome {
        id: ClientId,
        color: String,
        peers: Vec<ClientInfo>,
    },

    /// Application payload fanned out to other clients.
    ///
    /// `from` is stamped by the server when relaying; whatever a client puts
    /// there is overwritten.
    Broadcast {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl Envelope {
    pub fn join(client: &ClientInfo) -> Self {
        Envelope::Join {
            id: client.id,
            color: client.color.clone(),
        }
    }

    pub fn leave(id: ClientId) -> Self {
        Envelope::Leave { id }
    }

    pub fn welcome(client: &ClientInfo, peers: Vec<ClientInfo>) -> Self {
        Envelope::Welcome {
            id: client.id,
            color: client.color.clone(),
            peers,
        }
    }

    pub fn broadcast(from: Option<ClientId>, data: serde_json::Value) -> Self {
        Envelope::Broadcast { from, data }
    }

    /// The wire discriminator of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Join { .. } => "join",
            Envelope::Leave { .. } => "leave",
            Envelope::Welcome { .. } => "welcome",
            Envelope::Broadcast { .. } => "broadcast",
        }
    }

    /// Kinds only the server may originate.
    pub fn is_server_only(&self) -> bool {
        !matches!(self, Envelope::Broadcast { .. })
    }
}
