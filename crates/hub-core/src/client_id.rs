//! Client identity.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::random_color;

/// Identifier for a connected client.
///
/// A random (v4) UUID generated once per connection. Unique for the
/// lifetime of the process in practice; the registry still rejects
/// duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        ClientId(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ClientId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ClientId)
    }
}

/// Public description of a client: what peers are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,

    /// Hex color (`#rrggbb`), assigned once at construction.
    pub color: String,

    /// Remote address, when the client sits on a socket.
    #[serde(skip)]
    pub peer_addr: Option<SocketAddr>,
}

impl ClientInfo {
    /// New identity with a random id and a random color.
    pub fn generate(peer_addr: Option<SocketAddr>) -> Self {
        Self {
            id: ClientId::new(),
            color: random_color(),
            peer_addr,
        }
    }

    pub fn new(id: ClientId, color: impl Into<String>) -> Self {
        Self {
            id,
            color: color.into(),
            peer_addr: None,
        }
    }

    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }
}
