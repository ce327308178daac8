//! hub-server
//!
//! WebSocket pub/sub hub: a single coordination loop owning the client
//! registry, plus one supervised pair of pumps per connection.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod types;

// internal: only reachable through `Hub`
mod hub_loop;

pub use client::{Client, ClientConfig, ClientHandle};
pub use config::{Config, ConfigError};
pub use connection::{split_websocket, Frame};
pub use error::{ConnectionError, HubError};
pub use handler::{dispatch, MessageHandler, Relay};
pub use hub::{Hub, HubConfig};
pub use metrics::{HubMetrics, HubMetricsSnapshot};
pub use server::{origin_allowed, Server};
pub use types::{Delivery, DisconnectReason, SendOutcome};
