//! hub-core
//!
//! Pure hub logic, no networking:
//! - client identity and display color
//! - client lifecycle state
//! - ordered client registry
//! - message envelope (the closed set of kinds)

pub mod client_id;
pub mod color;
pub mod error;
pub mod messages;
pub mod registry;
pub mod state;

pub use client_id::{ClientId, ClientInfo};
pub use color::random_color;
pub use error::RegistryError;
pub use messages::Envelope;
pub use registry::Registry;
pub use state::{ClientState, StateCell};
