//! Error types for the core registry.

use thiserror::Error;

use crate::client_id::ClientId;

/// Registry consistency errors.
///
/// These are never fatal: callers log them and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A client with this id is already registered. The existing entry is kept.
    #[error("client {0} is already registered")]
    Duplicate(ClientId),
}
