//! hub-protocol
//!
//! Wire-level encoding/decoding for the hub.
//!
//! This crate turns logical messages (`hub_core::Envelope`, or any
//! serializable payload) into the bytes of a single frame and back again.
//!
//! - [`wire_types`] : discriminator field and the known kinds
//! - [`json_codec`] : encode once, decode tolerant of unknown kinds

pub mod json_codec;
pub mod wire_types;

pub use json_codec::{decode_inbound, encode, CodecError, Inbound};
pub use wire_types::{Kind, DISCRIMINATOR};
