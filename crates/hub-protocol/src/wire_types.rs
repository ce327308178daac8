//! Low-level wire constants.
//!
//! Frames are UTF-8 JSON objects. The variant is identified by a string
//! field named [`DISCRIMINATOR`]; the known values are listed in [`Kind`].
//! The actual encode/decode logic lives in `json_codec`.

/// Name of the discriminator field in every frame.
pub const DISCRIMINATOR: &str = "kind";

/// Message kinds understood by the hub.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    Join,
    Leave,
    Welcome,
    Broadcast,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Join, Kind::Leave, Kind::Welcome, Kind::Broadcast];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Join => "join",
            Kind::Leave => "leave",
            Kind::Welcome => "welcome",
            Kind::Broadcast => "broadcast",
        }
    }

    /// Look up a discriminator value (case-sensitive).
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "join" => Some(Kind::Join),
            "leave" => Some(Kind::Leave),
            "welcome" => Some(Kind::Welcome),
            "broadcast" => Some(Kind::Broadcast),
            _ => None,
        }
    }
}
