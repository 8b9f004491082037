//! Rover descriptors and per-session client identity.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque client identifier generated once per session.
///
/// Included in every handshake and stream message so the server can attach
/// the control and stream links of one client to the same rover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionIdentity(Uuid);

impl SessionIdentity {
    /// Generates a fresh random (UUID v4) identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID, e.g. one restored by a test fixture.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Mobility hardware a rover advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mobility {
    Wheels,
    Gimbal,
}

/// One rover as advertised in the answer to `list`.
///
/// Servers in the field only send `rover_id` and `description`; the other
/// fields default to empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoverDescriptor {
    pub rover_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "mobility")]
    pub mobility_capabilities: BTreeSet<Mobility>,
}

impl RoverDescriptor {
    /// Human-readable label: the name when present, else the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.rover_id
        } else {
            &self.name
        }
    }

    /// `true` if the rover advertises a camera gimbal.
    ///
    /// An empty capability set means "not advertised", which older servers
    /// always send; callers treat that as "unknown" rather than "absent".
    pub fn has_gimbal(&self) -> bool {
        self.mobility_capabilities.contains(&Mobility::Gimbal)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
