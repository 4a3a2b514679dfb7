//! Device roles and broadcast targets

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CoreError;

/// Role of this device on the rig network.
///
/// A `Client` is the player: it owns the avatar state and broadcasts it.
/// A `Monitor` mirrors one player and may forward touch input back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Authoritative player device
    #[default]
    Client,
    /// Display-only device following a player
    Monitor,
}

impl Role {
    /// Lower-case name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Monitor => "monitor",
        }
    }

    /// Whether this device acts as the player
    pub fn is_player(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether this device acts as a monitor
    pub fn is_monitor(&self) -> bool {
        matches!(self, Role::Monitor)
    }

    /// Whether a frame addressed to `recipient` is meant for this role
    pub fn accepts(&self, recipient: WireRole) -> bool {
        match recipient {
            WireRole::Client | WireRole::Player => self.is_player(),
            WireRole::Monitor => self.is_monitor(),
        }
    }

    /// Wire role that frames sent by this device carry
    pub fn wire_role(&self) -> WireRole {
        match self {
            Role::Client => WireRole::Client,
            Role::Monitor => WireRole::Monitor,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "player" => Ok(Role::Client),
            "monitor" => Ok(Role::Monitor),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// Role names that may appear in a frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireRole {
    /// `client`
    Client,
    /// `monitor`
    Monitor,
    /// `player`
    Player,
}

impl WireRole {
    /// Parse a header field; names are matched exactly
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "client" => Some(WireRole::Client),
            "monitor" => Some(WireRole::Monitor),
            "player" => Some(WireRole::Player),
            _ => None,
        }
    }

    /// Header spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            WireRole::Client => "client",
            WireRole::Monitor => "monitor",
            WireRole::Player => "player",
        }
    }
}

impl std::fmt::Display for WireRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target group for an outgoing message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipients {
    /// The configured client list
    Clients,
    /// The configured monitor list
    Monitors,
    /// The player chosen by a monitor
    Player,
}

impl Recipients {
    /// Recipient role written into the frame header
    pub fn wire_role(&self) -> WireRole {
        match self {
            Recipients::Clients => WireRole::Client,
            Recipients::Monitors => WireRole::Monitor,
            Recipients::Player => WireRole::Player,
        }
    }
}
