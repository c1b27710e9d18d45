//! Event kind enum as the single source of truth for classifier names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of log line the classifier set recognizes.
///
/// The declaration order is the classifier priority order, so sorting by
/// `EventKind` reproduces the order in which lines are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Chat,
    Join,
    Leave,
    Soliloquy,
    PlaneShift,
    MapgenBlame,
    MapgenAnonymous,
    PlayerDeath,
    MobKill,
    Suicide,
    Kick,
    DuctTape,
    Mark,
    AccountCleanup,
    Rename,
    ServerLifecycle,
}

impl EventKind {
    /// All kinds in priority order.
    pub const ALL: [Self; 16] = [
        Self::Chat,
        Self::Join,
        Self::Leave,
        Self::Soliloquy,
        Self::PlaneShift,
        Self::MapgenBlame,
        Self::MapgenAnonymous,
        Self::PlayerDeath,
        Self::MobKill,
        Self::Suicide,
        Self::Kick,
        Self::DuctTape,
        Self::Mark,
        Self::AccountCleanup,
        Self::Rename,
        Self::ServerLifecycle,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Soliloquy => "soliloquy",
            Self::PlaneShift => "plane_shift",
            Self::MapgenBlame => "mapgen_blame",
            Self::MapgenAnonymous => "mapgen_anonymous",
            Self::PlayerDeath => "player_death",
            Self::MobKill => "mob_kill",
            Self::Suicide => "suicide",
            Self::Kick => "kick",
            Self::DuctTape => "duct_tape",
            Self::Mark => "mark",
            Self::AccountCleanup => "account_cleanup",
            Self::Rename => "rename",
            Self::ServerLifecycle => "server_lifecycle",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

impl Serialize for EventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event kind strings.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}
