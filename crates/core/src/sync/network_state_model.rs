//! Reachability of the remote system of record.

use serde::{Deserialize, Serialize};

/// Tri-state reachability. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkState {
    /// Local connectivity and a healthy remote.
    Online,
    /// No local connectivity.
    Offline,
    /// Local connectivity, but the remote health probe fails.
    ServerDown,
}

impl NetworkState {
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Online)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::ServerDown => "server-down",
        }
    }
}

/// Connectivity events raised by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformEvent {
    Online,
    Offline,
}

/// Why a reconciliation pass was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Startup,
    Reconnected,
    LocalMutation,
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Reconnected => "reconnected",
            Self::LocalMutation => "local_mutation",
            Self::Manual => "manual",
        }
    }
}
