//! Offline-first synchronization against the Ledgerline remote API.
//!
//! The [`MutationFacade`] applies every change either remotely or to the local
//! cache plus the pending operation log. The [`NetworkMonitor`] tracks
//! reachability, and the [`Reconciler`] replays the log once the remote is
//! back. [`SyncRuntime`] runs the monitor and reconciler loops on tokio.

pub mod client;
pub mod config;
pub mod error;
pub mod facade;
pub mod monitor;
pub mod reconciler;
pub mod runtime;
pub mod signal;
pub mod types;

#[cfg(test)]
mod test_support;

pub use client::{HealthProbe, LedgerClient, RemoteLedger};
pub use config::SyncConfig;
pub use error::{ApiRetryClass, Result, SyncError};
pub use facade::MutationFacade;
pub use monitor::NetworkMonitor;
pub use reconciler::Reconciler;
pub use runtime::SyncRuntime;
pub use signal::WorkSignal;
pub use types::{ApiErrorResponse, RemoteCategory, RemoteTransaction};
