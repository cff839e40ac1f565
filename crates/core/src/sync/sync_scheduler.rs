//! Scheduler constants for the network monitor and reconciler.

/// Health probe cadence while online (seconds).
pub const ONLINE_PROBE_INTERVAL_SECS: u64 = 10;

/// Health probe cadence while the server is down (seconds).
pub const SERVER_DOWN_PROBE_INTERVAL_SECS: u64 = 3;

/// Upper bound of one health probe (milliseconds).
pub const PROBE_TIMEOUT_MS: u64 = 3_000;

/// Default timeout for remote CRUD requests (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Replay attempts before a rejected operation is dropped.
pub const DEFAULT_MAX_SYNC_ATTEMPTS: i32 = 1;

/// Date slack when matching a confirmed create to its temporary record.
pub const SIGNATURE_DATE_TOLERANCE_DAYS: i64 = 1;
