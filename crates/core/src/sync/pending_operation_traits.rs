use async_trait::async_trait;

use super::{NewPendingOperation, PendingOperation};
use crate::errors::Result;
use crate::records::Identity;

/// Durable log of mutations awaiting remote confirmation.
///
/// The log does not deduplicate; recognizing duplicates needs domain
/// knowledge that lives in the reconciler.
#[async_trait]
pub trait PendingOperationRepositoryTrait: Send + Sync {
    /// Persist the operation and return its locally unique id.
    async fn append(&self, operation: NewPendingOperation) -> Result<String>;

    /// All entries in append order (oldest first).
    fn list(&self) -> Result<Vec<PendingOperation>>;

    fn count(&self) -> Result<i64>;

    /// Delete an entry. Removing an unknown id is a no-op.
    async fn remove(&self, operation_id: &str) -> Result<()>;

    /// Bump the attempt counter after a rejected replay; returns the new count.
    async fn record_failed_attempt(&self, operation_id: &str, error: String) -> Result<i32>;

    /// Point every queued entry that targets `from` at `to`, in one
    /// transaction. Returns the number of entries rewritten.
    async fn retarget(&self, from: &Identity, to: &Identity) -> Result<usize>;
}
