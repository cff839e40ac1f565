//! SQLite persistence for the pending operation log.

mod model;
mod repository;

pub use model::{NewPendingOperationDB, PendingOperationDB};
pub use repository::PendingOperationRepository;
