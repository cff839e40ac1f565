//! SQLite storage for the Ledgerline offline sync engine.
//!
//! Reads go through the r2d2 pool; every write is funnelled through the
//! single writer actor so the pending operation log and the entity cache are
//! mutated by one connection at a time, in submission order.

pub mod db;
pub mod errors;
pub mod records;
pub mod schema;
pub mod sync;

pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle,
};
pub use errors::StorageError;
pub use records::EntityCacheRepository;
pub use sync::PendingOperationRepository;
