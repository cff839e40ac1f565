//! Domain model and repository contracts for the Ledgerline offline-first client.
//!
//! Nothing in this crate performs I/O. Storage lives in
//! `ledgerline-storage-sqlite`, the remote API and the sync engine live in
//! `ledgerline-sync`.

pub mod errors;
pub mod records;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
