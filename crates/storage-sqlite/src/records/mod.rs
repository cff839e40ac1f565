//! SQLite persistence for the local entity cache.

mod model;
mod repository;

pub use model::{CachedCategoryDB, CachedRecordDB, ViewMemberDB};
pub use repository::EntityCacheRepository;
