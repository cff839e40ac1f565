//! Cached domain records (transactions, categories) and their identities.

mod records_model;
mod records_traits;
mod signature;

pub use records_model::*;
pub use records_traits::*;
pub use signature::*;
