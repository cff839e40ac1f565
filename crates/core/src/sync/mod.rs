//! Offline sync domain models and contracts.

mod network_state_model;
mod pending_operation_model;
mod pending_operation_traits;
mod reconcile_model;
mod sync_scheduler;

pub use network_state_model::*;
pub use pending_operation_model::*;
pub use pending_operation_traits::*;
pub use reconcile_model::*;
pub use sync_scheduler::*;
