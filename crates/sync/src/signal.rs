//! Pending-work signal between event sources and the reconciler loop.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use ledgerline_core::sync::SyncTrigger;

/// Single-slot wakeup: any number of `notify` calls before the consumer wakes
/// collapse into one wakeup, tagged with the first trigger that raised it.
#[derive(Debug, Default)]
pub struct WorkSignal {
    notify: Notify,
    trigger: Mutex<Option<SyncTrigger>>,
}

impl WorkSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<SyncTrigger>> {
        match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn notify(&self, trigger: SyncTrigger) {
        self.slot().get_or_insert(trigger);
        self.notify.notify_one();
    }

    /// Wait for the next wakeup and return its trigger.
    pub async fn wait(&self) -> SyncTrigger {
        self.notify.notified().await;
        self.slot().take().unwrap_or(SyncTrigger::Manual)
    }

    pub fn is_pending(&self) -> bool {
        self.slot().is_some()
    }
}
