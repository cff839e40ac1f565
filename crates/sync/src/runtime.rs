//! Background runtime wiring the monitor, reconciler and façade together.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use ledgerline_core::records::EntityCacheRepositoryTrait;
use ledgerline_core::sync::{
    NetworkState, PendingOperationRepositoryTrait, PlatformEvent, ReconcileOutcome,
    ReconcileSummary, SyncTrigger,
};

use crate::client::{HealthProbe, LedgerClient, RemoteLedger};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::facade::MutationFacade;
use crate::monitor::NetworkMonitor;
use crate::reconciler::Reconciler;
use crate::signal::WorkSignal;

type SummarySender = Arc<watch::Sender<Option<ReconcileSummary>>>;

pub struct SyncRuntime {
    monitor: Arc<NetworkMonitor>,
    signal: Arc<WorkSignal>,
    facade: Arc<MutationFacade>,
    summary: SummarySender,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncRuntime {
    /// Start against the remote configured in `config`.
    pub fn from_config(
        config: &SyncConfig,
        operations: Arc<dyn PendingOperationRepositoryTrait>,
        cache: Arc<dyn EntityCacheRepositoryTrait>,
    ) -> Result<Self> {
        let client = Arc::new(LedgerClient::new(config)?);
        Ok(Self::start(config, operations, cache, client.clone(), client))
    }

    /// Spawn the probe loop and the reconcile loop. Must be called from
    /// within a tokio runtime.
    pub fn start(
        config: &SyncConfig,
        operations: Arc<dyn PendingOperationRepositoryTrait>,
        cache: Arc<dyn EntityCacheRepositoryTrait>,
        remote: Arc<dyn RemoteLedger>,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let signal = Arc::new(WorkSignal::new());
        let monitor = Arc::new(NetworkMonitor::new(probe, signal.clone(), config));
        let reconciler = Arc::new(
            Reconciler::new(operations.clone(), cache.clone(), remote.clone())
                .with_monitor(monitor.clone())
                .with_max_attempts(config.max_sync_attempts),
        );
        let facade = Arc::new(MutationFacade::new(
            operations,
            cache,
            remote,
            monitor.clone(),
            signal.clone(),
            config.owner_id.clone(),
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (summary, _) = watch::channel(None);
        let summary = Arc::new(summary);

        let tasks = vec![
            tokio::spawn(Arc::clone(&monitor).run(shutdown_rx.clone())),
            tokio::spawn(reconcile_loop(
                monitor.clone(),
                reconciler,
                signal.clone(),
                summary.clone(),
                shutdown_rx,
            )),
        ];
        signal.notify(SyncTrigger::Startup);
        info!("[SyncRuntime] Started for owner {}", config.owner_id);

        Self {
            monitor,
            signal,
            facade,
            summary,
            shutdown,
            tasks,
        }
    }

    pub fn facade(&self) -> Arc<MutationFacade> {
        Arc::clone(&self.facade)
    }

    pub fn current_state(&self) -> NetworkState {
        self.monitor.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<NetworkState> {
        self.monitor.subscribe()
    }

    pub async fn handle_platform_event(&self, event: PlatformEvent) -> NetworkState {
        self.monitor.handle_platform_event(event).await
    }

    /// Ask for a pass; ignored while the remote is unreachable.
    pub fn request_sync(&self) {
        self.signal.notify(SyncTrigger::Manual);
    }

    pub fn last_summary(&self) -> Option<ReconcileSummary> {
        self.summary.borrow().clone()
    }

    pub fn subscribe_summary(&self) -> watch::Receiver<Option<ReconcileSummary>> {
        self.summary.subscribe()
    }

    /// Stop both loops and wait for them. A pass in flight runs to completion.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!("[SyncRuntime] Background task failed: {}", err);
            }
        }
        info!("[SyncRuntime] Stopped");
    }
}

async fn reconcile_loop(
    monitor: Arc<NetworkMonitor>,
    reconciler: Arc<Reconciler>,
    signal: Arc<WorkSignal>,
    summary: SummarySender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let trigger = tokio::select! {
            trigger = signal.wait() => trigger,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        if !monitor.is_online() {
            debug!(
                "[Reconciler] Ignoring {} request while {}",
                trigger.as_str(),
                monitor.current().as_str()
            );
            continue;
        }

        match reconciler.request(trigger).await {
            Ok(ReconcileOutcome::Completed(pass)) => {
                summary.send_replace(Some(pass));
            }
            Ok(ReconcileOutcome::Coalesced) => {}
            Err(err) => error!("[Reconciler] Pass aborted: {}", err),
        }
    }
    debug!("[Reconciler] Loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use ledgerline_core::records::{TransactionFields, TransactionKind};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config() -> SyncConfig {
        SyncConfig {
            api_url: "http://ledger.invalid".to_string(),
            probe_interval_secs: 1,
            server_down_probe_interval_secs: 1,
            probe_timeout_ms: 200,
            ..SyncConfig::default()
        }
    }

    fn start(h: &Harness) -> SyncRuntime {
        SyncRuntime::start(
            &config(),
            h.operations.clone(),
            h.cache.clone(),
            h.remote.clone(),
            h.remote.clone(),
        )
    }

    #[tokio::test]
    async fn queued_work_drains_after_reconnect() {
        let h = Harness::new();
        h.remote.set_offline(true);
        let runtime = start(&h);
        let mut state = runtime.subscribe_state();
        state
            .wait_for(|s| *s == NetworkState::ServerDown)
            .await
            .expect("server down");

        let facade = runtime.facade();
        let temp = facade
            .create(TransactionFields::new(
                TransactionKind::Expense,
                dec!(42.50),
                "Food",
            ))
            .await
            .expect("offline create");
        assert!(temp.identity.is_temporary());
        assert!(runtime.last_summary().is_none());

        h.remote.set_offline(false);
        let mut summaries = runtime.subscribe_summary();
        assert_eq!(
            runtime.handle_platform_event(PlatformEvent::Online).await,
            NetworkState::Online
        );

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            summaries.wait_for(|s| s.as_ref().is_some_and(|s| s.succeeded == 1)),
        )
        .await
        .expect("pass in time")
        .expect("summary")
        .clone();
        assert_eq!(summary.expect("summary").failed, 0);
        assert_eq!(h.remote.records().len(), 1);
        assert_eq!(facade.pending_count().expect("count"), 0);

        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn manual_request_runs_when_online() {
        let h = Harness::new();
        let runtime = start(&h);
        let mut state = runtime.subscribe_state();
        state
            .wait_for(|s| *s == NetworkState::Online)
            .await
            .expect("online");

        let mut summaries = runtime.subscribe_summary();
        runtime.request_sync();
        tokio::time::timeout(Duration::from_secs(5), summaries.wait_for(|s| s.is_some()))
            .await
            .expect("pass in time")
            .expect("summary");
        assert_eq!(runtime.last_summary(), Some(ReconcileSummary::default()));

        runtime.shutdown().await;
    }

    #[test]
    fn from_config_requires_api_url() {
        let h = Harness::new();
        let result = SyncRuntime::from_config(
            &SyncConfig::default(),
            h.operations.clone(),
            h.cache.clone(),
        );
        assert!(result.is_err());
    }
}
