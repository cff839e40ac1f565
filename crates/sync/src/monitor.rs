//! Network state monitor.
//!
//! Owns the tri-state reachability value and broadcasts every change on a
//! `watch` channel. A transition into `Online` raises exactly one pending-work
//! signal; the reconciler loop decides when to drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{watch, Notify};

use ledgerline_core::sync::{NetworkState, PlatformEvent, SyncTrigger};

use crate::client::HealthProbe;
use crate::config::SyncConfig;
use crate::signal::WorkSignal;

pub struct NetworkMonitor {
    probe: Arc<dyn HealthProbe>,
    signal: Arc<WorkSignal>,
    state: watch::Sender<NetworkState>,
    reprobe: Notify,
    /// Bumped on every platform offline event; a probe that started before
    /// the bump must not overwrite `Offline`.
    offline_epoch: AtomicU64,
    probe_timeout: Duration,
    online_interval: Duration,
    server_down_interval: Duration,
}

impl NetworkMonitor {
    /// Starts `Offline` until the first probe succeeds.
    pub fn new(probe: Arc<dyn HealthProbe>, signal: Arc<WorkSignal>, config: &SyncConfig) -> Self {
        let (state, _) = watch::channel(NetworkState::Offline);
        Self {
            probe,
            signal,
            state,
            reprobe: Notify::new(),
            offline_epoch: AtomicU64::new(0),
            probe_timeout: config.probe_timeout(),
            online_interval: config.probe_interval(),
            server_down_interval: config.server_down_probe_interval(),
        }
    }

    pub fn current(&self) -> NetworkState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_reachable()
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }

    pub async fn handle_platform_event(&self, event: PlatformEvent) -> NetworkState {
        match event {
            PlatformEvent::Offline => {
                self.offline_epoch.fetch_add(1, Ordering::AcqRel);
                self.transition(NetworkState::Offline);
                NetworkState::Offline
            }
            PlatformEvent::Online => self.probe_now().await,
        }
    }

    /// Probe the remote once and apply the result.
    pub async fn probe_now(&self) -> NetworkState {
        let epoch = self.offline_epoch.load(Ordering::Acquire);
        let outcome = tokio::time::timeout(self.probe_timeout, self.probe.check_health()).await;

        if self.offline_epoch.load(Ordering::Acquire) != epoch {
            debug!("[NetworkMonitor] Discarding probe result after platform offline event");
            return self.current();
        }

        let next = match outcome {
            Ok(Ok(())) => NetworkState::Online,
            Ok(Err(err)) => {
                debug!("[NetworkMonitor] Health probe failed: {}", err);
                NetworkState::ServerDown
            }
            Err(_) => {
                debug!(
                    "[NetworkMonitor] Health probe abandoned after {} ms",
                    self.probe_timeout.as_millis()
                );
                NetworkState::ServerDown
            }
        };
        self.transition(next);
        next
    }

    /// A request failed at the transport level; switch to the aggressive
    /// probe cadence until the remote answers again.
    pub fn report_unreachable(&self) {
        if self.current() == NetworkState::Online {
            warn!("[NetworkMonitor] Remote request failed at transport level");
            self.transition(NetworkState::ServerDown);
        }
        self.reprobe.notify_one();
    }

    fn transition(&self, next: NetworkState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });

        if changed {
            info!(
                "[NetworkMonitor] {} -> {}",
                previous.as_str(),
                next.as_str()
            );
            if next == NetworkState::Online {
                self.signal.notify(SyncTrigger::Reconnected);
            }
        }
    }

    fn probe_interval(&self, state: NetworkState) -> Option<Duration> {
        match state {
            NetworkState::Online => Some(self.online_interval),
            NetworkState::ServerDown => Some(self.server_down_interval),
            // Leaving `Offline` is driven by the platform online event.
            NetworkState::Offline => None,
        }
    }

    /// Probe loop: an initial probe, then one per interval of the current
    /// state. Exits when `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut state_rx = self.subscribe();
        self.probe_now().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let interval = self.probe_interval(*state_rx.borrow_and_update());

            tokio::select! {
                _ = tick(interval) => {
                    self.probe_now().await;
                }
                _ = self.reprobe.notified() => {
                    self.probe_now().await;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!("[NetworkMonitor] Probe loop stopped");
    }
}

async fn tick(interval: Option<Duration>) {
    match interval {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SyncError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct StubProbe {
        healthy: AtomicBool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubProbe {
        fn new(healthy: bool) -> Arc<Self> {
            Self::with_delay(healthy, Duration::ZERO)
        }

        fn with_delay(healthy: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                healthy: AtomicBool::new(healthy),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for StubProbe {
        async fn check_health(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(SyncError::api(503, "down"))
            }
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            probe_timeout_ms: 50,
            probe_interval_secs: 1,
            server_down_probe_interval_secs: 1,
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn platform_events_drive_state() {
        let probe = StubProbe::new(true);
        let signal = Arc::new(WorkSignal::new());
        let monitor = NetworkMonitor::new(probe.clone(), signal.clone(), &config());
        let mut rx = monitor.subscribe();

        assert_eq!(
            monitor.handle_platform_event(PlatformEvent::Online).await,
            NetworkState::Online
        );
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), NetworkState::Online);

        assert_eq!(
            monitor.handle_platform_event(PlatformEvent::Offline).await,
            NetworkState::Offline
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_probe_means_server_down() {
        let probe = StubProbe::new(false);
        let signal = Arc::new(WorkSignal::new());
        let monitor = NetworkMonitor::new(probe.clone(), signal.clone(), &config());

        assert_eq!(
            monitor.handle_platform_event(PlatformEvent::Online).await,
            NetworkState::ServerDown
        );
        assert!(!signal.is_pending());

        probe.healthy.store(true, Ordering::SeqCst);
        assert_eq!(monitor.probe_now().await, NetworkState::Online);
        assert!(signal.is_pending());
    }

    #[tokio::test]
    async fn slow_probe_is_abandoned() {
        let probe = StubProbe::with_delay(true, Duration::from_millis(500));
        let monitor = NetworkMonitor::new(probe, Arc::new(WorkSignal::new()), &config());

        let started = std::time::Instant::now();
        assert_eq!(monitor.probe_now().await, NetworkState::ServerDown);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn staying_online_signals_only_once() {
        let probe = StubProbe::new(true);
        let signal = Arc::new(WorkSignal::new());
        let monitor = NetworkMonitor::new(probe, signal.clone(), &config());

        monitor.probe_now().await;
        assert_eq!(signal.wait().await, SyncTrigger::Reconnected);

        monitor.probe_now().await;
        monitor.probe_now().await;
        assert!(!signal.is_pending());
    }

    #[tokio::test]
    async fn report_unreachable_drops_to_server_down() {
        let probe = StubProbe::new(true);
        let monitor = NetworkMonitor::new(probe, Arc::new(WorkSignal::new()), &config());
        monitor.probe_now().await;

        monitor.report_unreachable();
        assert_eq!(monitor.current(), NetworkState::ServerDown);
    }

    #[tokio::test]
    async fn run_loop_recovers_from_server_down() {
        let probe = StubProbe::new(false);
        let signal = Arc::new(WorkSignal::new());
        let monitor = Arc::new(NetworkMonitor::new(probe.clone(), signal.clone(), &config()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut state = monitor.subscribe();

        let task = tokio::spawn(Arc::clone(&monitor).run(shutdown_rx));
        state
            .wait_for(|s| *s == NetworkState::ServerDown)
            .await
            .expect("server down");

        probe.healthy.store(true, Ordering::SeqCst);
        tokio::time::timeout(
            Duration::from_secs(3),
            state.wait_for(|s| *s == NetworkState::Online),
        )
        .await
        .expect("recovered in time")
        .expect("online");
        assert_eq!(signal.wait().await, SyncTrigger::Reconnected);

        shutdown_tx.send(true).expect("shutdown");
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop exits")
            .expect("join");
    }
}
