//! Replays the pending operation log against the remote ledger.
//!
//! One pass walks a snapshot of the log in append order. Remote rejections
//! are folded into the returned summary; only local storage failures abort a
//! pass with an error. Passes never overlap: a request that arrives while a
//! pass is draining is coalesced into one follow-up pass.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use serde_json::Value;

use ledgerline_core::records::{
    default_description, EntityCacheRepositoryTrait, Identity, RecordSignature,
};
use ledgerline_core::sync::{
    DedupSignature, OperationKind, PendingOperation, PendingOperationRepositoryTrait,
    ReconcileOutcome, ReconcileSummary, SyncTrigger, TempIdMapping, DEFAULT_MAX_SYNC_ATTEMPTS,
    SIGNATURE_DATE_TOLERANCE_DAYS,
};

use crate::client::RemoteLedger;
use crate::error::{Result, SyncError};
use crate::monitor::NetworkMonitor;
use crate::types::RemoteTransaction;

/// Clears the draining flag when a pass ends, including on cancellation.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Where an operation goes after target resolution.
enum Route {
    Send(Option<Identity>),
    /// Deferred or dropped; already accounted for.
    Skip,
}

/// Mutable bookkeeping of a single pass.
#[derive(Default)]
struct PassState {
    summary: ReconcileSummary,
    mapping: TempIdMapping,
    /// Dedup signature -> temporary token of the create that claimed it.
    seen: HashMap<DedupSignature, Option<String>>,
    /// Temporary tokens whose create is still in the log.
    live_creates: HashSet<String>,
    confirmed: Vec<RecordSignature>,
}

pub struct Reconciler {
    operations: Arc<dyn PendingOperationRepositoryTrait>,
    cache: Arc<dyn EntityCacheRepositoryTrait>,
    remote: Arc<dyn RemoteLedger>,
    monitor: Option<Arc<NetworkMonitor>>,
    max_attempts: i32,
    draining: AtomicBool,
    rerun: AtomicBool,
}

impl Reconciler {
    pub fn new(
        operations: Arc<dyn PendingOperationRepositoryTrait>,
        cache: Arc<dyn EntityCacheRepositoryTrait>,
        remote: Arc<dyn RemoteLedger>,
    ) -> Self {
        Self {
            operations,
            cache,
            remote,
            monitor: None,
            max_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
            draining: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        }
    }

    /// Report transport failures to `monitor` so it re-probes.
    pub fn with_monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Run a pass unless one is already draining, in which case the request
    /// is folded into a single re-run after the current pass.
    pub async fn request(&self, trigger: SyncTrigger) -> Result<ReconcileOutcome> {
        if self.draining.swap(true, Ordering::AcqRel) {
            self.rerun.store(true, Ordering::Release);
            debug!(
                "[Reconciler] Pass already draining, coalescing {} request",
                trigger.as_str()
            );
            return Ok(ReconcileOutcome::Coalesced);
        }
        self.rerun.store(false, Ordering::Release);

        loop {
            let summary = {
                let _draining = DrainGuard(&self.draining);
                let mut summary = self.run_pass(trigger).await?;
                while !summary.interrupted && self.rerun.swap(false, Ordering::AcqRel) {
                    debug!("[Reconciler] Running coalesced pass");
                    summary = self.run_pass(trigger).await?;
                }
                summary
            };

            // A request may have been coalesced between the last check and
            // the guard releasing the flag.
            if !summary.interrupted
                && self.rerun.swap(false, Ordering::AcqRel)
                && !self.draining.swap(true, Ordering::AcqRel)
            {
                continue;
            }
            return Ok(ReconcileOutcome::Completed(summary));
        }
    }

    /// One pass over a snapshot of the log.
    pub async fn run_pass(&self, trigger: SyncTrigger) -> Result<ReconcileSummary> {
        let started = Instant::now();
        let today = Utc::now().date_naive();
        let snapshot = self.operations.list()?;
        if snapshot.is_empty() {
            debug!("[Reconciler] Nothing queued ({})", trigger.as_str());
            return Ok(ReconcileSummary::default());
        }
        info!(
            "[Reconciler] Pass started ({}) with {} queued operation(s)",
            trigger.as_str(),
            snapshot.len()
        );

        let mut pass = PassState {
            live_creates: snapshot
                .iter()
                .filter(|op| op.kind == OperationKind::Create)
                .filter_map(|op| temporary_token(op.target.as_ref()))
                .collect(),
            ..PassState::default()
        };

        for operation in &snapshot {
            if self.is_duplicate(operation, today, &mut pass).await? {
                continue;
            }

            let target = match self.resolve_target(operation, &mut pass).await? {
                Route::Send(target) => target,
                Route::Skip => continue,
            };

            let path = operation.request_path(target.as_ref().map(Identity::token));
            let body = match operation.kind {
                OperationKind::Delete => None,
                OperationKind::Create | OperationKind::Update => {
                    Some(with_default_description(&operation.payload))
                }
            };

            let outcome = self
                .remote
                .execute(operation.method, &path, body.as_ref())
                .await;

            match outcome {
                Ok(response) => {
                    self.apply_success(operation, target, response, today, &mut pass)
                        .await?
                }
                Err(err) if operation.kind == OperationKind::Delete && err.is_not_found() => {
                    debug!(
                        "[Reconciler] Delete {} already gone remotely",
                        operation.id
                    );
                    if let Some(target) = &target {
                        self.cache.remove(target).await?;
                    }
                    self.operations.remove(&operation.id).await?;
                    pass.summary.succeeded += 1;
                }
                Err(err) if err.is_connectivity() => {
                    warn!(
                        "[Reconciler] Remote unreachable during pass, {} operation(s) stay queued: {}",
                        snapshot
                            .len()
                            .saturating_sub(pass.summary.processed() + pass.summary.deduplicated),
                        err
                    );
                    pass.summary.interrupted = true;
                    if let Some(monitor) = &self.monitor {
                        monitor.report_unreachable();
                    }
                    break;
                }
                Err(err) => self.reject(operation, err, &mut pass).await?,
            }
        }

        pass.summary.cleaned_up = self.cleanup_temporaries(&pass.confirmed).await?;
        pass.summary.duration_ms = started.elapsed().as_millis() as i64;
        info!(
            "[Reconciler] Pass finished: succeeded={} failed={} deferred={} deduplicated={} cleaned_up={} interrupted={} ({} ms)",
            pass.summary.succeeded,
            pass.summary.failed,
            pass.summary.deferred,
            pass.summary.deduplicated,
            pass.summary.cleaned_up,
            pass.summary.interrupted,
            pass.summary.duration_ms
        );
        Ok(pass.summary)
    }

    /// Drop an operation whose signature was already seen in this pass.
    async fn is_duplicate(
        &self,
        operation: &PendingOperation,
        today: NaiveDate,
        pass: &mut PassState,
    ) -> Result<bool> {
        let Some(signature) = operation.dedup_signature(today) else {
            return Ok(false);
        };

        if let Some(survivor) = pass.seen.get(&signature) {
            if let (Some(duplicate), Some(survivor)) =
                (temporary_token(operation.target.as_ref()), survivor)
            {
                pass.mapping.alias(&duplicate, survivor);
                pass.live_creates.remove(&duplicate);
            }
            debug!(
                "[Reconciler] Dropping duplicate {:?} operation {}",
                operation.kind, operation.id
            );
            self.operations.remove(&operation.id).await?;
            pass.summary.deduplicated += 1;
            return Ok(true);
        }

        // A newer edit of the same record supersedes older signatures, so
        // only back-to-back identical edits collapse.
        if signature.target.is_some() {
            pass.seen
                .retain(|seen, _| seen.target.as_ref() != signature.target.as_ref());
        }
        let claimed_by = match operation.kind {
            OperationKind::Create => temporary_token(operation.target.as_ref()),
            OperationKind::Update | OperationKind::Delete => None,
        };
        pass.seen.insert(signature, claimed_by);
        Ok(false)
    }

    /// Target to address remotely, rewritten through the temp id mapping.
    async fn resolve_target(
        &self,
        operation: &PendingOperation,
        pass: &mut PassState,
    ) -> Result<Route> {
        if operation.kind == OperationKind::Create {
            return Ok(Route::Send(operation.target.clone()));
        }

        match &operation.target {
            Some(Identity::Temporary(token)) => {
                if let Some(confirmed) = pass.mapping.resolve(token) {
                    return Ok(Route::Send(Some(Identity::confirmed(confirmed))));
                }
                let canonical = pass.mapping.canonical(token).to_string();
                if pass.live_creates.contains(&canonical) {
                    debug!(
                        "[Reconciler] Deferring {:?} {}: target {} not confirmed yet",
                        operation.kind, operation.id, token
                    );
                    pass.summary.deferred += 1;
                    return Ok(Route::Skip);
                }
                // Queued after an earlier pass confirmed the create.
                if let Some(replacement) = self.cache.find_replacement(&canonical)? {
                    debug!(
                        "[Reconciler] {:?} {}: {} was confirmed as {}",
                        operation.kind, operation.id, token, replacement.identity
                    );
                    pass.mapping.record(token, replacement.identity.token());
                    return Ok(Route::Send(Some(replacement.identity)));
                }
                warn!(
                    "[Reconciler] Dropping {:?} {}: create for {} is gone",
                    operation.kind, operation.id, token
                );
                self.operations.remove(&operation.id).await?;
                pass.summary.failed += 1;
                Ok(Route::Skip)
            }
            Some(confirmed) => Ok(Route::Send(Some(confirmed.clone()))),
            None => {
                warn!(
                    "[Reconciler] Dropping {:?} {} without a target",
                    operation.kind, operation.id
                );
                self.operations.remove(&operation.id).await?;
                pass.summary.failed += 1;
                Ok(Route::Skip)
            }
        }
    }

    async fn apply_success(
        &self,
        operation: &PendingOperation,
        target: Option<Identity>,
        response: Option<Value>,
        today: NaiveDate,
        pass: &mut PassState,
    ) -> Result<()> {
        match operation.kind {
            OperationKind::Create => {
                let remote = match RemoteTransaction::from_body(response) {
                    Ok(remote) => remote,
                    Err(err) => {
                        // Accepted remotely but unusable locally. The
                        // temporary copy goes in cleanup and the next refresh
                        // brings the confirmed record in.
                        warn!(
                            "[Reconciler] Create {} succeeded with an unreadable response: {}",
                            operation.id, err
                        );
                        self.operations.remove(&operation.id).await?;
                        if let Some(temp) = target.filter(Identity::is_temporary) {
                            pass.live_creates.remove(temp.token());
                            if let Some(local) = self.cache.get(&temp)? {
                                pass.confirmed.push(local.signature());
                            }
                        }
                        pass.summary.succeeded += 1;
                        return Ok(());
                    }
                };
                self.confirm_create(operation, target, remote, today, pass)
                    .await?;
            }
            OperationKind::Update => {
                match RemoteTransaction::from_body(response) {
                    Ok(remote) => {
                        let record = remote.into_record(&operation.owner_id, today);
                        self.cache.upsert(record).await?;
                    }
                    Err(_) => {
                        if let Some(mut record) = match &target {
                            Some(target) => self.cache.get(target)?,
                            None => None,
                        } {
                            record.flags.pending_update = false;
                            self.cache.upsert(record).await?;
                        }
                    }
                }
                self.operations.remove(&operation.id).await?;
            }
            OperationKind::Delete => {
                if let Some(target) = &target {
                    self.cache.remove(target).await?;
                }
                self.operations.remove(&operation.id).await?;
            }
        }
        pass.summary.succeeded += 1;
        Ok(())
    }

    async fn confirm_create(
        &self,
        operation: &PendingOperation,
        target: Option<Identity>,
        remote: RemoteTransaction,
        today: NaiveDate,
        pass: &mut PassState,
    ) -> Result<()> {
        let confirmed_id = remote.id.clone();
        let record = remote.into_record(&operation.owner_id, today);

        let temp = match target.filter(Identity::is_temporary) {
            Some(temp) => Some(temp),
            None => self
                .cache
                .find_by_signature(&record.signature(), SIGNATURE_DATE_TOLERANCE_DAYS)?
                .map(|found| found.identity),
        };

        let Some(temp) = temp else {
            let stored = self.cache.upsert(record).await?;
            debug!(
                "[Reconciler] Create {} confirmed as {}",
                operation.id, stored.identity
            );
            pass.confirmed.push(stored.signature());
            self.operations.remove(&operation.id).await?;
            return Ok(());
        };

        pass.mapping.record(temp.token(), &confirmed_id);
        pass.live_creates.remove(temp.token());
        let local = self.cache.get(&temp)?;
        let stored = self.cache.mark_confirmed(&temp, record).await?;
        pass.confirmed.push(stored.signature());

        // Edits queued while the create was in flight follow the record to
        // its confirmed id, and the local copy keeps showing them.
        let retargeted = self.operations.retarget(&temp, &stored.identity).await?;
        if retargeted > 0 {
            if let Some(local) = local {
                let mut edited = stored.clone();
                edited.apply_edit(local.fields());
                self.cache.upsert(edited).await?;
            }
        }
        debug!(
            "[Reconciler] Create {} confirmed as {} ({} queued edit(s) retargeted)",
            operation.id, stored.identity, retargeted
        );

        self.operations.remove(&operation.id).await?;
        Ok(())
    }

    /// Count a remote rejection; drop the operation once it hit the bound.
    async fn reject(
        &self,
        operation: &PendingOperation,
        err: SyncError,
        pass: &mut PassState,
    ) -> Result<()> {
        pass.summary.failed += 1;
        let attempts = self
            .operations
            .record_failed_attempt(&operation.id, err.to_string())
            .await?;

        if attempts >= self.max_attempts {
            warn!(
                "[Reconciler] Dropping {:?} {} after {} attempt(s) ({:?}): {}",
                operation.kind,
                operation.id,
                attempts,
                err.retry_class(),
                err
            );
            self.operations.remove(&operation.id).await?;
            if operation.kind == OperationKind::Create {
                if let Some(token) = temporary_token(operation.target.as_ref()) {
                    pass.live_creates.remove(&token);
                }
            }
        } else {
            debug!(
                "[Reconciler] Keeping {} for retry ({}/{}): {}",
                operation.id, attempts, self.max_attempts, err
            );
        }
        Ok(())
    }

    /// Remove temporary records made redundant by creates confirmed in this
    /// pass. Records whose create is still queued are left alone.
    async fn cleanup_temporaries(&self, confirmed: &[RecordSignature]) -> Result<usize> {
        if confirmed.is_empty() {
            return Ok(0);
        }

        let queued: HashSet<String> = self
            .operations
            .list()?
            .into_iter()
            .filter(|op| op.kind == OperationKind::Create)
            .filter_map(|op| temporary_token(op.target.as_ref()))
            .collect();

        let mut removed = 0;
        for record in self.cache.list_temporary()? {
            if queued.contains(record.identity.token()) {
                continue;
            }
            let signature = record.signature();
            if confirmed
                .iter()
                .any(|c| c.matches_approximately(&signature, SIGNATURE_DATE_TOLERANCE_DAYS))
                && self.cache.remove(&record.identity).await?
            {
                debug!("[Reconciler] Removed stale temporary {}", record.identity);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn temporary_token(identity: Option<&Identity>) -> Option<String> {
    match identity {
        Some(Identity::Temporary(token)) => Some(token.clone()),
        _ => None,
    }
}

/// Payload with a blank `description` replaced by `"<Kind> - <Category>"`.
fn with_default_description(payload: &Value) -> Value {
    let mut payload = payload.clone();
    let Some(object) = payload.as_object_mut() else {
        return payload;
    };

    let blank = object
        .get("description")
        .and_then(Value::as_str)
        .map_or(true, |d| d.trim().is_empty());
    if !blank {
        return payload;
    }

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .and_then(|kind| ledgerline_core::records::TransactionKind::parse(kind).ok());
    if let Some(kind) = kind {
        let category = object
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let description = default_description(kind, category);
        object.insert("description".to_string(), Value::String(description));
    }
    payload
}
