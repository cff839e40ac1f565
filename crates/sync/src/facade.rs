//! Mutation façade: the single entry point the UI uses to change records.
//!
//! While online, mutations go straight to the remote and the confirmed
//! result is cached. Otherwise, or when the target is still temporary, the
//! change is applied to the cache optimistically and queued for the
//! reconciler.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use log::{debug, error, info, warn};
use serde_json::Value;

use ledgerline_core::records::{
    Category, DomainRecord, EntityCacheRepositoryTrait, Identity, TransactionFields, ViewKey,
};
use ledgerline_core::sync::{
    HttpMethod, NewPendingOperation, OperationKind, PendingOperationRepositoryTrait, SyncTrigger,
    TRANSACTIONS_RESOURCE,
};
use ledgerline_core::Error;

use crate::client::RemoteLedger;
use crate::error::{Result, SyncError};
use crate::monitor::NetworkMonitor;
use crate::signal::WorkSignal;
use crate::types::RemoteTransaction;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn record_path(identity: &Identity) -> String {
    format!("{}/{}", TRANSACTIONS_RESOURCE, identity.token())
}

pub struct MutationFacade {
    operations: Arc<dyn PendingOperationRepositoryTrait>,
    cache: Arc<dyn EntityCacheRepositoryTrait>,
    remote: Arc<dyn RemoteLedger>,
    monitor: Arc<NetworkMonitor>,
    signal: Arc<WorkSignal>,
    owner_id: String,
}

impl MutationFacade {
    pub fn new(
        operations: Arc<dyn PendingOperationRepositoryTrait>,
        cache: Arc<dyn EntityCacheRepositoryTrait>,
        remote: Arc<dyn RemoteLedger>,
        monitor: Arc<NetworkMonitor>,
        signal: Arc<WorkSignal>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            operations,
            cache,
            remote,
            monitor,
            signal,
            owner_id: owner_id.into(),
        }
    }

    /// Whether a remote error should send the mutation down the offline path.
    fn falls_back(&self, err: &SyncError) -> bool {
        if err.is_connectivity() {
            warn!("[Mutations] Remote unreachable, queueing locally: {}", err);
            self.monitor.report_unreachable();
            return true;
        }
        false
    }

    /// A temporary identity whose create has been confirmed resolves to the
    /// confirmed record that replaced it.
    fn current_identity(&self, identity: &Identity) -> Result<Identity> {
        if !identity.is_temporary() || self.cache.get(identity)?.is_some() {
            return Ok(identity.clone());
        }
        Ok(self
            .cache
            .find_replacement(identity.token())?
            .map_or_else(|| identity.clone(), |record| record.identity))
    }

    pub async fn create(&self, fields: TransactionFields) -> Result<DomainRecord> {
        fields
            .validate()
            .map_err(|e| SyncError::invalid_request(e.to_string()))?;
        let fields = fields.normalized();

        if self.monitor.is_online() {
            let body = serde_json::to_value(&fields)?;
            match self
                .remote
                .execute(HttpMethod::Post, TRANSACTIONS_RESOURCE, Some(&body))
                .await
            {
                Ok(response) => {
                    let record =
                        RemoteTransaction::from_body(response)?.into_record(&self.owner_id, today());
                    debug!("[Mutations] Created {} remotely", record.identity);
                    return Ok(self.cache.upsert(record).await?);
                }
                Err(err) if self.falls_back(&err) => {}
                Err(err) => return Err(err),
            }
        }

        let record = DomainRecord::new_temporary(fields, &self.owner_id, today());
        let record = self.cache.upsert(record).await?;
        let payload = serde_json::to_value(record.fields())?;
        self.enqueue_or_revert(OperationKind::Create, &record, payload)
            .await?;
        Ok(record)
    }

    pub async fn update(&self, identity: &Identity, fields: TransactionFields) -> Result<DomainRecord> {
        fields
            .validate()
            .map_err(|e| SyncError::invalid_request(e.to_string()))?;
        let fields = fields.normalized();
        let identity = &self.current_identity(identity)?;

        if self.monitor.is_online() && !identity.is_temporary() {
            let body = serde_json::to_value(&fields)?;
            match self
                .remote
                .execute(HttpMethod::Put, &record_path(identity), Some(&body))
                .await
            {
                Ok(response) => {
                    let record = match RemoteTransaction::from_body(response) {
                        Ok(remote) => remote.into_record(&self.owner_id, today()),
                        Err(_) => {
                            DomainRecord::confirmed(identity.token(), fields, &self.owner_id, today())
                        }
                    };
                    debug!("[Mutations] Updated {} remotely", record.identity);
                    return Ok(self.cache.upsert(record).await?);
                }
                Err(err) if err.is_not_found() => {
                    warn!(
                        "[Mutations] {} not found remotely, keeping the edit locally",
                        identity
                    );
                }
                Err(err) if self.falls_back(&err) => {}
                Err(err) => return Err(err),
            }
        }

        let mut record = self
            .cache
            .get(identity)?
            .ok_or_else(|| Error::not_found(format!("Record {} is not cached", identity)))?;
        let previous = record.clone();
        record.apply_edit(fields);
        let record = self.cache.upsert(record).await?;

        let payload = serde_json::to_value(record.fields())?;
        let op = NewPendingOperation::new(
            OperationKind::Update,
            Some(record.identity.clone()),
            payload,
            &self.owner_id,
        );
        if let Err(err) = self.operations.append(op).await {
            if let Err(revert) = self.cache.upsert(previous).await {
                error!("[Mutations] Could not revert {}: {}", identity, revert);
            }
            return Err(err.into());
        }
        info!("[Mutations] Queued update for {}", record.identity);
        self.signal.notify(SyncTrigger::LocalMutation);
        Ok(record)
    }

    /// Delete a record. Deleting an unknown or already deleted record succeeds.
    pub async fn delete(&self, identity: &Identity) -> Result<()> {
        let identity = &self.current_identity(identity)?;
        if self.monitor.is_online() && !identity.is_temporary() {
            match self
                .remote
                .execute(HttpMethod::Delete, &record_path(identity), None)
                .await
            {
                Ok(_) => {
                    self.cache.remove(identity).await?;
                    debug!("[Mutations] Deleted {} remotely", identity);
                    return Ok(());
                }
                Err(err) if err.is_not_found() => {
                    debug!("[Mutations] {} already gone remotely", identity);
                }
                Err(err) if self.falls_back(&err) => {}
                Err(err) => return Err(err),
            }
        }

        let existing = self.cache.get(identity)?;
        let payload = match &existing {
            Some(record) => serde_json::to_value(record.fields())?,
            None => Value::Null,
        };
        self.cache.remove(identity).await?;

        let op = NewPendingOperation::new(
            OperationKind::Delete,
            Some(identity.clone()),
            payload,
            &self.owner_id,
        );
        if let Err(err) = self.operations.append(op).await {
            if let Some(record) = existing {
                if let Err(revert) = self.cache.upsert(record).await {
                    error!("[Mutations] Could not restore {}: {}", identity, revert);
                }
            }
            return Err(err.into());
        }
        info!("[Mutations] Queued delete for {}", identity);
        self.signal.notify(SyncTrigger::LocalMutation);
        Ok(())
    }

    async fn enqueue_or_revert(
        &self,
        kind: OperationKind,
        record: &DomainRecord,
        payload: Value,
    ) -> Result<()> {
        let op = NewPendingOperation::new(
            kind,
            Some(record.identity.clone()),
            payload,
            &self.owner_id,
        );
        if let Err(err) = self.operations.append(op).await {
            if let Err(revert) = self.cache.remove(&record.identity).await {
                error!(
                    "[Mutations] Could not drop unqueued {}: {}",
                    record.identity, revert
                );
            }
            return Err(err.into());
        }
        info!("[Mutations] Queued {:?} for {}", kind, record.identity);
        self.signal.notify(SyncTrigger::LocalMutation);
        Ok(())
    }

    pub fn list(&self, view: &ViewKey) -> Result<Vec<DomainRecord>> {
        Ok(self.cache.list_view(view)?)
    }

    pub fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.cache.list_categories()?)
    }

    /// Queued operations, for the "will sync" indicator.
    pub fn pending_count(&self) -> Result<i64> {
        Ok(self.operations.count()?)
    }

    /// Pull the remote list into the cache.
    ///
    /// Local records with unsynced changes win over the remote copy, records
    /// with a queued delete are not resurrected, and confirmed records the
    /// remote no longer has are dropped. Returns the number of records
    /// written.
    pub async fn refresh_transactions(&self) -> Result<usize> {
        if !self.monitor.is_online() {
            return Err(SyncError::unreachable(format!(
                "Remote is {}",
                self.monitor.current().as_str()
            )));
        }

        let remote = match self.remote.list_transactions().await {
            Ok(remote) => remote,
            Err(err) => {
                self.falls_back(&err);
                return Err(err);
            }
        };

        let queued_deletes: HashSet<Identity> = self
            .operations
            .list()?
            .into_iter()
            .filter(|op| op.kind == OperationKind::Delete)
            .filter_map(|op| op.target)
            .collect();

        let today = today();
        let mut remote_ids = HashSet::new();
        let mut written = 0;
        for transaction in remote {
            let identity = Identity::confirmed(transaction.id.clone());
            remote_ids.insert(identity.clone());
            if queued_deletes.contains(&identity) {
                continue;
            }
            if let Some(local) = self.cache.get(&identity)? {
                if local.is_pending() {
                    continue;
                }
            }
            self.cache
                .upsert(transaction.into_record(&self.owner_id, today))
                .await?;
            written += 1;
        }

        for local in self.cache.list_view(&ViewKey::All)? {
            if local.identity.is_temporary()
                || local.is_pending()
                || remote_ids.contains(&local.identity)
            {
                continue;
            }
            self.cache.remove(&local.identity).await?;
        }

        info!("[Mutations] Refreshed {} record(s) from remote", written);
        Ok(written)
    }

    /// Refresh the category cache when online; otherwise serve it as is.
    pub async fn refresh_categories(&self) -> Result<Vec<Category>> {
        if self.monitor.is_online() {
            match self.remote.list_categories().await {
                Ok(categories) => {
                    self.cache.replace_categories(categories.clone()).await?;
                    return Ok(categories);
                }
                Err(err) if self.falls_back(&err) => {}
                Err(err) => return Err(err),
            }
        }
        self.categories()
    }
}
