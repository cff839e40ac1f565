//! In-memory remote ledger and SQLite-backed repositories for tests.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;

use ledgerline_core::records::{Category, TransactionFields};
use ledgerline_core::sync::{HttpMethod, TRANSACTIONS_RESOURCE};
use ledgerline_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, EntityCacheRepository,
    PendingOperationRepository,
};

use crate::client::{HealthProbe, RemoteLedger};
use crate::error::{Result, SyncError};
use crate::reconciler::Reconciler;
use crate::types::RemoteTransaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Status(u16),
    Unreachable,
}

impl Failure {
    fn into_error(self) -> SyncError {
        match self {
            Failure::Status(status) => SyncError::api(status, "injected failure"),
            Failure::Unreachable => SyncError::unreachable("injected transport failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
struct LedgerState {
    records: BTreeMap<String, RemoteTransaction>,
    categories: Vec<Category>,
    next_id: u64,
    calls: Vec<RecordedCall>,
    injected: VecDeque<(HttpMethod, Failure)>,
    offline: bool,
}

/// Behaves like the real API: assigns ids on create, 404s unknown ids and
/// rejects blank descriptions with 422.
#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("fake ledger lock")
    }

    /// Fail the next request with `method`.
    pub fn fail_next(&self, method: HttpMethod, failure: Failure) {
        self.state().injected.push_back((method, failure));
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn seed(&self, fields: TransactionFields) -> RemoteTransaction {
        let mut state = self.state();
        state.next_id += 1;
        let record = RemoteTransaction {
            id: format!("srv-{}", state.next_id),
            kind: fields.kind,
            amount: fields.amount,
            category: fields.category,
            date: fields.date,
            description: fields.description,
        };
        state.records.insert(record.id.clone(), record.clone());
        record
    }

    pub fn set_categories(&self, categories: Vec<Category>) {
        self.state().categories = categories;
    }

    pub fn records(&self) -> Vec<RemoteTransaction> {
        self.state().records.values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_with(&self, method: HttpMethod) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

#[async_trait]
impl RemoteLedger for FakeLedger {
    async fn execute(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let mut state = self.state();
        state.calls.push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        if state.offline {
            return Err(SyncError::unreachable("fake ledger offline"));
        }
        if let Some(index) = state.injected.iter().position(|(m, _)| *m == method) {
            if let Some((_, failure)) = state.injected.remove(index) {
                return Err(failure.into_error());
            }
        }

        let id = path
            .strip_prefix(TRANSACTIONS_RESOURCE)
            .map(|rest| rest.trim_start_matches('/').to_string())
            .filter(|rest| !rest.is_empty());

        match (method, id) {
            (HttpMethod::Post, None) => {
                let fields: TransactionFields =
                    serde_json::from_value(body.cloned().unwrap_or(Value::Null))?;
                if fields.description.trim().is_empty() {
                    return Err(SyncError::api(422, "description is required"));
                }
                state.next_id += 1;
                let record = RemoteTransaction {
                    id: format!("srv-{}", state.next_id),
                    kind: fields.kind,
                    amount: fields.amount,
                    category: fields.category,
                    date: fields.date,
                    description: fields.description,
                };
                state.records.insert(record.id.clone(), record.clone());
                Ok(Some(serde_json::to_value(record)?))
            }
            (HttpMethod::Put, Some(id)) => {
                let fields: TransactionFields =
                    serde_json::from_value(body.cloned().unwrap_or(Value::Null))?;
                let Some(record) = state.records.get_mut(&id) else {
                    return Err(SyncError::api(404, "Transaction not found"));
                };
                record.kind = fields.kind;
                record.amount = fields.amount;
                record.category = fields.category;
                if fields.date.is_some() {
                    record.date = fields.date;
                }
                record.description = fields.description;
                Ok(Some(serde_json::to_value(record.clone())?))
            }
            (HttpMethod::Delete, Some(id)) => match state.records.remove(&id) {
                Some(_) => Ok(None),
                None => Err(SyncError::api(404, "Transaction not found")),
            },
            (HttpMethod::Get, None) => Ok(Some(serde_json::to_value(
                state.records.values().cloned().collect::<Vec<_>>(),
            )?)),
            _ => Err(SyncError::api(405, "method not allowed")),
        }
    }

    async fn list_transactions(&self) -> Result<Vec<RemoteTransaction>> {
        let state = self.state();
        if state.offline {
            return Err(SyncError::unreachable("fake ledger offline"));
        }
        Ok(state.records.values().cloned().collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state();
        if state.offline {
            return Err(SyncError::unreachable("fake ledger offline"));
        }
        Ok(state.categories.clone())
    }
}

#[async_trait]
impl HealthProbe for FakeLedger {
    async fn check_health(&self) -> Result<()> {
        if self.state().offline {
            Err(SyncError::unreachable("fake ledger offline"))
        } else {
            Ok(())
        }
    }
}

/// Real SQLite repositories in a temp dir plus a fake remote.
pub struct Harness {
    _dir: TempDir,
    pub operations: Arc<PendingOperationRepository>,
    pub cache: Arc<EntityCacheRepository>,
    pub remote: Arc<FakeLedger>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = init(&dir.path().to_string_lossy()).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());

        Self {
            _dir: dir,
            operations: Arc::new(PendingOperationRepository::new(pool.clone(), writer.clone())),
            cache: Arc::new(EntityCacheRepository::new(pool, writer)),
            remote: FakeLedger::new(),
        }
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.operations.clone(),
            self.cache.clone(),
            self.remote.clone(),
        )
    }
}
