//! Repository for the pending operation log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;
use uuid::Uuid;

use ledgerline_core::errors::{DatabaseError, Error, Result};
use ledgerline_core::records::Identity;
use ledgerline_core::sync::{
    NewPendingOperation, PendingOperation, PendingOperationRepositoryTrait,
};

use super::model::{NewPendingOperationDB, PendingOperationDB};
use crate::db::{enum_from_db, enum_to_db, get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::pending_operations;

fn to_pending_operation(row: PendingOperationDB) -> Result<PendingOperation> {
    let target = match (row.target_kind, row.target_token) {
        (Some(kind), Some(token)) => Some(Identity::from_parts(&kind, token)?),
        _ => None,
    };
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Invalid created_at '{}' on pending operation {}: {}",
                row.created_at, row.id, e
            )))
        })?
        .with_timezone(&Utc);

    Ok(PendingOperation {
        id: row.id,
        kind: enum_from_db(&row.kind)?,
        resource: row.resource,
        target,
        method: enum_from_db(&row.method)?,
        payload: serde_json::from_str(&row.payload)?,
        created_at,
        owner_id: row.owner_id,
        attempts: row.attempts,
        last_error: row.last_error,
    })
}

pub struct PendingOperationRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl PendingOperationRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn list_impl(&self) -> Result<Vec<PendingOperation>> {
        let mut conn = get_connection(&self.pool)?;
        // `seq` is assigned at append time, so it is both append order and
        // creation-timestamp order.
        let rows = pending_operations::table
            .order(pending_operations::seq.asc())
            .load::<PendingOperationDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_pending_operation).collect()
    }
}

#[async_trait]
impl PendingOperationRepositoryTrait for PendingOperationRepository {
    async fn append(&self, operation: NewPendingOperation) -> Result<String> {
        let operation_id = Uuid::now_v7().to_string();
        let row = NewPendingOperationDB {
            id: operation_id.clone(),
            kind: enum_to_db(&operation.kind)?,
            resource: operation.resource.clone(),
            target_kind: operation
                .target
                .as_ref()
                .map(|target| target.kind_str().to_string()),
            target_token: operation
                .target
                .as_ref()
                .map(|target| target.token().to_string()),
            method: enum_to_db(&operation.method())?,
            payload: serde_json::to_string(&operation.payload)?,
            created_at: Utc::now().to_rfc3339(),
            owner_id: operation.owner_id,
            attempts: 0,
            last_error: None,
        };

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<String> {
                diesel::insert_into(pending_operations::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(row.id)
            })
            .await
            .inspect(|id| debug!("Queued pending operation {}", id))
    }

    fn list(&self) -> Result<Vec<PendingOperation>> {
        self.list_impl()
    }

    fn count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let total = pending_operations::table
            .select(count_star())
            .first::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }

    async fn remove(&self, operation_id: &str) -> Result<()> {
        let operation_id = operation_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(
                    pending_operations::table.filter(pending_operations::id.eq(operation_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn record_failed_attempt(&self, operation_id: &str, error: String) -> Result<i32> {
        let operation_id = operation_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<i32> {
                let updated = diesel::update(
                    pending_operations::table.filter(pending_operations::id.eq(&operation_id)),
                )
                .set((
                    pending_operations::attempts.eq(pending_operations::attempts + 1),
                    pending_operations::last_error.eq(Some(error)),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(Error::not_found(format!(
                        "Pending operation {} not found",
                        operation_id
                    )));
                }

                let attempts = pending_operations::table
                    .filter(pending_operations::id.eq(&operation_id))
                    .select(pending_operations::attempts)
                    .first::<i32>(conn)
                    .map_err(StorageError::from)?;
                Ok(attempts)
            })
            .await
    }

    async fn retarget(&self, from: &Identity, to: &Identity) -> Result<usize> {
        let (from, to) = (from.clone(), to.clone());
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let rewritten = diesel::update(
                    pending_operations::table
                        .filter(pending_operations::target_kind.eq(from.kind_str()))
                        .filter(pending_operations::target_token.eq(from.token())),
                )
                .set((
                    pending_operations::target_kind.eq(Some(to.kind_str())),
                    pending_operations::target_token.eq(Some(to.token())),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if rewritten > 0 {
                    debug!("Retargeted {} pending operation(s) from {} to {}", rewritten, from, to);
                }
                Ok(rewritten)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_db;
    use crate::db::{create_pool, spawn_writer};
    use ledgerline_core::sync::{HttpMethod, OperationKind};

    fn create_op(amount: &str) -> NewPendingOperation {
        NewPendingOperation::new(
            OperationKind::Create,
            Some(Identity::new_temporary()),
            serde_json::json!({ "type": "expense", "amount": amount, "category": "Food" }),
            "user-1",
        )
    }

    #[tokio::test]
    async fn list_returns_entries_in_append_order() {
        let (_dir, pool, writer) = setup_db();
        let repo = PendingOperationRepository::new(pool, writer);

        let first = repo.append(create_op("1")).await.expect("append");
        let second = repo
            .append(NewPendingOperation::new(
                OperationKind::Delete,
                Some(Identity::confirmed("srv-1")),
                serde_json::json!({}),
                "user-1",
            ))
            .await
            .expect("append");
        let third = repo.append(create_op("3")).await.expect("append");

        let listed = repo.list().expect("list");
        let ids = listed.iter().map(|op| op.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, vec![first, second, third]);
        assert_eq!(listed[1].method, HttpMethod::Delete);
        assert_eq!(listed[1].target, Some(Identity::confirmed("srv-1")));
        assert!(listed[0].targets_temporary());
        assert_eq!(repo.count().expect("count"), 3);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (_dir, pool, writer) = setup_db();
        let repo = PendingOperationRepository::new(pool, writer);

        let id = repo.append(create_op("5")).await.expect("append");
        repo.remove(&id).await.expect("first remove");
        repo.remove(&id).await.expect("second remove is a no-op");
        repo.remove("never-existed").await.expect("unknown id");
        assert!(repo.list().expect("list").is_empty());
    }

    #[tokio::test]
    async fn failed_attempts_are_counted() {
        let (_dir, pool, writer) = setup_db();
        let repo = PendingOperationRepository::new(pool, writer);

        let id = repo.append(create_op("8")).await.expect("append");
        assert_eq!(
            repo.record_failed_attempt(&id, "422 invalid".to_string())
                .await
                .expect("attempt 1"),
            1
        );
        assert_eq!(
            repo.record_failed_attempt(&id, "422 invalid".to_string())
                .await
                .expect("attempt 2"),
            2
        );
        let stored = repo.list().expect("list").remove(0);
        assert_eq!(stored.last_error.as_deref(), Some("422 invalid"));

        let missing = repo
            .record_failed_attempt("missing", "x".to_string())
            .await
            .unwrap_err();
        assert!(matches!(missing, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn retarget_rewrites_only_matching_entries() {
        let (_dir, pool, writer) = setup_db();
        let repo = PendingOperationRepository::new(pool, writer);

        let temp = Identity::new_temporary();
        let other = Identity::new_temporary();
        for target in [&temp, &other, &temp] {
            repo.append(NewPendingOperation::new(
                OperationKind::Update,
                Some(target.clone()),
                serde_json::json!({ "type": "expense", "amount": "9", "category": "Food" }),
                "user-1",
            ))
            .await
            .expect("append");
        }

        let confirmed = Identity::confirmed("srv-7");
        assert_eq!(repo.retarget(&temp, &confirmed).await.expect("retarget"), 2);
        assert_eq!(repo.retarget(&temp, &confirmed).await.expect("again"), 0);

        let targets = repo
            .list()
            .expect("list")
            .into_iter()
            .map(|op| op.target)
            .collect::<Vec<_>>();
        assert_eq!(
            targets,
            vec![Some(confirmed.clone()), Some(other), Some(confirmed)]
        );
    }

    #[tokio::test]
    async fn entries_survive_reopening_the_database() {
        let (dir, pool, writer) = setup_db();
        let id = PendingOperationRepository::new(pool, writer)
            .append(create_op("13"))
            .await
            .expect("append");

        let db_path = crate::db::init(&dir.path().to_string_lossy()).expect("init");
        let reopened = create_pool(&db_path).expect("pool");
        let writer = spawn_writer(reopened.as_ref().clone());
        let repo = PendingOperationRepository::new(reopened, writer);
        let listed = repo.list().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].payload["amount"], "13");
    }
}
