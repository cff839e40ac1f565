//! Database models for the pending operation log.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Identifiable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(primary_key(seq))]
#[diesel(table_name = crate::schema::pending_operations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingOperationDB {
    pub seq: i32,
    pub id: String,
    pub kind: String,
    pub resource: String,
    pub target_kind: Option<String>,
    pub target_token: Option<String>,
    pub method: String,
    pub payload: String,
    pub created_at: String,
    pub owner_id: String,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Insertable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::pending_operations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewPendingOperationDB {
    pub id: String,
    pub kind: String,
    pub resource: String,
    pub target_kind: Option<String>,
    pub target_token: Option<String>,
    pub method: String,
    pub payload: String,
    pub created_at: String,
    pub owner_id: String,
    pub attempts: i32,
    pub last_error: Option<String>,
}
