//! Database models for cached records, view memberships and categories.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ledgerline_core::errors::{DatabaseError, Error, Result};
use ledgerline_core::records::{
    Category, DomainRecord, Identity, RecordFlags, TransactionKind, ViewKey,
};

use crate::db::{enum_from_db, enum_to_db};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(identity_kind, identity_token))]
#[diesel(table_name = crate::schema::cached_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CachedRecordDB {
    pub identity_kind: String,
    pub identity_token: String,
    pub kind: String,
    pub amount: String,
    pub category: String,
    pub date: String,
    pub description: String,
    pub owner_id: String,
    pub pending_add: i32,
    pub pending_update: i32,
    pub is_temporary: i32,
    pub replaced_temp_id: Option<String>,
    pub updated_at: String,
}

fn corrupt(what: &str, value: &str, err: impl std::fmt::Display) -> Error {
    Error::Database(DatabaseError::Internal(format!(
        "Invalid cached {} '{}': {}",
        what, value, err
    )))
}

impl CachedRecordDB {
    pub fn from_domain(record: &DomainRecord) -> Result<Self> {
        Ok(Self {
            identity_kind: record.identity.kind_str().to_string(),
            identity_token: record.identity.token().to_string(),
            kind: enum_to_db(&record.kind)?,
            amount: record.amount.to_string(),
            category: record.category.clone(),
            date: record.date.format("%Y-%m-%d").to_string(),
            description: record.description.clone(),
            owner_id: record.owner_id.clone(),
            pending_add: i32::from(record.flags.pending_add),
            pending_update: i32::from(record.flags.pending_update),
            is_temporary: i32::from(record.flags.is_temporary),
            replaced_temp_id: record.flags.replaced_temp_id.clone(),
            updated_at: record.updated_at.to_rfc3339(),
        })
    }

    pub fn into_domain(self) -> Result<DomainRecord> {
        let kind: TransactionKind = enum_from_db(&self.kind)?;
        let amount =
            Decimal::from_str(&self.amount).map_err(|e| corrupt("amount", &self.amount, e))?;
        let date = NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| corrupt("date", &self.date, e))?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| corrupt("timestamp", &self.updated_at, e))?
            .with_timezone(&Utc);

        Ok(DomainRecord {
            identity: Identity::from_parts(&self.identity_kind, self.identity_token)?,
            kind,
            amount,
            category: self.category,
            date,
            description: self.description,
            owner_id: self.owner_id,
            flags: RecordFlags {
                pending_add: self.pending_add != 0,
                pending_update: self.pending_update != 0,
                is_temporary: self.is_temporary != 0,
                replaced_temp_id: self.replaced_temp_id,
            },
            updated_at,
        })
    }
}

#[derive(Queryable, Insertable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::cache_view_members)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ViewMemberDB {
    pub view_key: String,
    pub identity_kind: String,
    pub identity_token: String,
}

impl ViewMemberDB {
    pub fn new(view: &ViewKey, identity: &Identity) -> Self {
        Self {
            view_key: view.as_key(),
            identity_kind: identity.kind_str().to_string(),
            identity_token: identity.token().to_string(),
        }
    }
}

#[derive(Queryable, Insertable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::cached_categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CachedCategoryDB {
    pub id: String,
    pub name: String,
    pub kind: Option<String>,
    pub position: i32,
}

impl CachedCategoryDB {
    pub fn from_domain(category: &Category, position: i32) -> Result<Self> {
        Ok(Self {
            id: category.id.clone(),
            name: category.name.clone(),
            kind: category.kind.as_ref().map(enum_to_db).transpose()?,
            position,
        })
    }

    pub fn into_domain(self) -> Result<Category> {
        Ok(Category {
            id: self.id,
            name: self.name,
            kind: self.kind.as_deref().map(enum_from_db).transpose()?,
        })
    }
}
