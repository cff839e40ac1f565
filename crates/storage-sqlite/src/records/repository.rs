//! Repository for the local entity cache.
//!
//! Record rows and their view memberships are always written in the same
//! writer transaction, so the identity -> view index never drifts from the
//! records it points at.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;

use ledgerline_core::errors::Result;
use ledgerline_core::records::{
    Category, DomainRecord, EntityCacheRepositoryTrait, Identity, RecordFlags, RecordSignature,
    ViewKey,
};

use super::model::{CachedCategoryDB, CachedRecordDB, ViewMemberDB};
use crate::db::{enum_to_db, get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{cache_view_members, cached_categories, cached_records};

fn write_record(conn: &mut SqliteConnection, record: &DomainRecord) -> Result<()> {
    let row = CachedRecordDB::from_domain(record)?;
    diesel::replace_into(cached_records::table)
        .values(&row)
        .execute(conn)
        .map_err(StorageError::from)?;

    purge_views(conn, &record.identity)?;
    let members = record
        .view_keys()
        .iter()
        .map(|view| ViewMemberDB::new(view, &record.identity))
        .collect::<Vec<_>>();
    diesel::insert_or_ignore_into(cache_view_members::table)
        .values(&members)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn purge_views(conn: &mut SqliteConnection, identity: &Identity) -> Result<usize> {
    let purged = diesel::delete(
        cache_view_members::table
            .filter(cache_view_members::identity_kind.eq(identity.kind_str()))
            .filter(cache_view_members::identity_token.eq(identity.token())),
    )
    .execute(conn)
    .map_err(StorageError::from)?;
    Ok(purged)
}

fn delete_record(conn: &mut SqliteConnection, identity: &Identity) -> Result<bool> {
    let deleted = diesel::delete(
        cached_records::table.find((identity.kind_str(), identity.token())),
    )
    .execute(conn)
    .map_err(StorageError::from)?;
    purge_views(conn, identity)?;
    Ok(deleted > 0)
}

pub struct EntityCacheRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl EntityCacheRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load_where_temporary(&self) -> Result<Vec<CachedRecordDB>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = cached_records::table
            .filter(cached_records::is_temporary.eq(1))
            .order(cached_records::updated_at.asc())
            .load::<CachedRecordDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows)
    }
}

#[async_trait]
impl EntityCacheRepositoryTrait for EntityCacheRepository {
    fn get(&self, identity: &Identity) -> Result<Option<DomainRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = cached_records::table
            .find((identity.kind_str(), identity.token()))
            .first::<CachedRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(CachedRecordDB::into_domain).transpose()
    }

    async fn upsert(&self, record: DomainRecord) -> Result<DomainRecord> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<DomainRecord> {
                write_record(conn, &record)?;
                Ok(record)
            })
            .await
    }

    async fn remove(&self, identity: &Identity) -> Result<bool> {
        let identity = identity.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                delete_record(conn, &identity)
            })
            .await
    }

    async fn mark_confirmed(
        &self,
        temp_identity: &Identity,
        confirmed: DomainRecord,
    ) -> Result<DomainRecord> {
        let temp_identity = temp_identity.clone();
        let mut confirmed = confirmed;
        confirmed.flags = RecordFlags {
            replaced_temp_id: temp_identity
                .is_temporary()
                .then(|| temp_identity.token().to_string()),
            ..RecordFlags::confirmed()
        };

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<DomainRecord> {
                let existed = delete_record(conn, &temp_identity)?;
                write_record(conn, &confirmed)?;
                debug!(
                    "Confirmed {} as {} (temporary row present: {})",
                    temp_identity, confirmed.identity, existed
                );
                Ok(confirmed)
            })
            .await
    }

    fn find_by_signature(
        &self,
        signature: &RecordSignature,
        tolerance_days: i64,
    ) -> Result<Option<DomainRecord>> {
        let kind = enum_to_db(&signature.kind)?;
        for row in self.load_where_temporary()? {
            if row.kind != kind {
                continue;
            }
            let record = row.into_domain()?;
            if record
                .signature()
                .matches_approximately(signature, tolerance_days)
            {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn find_replacement(&self, temp_token: &str) -> Result<Option<DomainRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = cached_records::table
            .filter(cached_records::is_temporary.eq(0))
            .filter(cached_records::replaced_temp_id.eq(temp_token))
            .order(cached_records::updated_at.desc())
            .first::<CachedRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(CachedRecordDB::into_domain).transpose()
    }

    fn list_view(&self, view: &ViewKey) -> Result<Vec<DomainRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = cache_view_members::table
            .inner_join(
                cached_records::table.on(cached_records::identity_kind
                    .eq(cache_view_members::identity_kind)
                    .and(cached_records::identity_token.eq(cache_view_members::identity_token))),
            )
            .filter(cache_view_members::view_key.eq(view.as_key()))
            .order((cached_records::date.desc(), cached_records::updated_at.desc()))
            .select(CachedRecordDB::as_select())
            .load::<CachedRecordDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(CachedRecordDB::into_domain).collect()
    }

    fn views_for(&self, identity: &Identity) -> Result<Vec<ViewKey>> {
        let mut conn = get_connection(&self.pool)?;
        let keys = cache_view_members::table
            .filter(cache_view_members::identity_kind.eq(identity.kind_str()))
            .filter(cache_view_members::identity_token.eq(identity.token()))
            .select(cache_view_members::view_key)
            .order(cache_view_members::view_key.asc())
            .load::<String>(&mut conn)
            .map_err(StorageError::from)?;
        keys.iter().map(|key| ViewKey::parse(key)).collect()
    }

    fn list_temporary(&self) -> Result<Vec<DomainRecord>> {
        self.load_where_temporary()?
            .into_iter()
            .map(CachedRecordDB::into_domain)
            .collect()
    }

    async fn replace_categories(&self, categories: Vec<Category>) -> Result<()> {
        let rows = categories
            .iter()
            .enumerate()
            .map(|(position, category)| CachedCategoryDB::from_domain(category, position as i32))
            .collect::<Result<Vec<_>>>()?;

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::delete(cached_categories::table)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                diesel::insert_into(cached_categories::table)
                    .values(&rows)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = cached_categories::table
            .order(cached_categories::position.asc())
            .load::<CachedCategoryDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(CachedCategoryDB::into_domain).collect()
    }
}
