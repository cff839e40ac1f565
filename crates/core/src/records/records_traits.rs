use async_trait::async_trait;

use super::{Category, DomainRecord, Identity, RecordSignature, ViewKey};
use crate::errors::Result;

/// Local entity cache: client-visible records independent of the remote.
///
/// Every write keeps the view membership index in step with the record rows,
/// so a removed identity never lingers in any keyed view.
#[async_trait]
pub trait EntityCacheRepositoryTrait: Send + Sync {
    fn get(&self, identity: &Identity) -> Result<Option<DomainRecord>>;

    /// Insert or replace by identity; view memberships are recomputed.
    async fn upsert(&self, record: DomainRecord) -> Result<DomainRecord>;

    /// Delete by identity and purge it from every view. Returns whether a row existed.
    async fn remove(&self, identity: &Identity) -> Result<bool>;

    /// Replace the temporary record `temp_identity` with `confirmed`.
    ///
    /// Temporary flags are cleared, `replaced_temp_id` is set and the view
    /// entries of the temporary identity are rewritten in place.
    async fn mark_confirmed(
        &self,
        temp_identity: &Identity,
        confirmed: DomainRecord,
    ) -> Result<DomainRecord>;

    /// Best-effort lookup of a temporary record matching `signature`.
    fn find_by_signature(
        &self,
        signature: &RecordSignature,
        tolerance_days: i64,
    ) -> Result<Option<DomainRecord>>;

    /// The confirmed record that superseded the temporary record `temp_token`.
    fn find_replacement(&self, temp_token: &str) -> Result<Option<DomainRecord>>;

    fn list_view(&self, view: &ViewKey) -> Result<Vec<DomainRecord>>;

    fn views_for(&self, identity: &Identity) -> Result<Vec<ViewKey>>;

    fn list_temporary(&self) -> Result<Vec<DomainRecord>>;

    async fn replace_categories(&self, categories: Vec<Category>) -> Result<()>;

    fn list_categories(&self) -> Result<Vec<Category>>;
}
