//! Record store interface.
//! The resolver and the bulk sync engine only talk to this trait; the
//! SQLite implementation lives in [`sqlite`].

pub mod sqlite;

use crate::error::StoreError;
use crate::record::{Field, RecordPatch, ScopeTexts, TranslationRecord};

pub use sqlite::SqliteStore;

/// Which unique key an upsert collides on, and what it overwrites.
#[derive(Debug, Clone, Copy)]
pub enum Conflict<'a> {
    /// Keyed by primary key; every field present in the patch is applied.
    Uuid,
    /// Keyed by `(code, tenant)`; only `update` fields are rewritten on conflict.
    Code { update: &'a [Field] },
}

/// Persisted translation table with one text column per mutation.
pub trait TranslationStore: Send + Sync {
    /// Look a record up by primary key or code.
    fn find_by_key(&self, key: &str) -> Result<Option<TranslationRecord>, StoreError>;

    /// All texts of `scope` under `mutation`, with `fallback`'s column
    /// substituted where the primary column is absent. Rows without any text
    /// are left out.
    fn find_scope(
        &self,
        scope: &str,
        mutation: &str,
        fallback: Option<&str>,
        tenant: &str,
    ) -> Result<ScopeTexts, StoreError>;

    fn upsert(
        &self,
        patch: &RecordPatch,
        conflict: Conflict<'_>,
    ) -> Result<TranslationRecord, StoreError>;

    /// Upsert by primary key, all or nothing.
    fn upsert_batch(&self, patches: &[RecordPatch]) -> Result<usize, StoreError>;

    /// Every record in primary-key order.
    fn all_ordered(&self) -> Result<Vec<TranslationRecord>, StoreError>;

    /// Records belonging to `scope`, visible to `tenant`.
    fn scope_records(&self, scope: &str, tenant: &str)
        -> Result<Vec<TranslationRecord>, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;
}
