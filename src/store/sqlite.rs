//! SQLite-backed translation store.
//! One row per (scope, key) with a `text<suffix>` column per mutation.
//! Missing mutation columns are added on open, so adding a locale to the
//! configuration needs no manual migration.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{Conflict, TranslationStore};
use crate::error::StoreError;
use crate::mutation::MutationRegistry;
use crate::record::{Field, RecordPatch, ScopeTexts, TranslationRecord, SCOPE_SEPARATOR};

const TABLE: &str = "translator_translation";

/// Fixed columns preceding the per-mutation text columns in every SELECT.
const BASE_COLUMNS: usize = 4;

pub struct SqliteStore {
    conn: Mutex<Connection>,
    /// (mutation code, column name) in registry order.
    columns: Vec<(String, String)>,
}

impl SqliteStore {
    /// Open (or create) the translation database at the given path.
    pub fn open(db_path: &Path, registry: &MutationRegistry) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self::with_connection(conn, registry)?;
        info!(
            path = %db_path.display(),
            mutations = store.columns.len(),
            "translation store opened"
        );
        Ok(store)
    }

    pub fn open_in_memory(registry: &MutationRegistry) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, registry)
    }

    fn with_connection(conn: Connection, registry: &MutationRegistry) -> Result<Self, StoreError> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} (
                uuid TEXT PRIMARY KEY,
                code TEXT NOT NULL DEFAULT '',
                label TEXT NOT NULL DEFAULT '',
                tenant TEXT NOT NULL DEFAULT ''
            );
            CREATE UNIQUE INDEX IF NOT EXISTS translation_unique_code
                ON {TABLE}(code, tenant) WHERE code <> '';"
        ))?;

        let existing: HashSet<String> = {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
            let names: HashSet<String> = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<_, _>>()?;
            names
        };

        let mut columns = Vec::new();
        for mutation in registry.iter() {
            let column = mutation.column();
            if !existing.contains(&column) {
                conn.execute_batch(&format!("ALTER TABLE {TABLE} ADD COLUMN {column} TEXT"))?;
                info!(column = %column, mutation = %mutation.code, "mutation column added");
            }
            columns.push((mutation.code.clone(), column));
        }

        Ok(Self {
            conn: Mutex::new(conn),
            columns,
        })
    }

    fn column(&self, mutation: &str) -> Result<&str, StoreError> {
        self.columns
            .iter()
            .find(|(code, _)| code == mutation)
            .map(|(_, column)| column.as_str())
            .ok_or_else(|| StoreError::UnknownColumn(mutation.to_string()))
    }

    fn select_sql(&self) -> String {
        let mut sql = String::from("SELECT uuid, code, label, tenant");
        for (_, column) in &self.columns {
            sql.push_str(", ");
            sql.push_str(column);
        }
        sql.push_str(" FROM ");
        sql.push_str(TABLE);
        sql
    }

    fn read_record(&self, row: &Row<'_>) -> rusqlite::Result<TranslationRecord> {
        let mut text = BTreeMap::new();
        for (i, (mutation, _)) in self.columns.iter().enumerate() {
            if let Some(value) = row.get::<_, Option<String>>(BASE_COLUMNS + i)? {
                text.insert(mutation.clone(), value);
            }
        }
        Ok(TranslationRecord {
            uuid: row.get(0)?,
            code: row.get(1)?,
            label: row.get(2)?,
            tenant: row.get(3)?,
            text,
        })
    }

    fn query_records(
        &self,
        conn: &Connection,
        clause: &str,
        values: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        let sql = format!("{} {clause}", self.select_sql());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values, |row| self.read_record(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_on(
        &self,
        conn: &Connection,
        patch: &RecordPatch,
        conflict: Conflict<'_>,
    ) -> Result<TranslationRecord, StoreError> {
        let uuid = match conflict {
            Conflict::Uuid => patch.uuid.clone().ok_or(StoreError::MissingKey)?,
            Conflict::Code { .. } => {
                if patch.code.as_deref().unwrap_or("").is_empty() {
                    return Err(StoreError::MissingKey);
                }
                patch
                    .uuid
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            }
        };
        let overwrites = |field: Field| match conflict {
            Conflict::Uuid => true,
            Conflict::Code { update } => update.contains(&field),
        };

        let mut columns: Vec<&str> = vec!["uuid"];
        let mut values: Vec<Value> = vec![Value::Text(uuid.clone())];
        let mut updates: Vec<&str> = Vec::new();

        for (field, column, value) in [
            (Field::Code, "code", &patch.code),
            (Field::Label, "label", &patch.label),
            (Field::Tenant, "tenant", &patch.tenant),
        ] {
            if let Some(value) = value {
                columns.push(column);
                values.push(Value::Text(value.clone()));
                if overwrites(field) {
                    updates.push(column);
                }
            }
        }
        for (mutation, text) in &patch.text {
            let column = self.column(mutation)?;
            columns.push(column);
            values.push(text.clone().map_or(Value::Null, Value::Text));
            if overwrites(Field::Text) {
                updates.push(column);
            }
        }

        let target = match conflict {
            Conflict::Uuid => "(uuid)",
            Conflict::Code { .. } => "(code, tenant) WHERE code <> ''",
        };
        let action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let sets: Vec<String> = updates
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            format!("DO UPDATE SET {}", sets.join(", "))
        };
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {TABLE} ({}) VALUES ({}) ON CONFLICT{target} {action}",
            columns.join(", "),
            placeholders.join(", ")
        );
        conn.execute(&sql, params_from_iter(values.iter()))?;

        let found = match conflict {
            Conflict::Uuid => self.query_records(conn, "WHERE uuid = ?1", &[&uuid])?,
            Conflict::Code { .. } => {
                let code = patch.code.as_deref().unwrap_or("");
                let tenant = patch.tenant.as_deref().unwrap_or("");
                self.query_records(conn, "WHERE code = ?1 AND tenant = ?2", &[&code, &tenant])?
            }
        };
        found
            .into_iter()
            .next()
            .ok_or(StoreError::Db(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Point a uuid-keyed patch at the record that already owns its
    /// `(code, tenant)`, so a row authored elsewhere under another uuid
    /// updates that record instead of colliding with it.
    fn adopt_code_owner<'p>(
        &self,
        conn: &Connection,
        patch: &'p RecordPatch,
    ) -> Result<Cow<'p, RecordPatch>, StoreError> {
        let (Some(uuid), Some(code)) = (patch.uuid.as_deref(), patch.code.as_deref()) else {
            return Ok(Cow::Borrowed(patch));
        };
        if code.is_empty() {
            return Ok(Cow::Borrowed(patch));
        }
        let tenant: String = match patch.tenant.as_deref() {
            Some(tenant) => tenant.to_string(),
            None => conn
                .query_row(
                    &format!("SELECT tenant FROM {TABLE} WHERE uuid = ?1"),
                    params![uuid],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .unwrap_or_default(),
        };
        let owner = conn
            .query_row(
                &format!("SELECT uuid FROM {TABLE} WHERE code = ?1 AND tenant = ?2"),
                params![code, tenant],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match owner {
            Some(owner) if owner != uuid => {
                debug!(code, given = uuid, owner = %owner, "row matched existing record by code");
                Ok(Cow::Owned(RecordPatch {
                    uuid: Some(owner),
                    ..patch.clone()
                }))
            }
            _ => Ok(Cow::Borrowed(patch)),
        }
    }
}

impl TranslationStore for SqliteStore {
    fn find_by_key(&self, key: &str) -> Result<Option<TranslationRecord>, StoreError> {
        let conn = self.conn.lock();
        let sql = format!("{} WHERE uuid = ?1 OR code = ?1 LIMIT 1", self.select_sql());
        let record = conn
            .query_row(&sql, params![key], |row| self.read_record(row))
            .optional()?;
        Ok(record)
    }

    fn find_scope(
        &self,
        scope: &str,
        mutation: &str,
        fallback: Option<&str>,
        tenant: &str,
    ) -> Result<ScopeTexts, StoreError> {
        let primary = self.column(mutation)?;
        let text_expr = match fallback {
            Some(fallback) => {
                let secondary = self.column(fallback)?;
                format!("CASE WHEN {primary} IS NULL THEN {secondary} ELSE {primary} END")
            }
            None => primary.to_string(),
        };
        // Shared rows first so tenant-specific rows overwrite them.
        let sql = format!(
            "SELECT CASE WHEN length(code) > 0 THEN code ELSE uuid END, {text_expr}
             FROM {TABLE}
             WHERE (substr(uuid, 1, length(?1)) = ?1 OR substr(code, 1, length(?1)) = ?1)
               AND (tenant = ?2 OR tenant = '')
             ORDER BY tenant <> '', uuid"
        );
        let prefix = format!("{scope}{SCOPE_SEPARATOR}");

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![prefix, tenant], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut texts = ScopeTexts::new();
        for row in rows {
            let (key, text) = row?;
            if let Some(text) = text {
                texts.insert(key, text);
            }
        }
        debug!(scope, mutation, fallback, keys = texts.len(), "scope loaded from store");
        Ok(texts)
    }

    fn upsert(
        &self,
        patch: &RecordPatch,
        conflict: Conflict<'_>,
    ) -> Result<TranslationRecord, StoreError> {
        let conn = self.conn.lock();
        self.upsert_on(&conn, patch, conflict)
    }

    fn upsert_batch(&self, patches: &[RecordPatch]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for patch in patches {
            let patch = self.adopt_code_owner(&tx, patch)?;
            self.upsert_on(&tx, &patch, Conflict::Uuid)?;
        }
        tx.commit()?;
        debug!(count = patches.len(), "record batch upserted");
        Ok(patches.len())
    }

    fn all_ordered(&self) -> Result<Vec<TranslationRecord>, StoreError> {
        let conn = self.conn.lock();
        self.query_records(&conn, "ORDER BY uuid", &[])
    }

    fn scope_records(
        &self,
        scope: &str,
        tenant: &str,
    ) -> Result<Vec<TranslationRecord>, StoreError> {
        let prefix = format!("{scope}{SCOPE_SEPARATOR}");
        let conn = self.conn.lock();
        self.query_records(
            &conn,
            "WHERE (substr(uuid, 1, length(?1)) = ?1 OR substr(code, 1, length(?1)) = ?1)
               AND (tenant = ?2 OR tenant = '')
             ORDER BY uuid",
            &[&prefix, &tenant],
        )
    }

    fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslatorConfig;

    fn store() -> SqliteStore {
        let config = TranslatorConfig::with_mutations(&["cs", "en"]);
        SqliteStore::open_in_memory(&config.registry()).unwrap()
    }

    fn by_uuid(uuid: &str) -> RecordPatch {
        RecordPatch {
            uuid: Some(uuid.into()),
            ..RecordPatch::default()
        }
    }

    #[test]
    fn find_scope_applies_fallback_in_query() {
        let store = store();
        let patch = RecordPatch {
            code: Some("basket.empty".into()),
            ..by_uuid("u1")
        }
        .with_text("cs", Some("Košík je prázdný"));
        store.upsert(&patch, Conflict::Uuid).unwrap();

        let en = store.find_scope("basket", "en", None, "").unwrap();
        assert!(en.is_empty());

        let en = store.find_scope("basket", "en", Some("cs"), "").unwrap();
        assert_eq!(en.get("basket.empty").map(String::as_str), Some("Košík je prázdný"));
    }

    #[test]
    fn explicit_empty_text_is_not_replaced_by_fallback() {
        let store = store();
        let patch = RecordPatch {
            code: Some("basket.note".into()),
            ..by_uuid("u1")
        }
        .with_text("cs", Some("Poznámka"))
        .with_text("en", Some(""));
        store.upsert(&patch, Conflict::Uuid).unwrap();

        let en = store.find_scope("basket", "en", Some("cs"), "").unwrap();
        assert_eq!(en.get("basket.note").map(String::as_str), Some(""));
    }

    #[test]
    fn find_scope_keys_by_uuid_when_code_is_empty() {
        let store = store();
        store
            .upsert(&by_uuid("menu.home").with_text("cs", Some("Domů")), Conflict::Uuid)
            .unwrap();
        let cs = store.find_scope("menu", "cs", None, "").unwrap();
        assert_eq!(cs.get("menu.home").map(String::as_str), Some("Domů"));
        // prefix match must not leak into neighbouring scopes
        assert!(store.find_scope("men", "cs", None, "").unwrap().is_empty());
    }

    #[test]
    fn tenant_rows_override_shared_rows() {
        let store = store();
        let shared = RecordPatch {
            code: Some("a.b".into()),
            ..by_uuid("u1")
        }
        .with_text("cs", Some("shared"));
        let own = RecordPatch {
            code: Some("a.b".into()),
            tenant: Some("shop1".into()),
            ..by_uuid("u2")
        }
        .with_text("cs", Some("own"));
        store.upsert(&shared, Conflict::Uuid).unwrap();
        store.upsert(&own, Conflict::Uuid).unwrap();

        let texts = store.find_scope("a", "cs", None, "shop1").unwrap();
        assert_eq!(texts.get("a.b").map(String::as_str), Some("own"));
        let texts = store.find_scope("a", "cs", None, "shop2").unwrap();
        assert_eq!(texts.get("a.b").map(String::as_str), Some("shared"));
        assert_eq!(store.scope_records("a", "shop2").unwrap().len(), 1);
    }

    #[test]
    fn code_conflict_only_updates_listed_fields() {
        let store = store();
        let first = RecordPatch {
            code: Some("basket.title".into()),
            label: Some("Basket".into()),
            ..RecordPatch::default()
        }
        .with_text("cs", Some("Basket"));
        let created = store
            .upsert(&first, Conflict::Code { update: &[Field::Label] })
            .unwrap();

        let second = RecordPatch {
            code: Some("basket.title".into()),
            label: Some("Your basket".into()),
            ..RecordPatch::default()
        }
        .with_text("cs", Some("Your basket"));
        let updated = store
            .upsert(&second, Conflict::Code { update: &[Field::Label] })
            .unwrap();

        assert_eq!(updated.uuid, created.uuid);
        assert_eq!(updated.label, "Your basket");
        assert_eq!(updated.text("cs"), Some("Basket"));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn uuid_upsert_leaves_unlisted_mutations_alone() {
        let store = store();
        let full = by_uuid("u1")
            .with_text("cs", Some("Ahoj"))
            .with_text("en", Some("Hello"));
        store.upsert(&full, Conflict::Uuid).unwrap();

        let partial = by_uuid("u1").with_text("en", Some("Hi"));
        let record = store.upsert(&partial, Conflict::Uuid).unwrap();
        assert_eq!(record.text("cs"), Some("Ahoj"));
        assert_eq!(record.text("en"), Some("Hi"));

        let cleared = by_uuid("u1").with_text("en", None);
        let record = store.upsert(&cleared, Conflict::Uuid).unwrap();
        assert_eq!(record.text("en"), None);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let store = store();
        let good = by_uuid("u1").with_text("cs", Some("ok"));
        let bad = by_uuid("u2").with_text("de", Some("nein"));
        assert!(matches!(
            store.upsert_batch(&[good, bad]),
            Err(StoreError::UnknownColumn(m)) if m == "de"
        ));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn batch_row_with_known_code_updates_existing_record() {
        let store = store();
        let authored = store
            .upsert(
                &RecordPatch {
                    code: Some("menu.home".into()),
                    label: Some("Home".into()),
                    ..RecordPatch::default()
                }
                .with_text("cs", Some("Domů")),
                Conflict::Code { update: &[] },
            )
            .unwrap();

        let incoming = RecordPatch {
            code: Some("menu.home".into()),
            ..by_uuid("elsewhere")
        }
        .with_text("cs", Some("Doma"));
        let fresh = RecordPatch {
            code: Some("a.b".into()),
            ..by_uuid("u2")
        }
        .with_text("cs", Some("X"));
        assert_eq!(store.upsert_batch(&[incoming, fresh]).unwrap(), 2);

        assert_eq!(store.count().unwrap(), 2);
        let record = store.find_by_key("menu.home").unwrap().unwrap();
        assert_eq!(record.uuid, authored.uuid);
        assert_eq!(record.label, "Home");
        assert_eq!(record.text("cs"), Some("Doma"));
        assert!(store.find_by_key("elsewhere").unwrap().is_none());
        assert_eq!(store.find_by_key("u2").unwrap().unwrap().text("cs"), Some("X"));
    }

    #[test]
    fn reopening_adds_new_mutation_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("translations.db");
        {
            let store = SqliteStore::open(&path, &TranslatorConfig::with_mutations(&["cs"]).registry())
                .unwrap();
            store.upsert(&by_uuid("u1").with_text("cs", Some("Ahoj")), Conflict::Uuid).unwrap();
        }
        let registry = TranslatorConfig::with_mutations(&["cs", "en"]).registry();
        let store = SqliteStore::open(&path, &registry).unwrap();
        let record = store.find_by_key("u1").unwrap().unwrap();
        assert_eq!(record.text("cs"), Some("Ahoj"));
        assert_eq!(record.text("en"), None);
        assert!(store.find_by_key("nope").unwrap().is_none());
    }
}
