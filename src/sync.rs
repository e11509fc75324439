//! Bulk sync between the record store and `;`-separated CSV.
//!
//! Export writes a UTF-8 BOM, the header `uuid;code;label;tenant;text_<m>...`
//! and one row per record in primary-key order. Import parses the whole input
//! before writing anything, then upserts every row by `uuid` in one batch.
//! An empty text cell means "no text" for that mutation.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::SyncError;
use crate::record::RecordPatch;
use crate::store::TranslationStore;

pub const DELIMITER: u8 = b';';
pub const BOM: &[u8] = b"\xEF\xBB\xBF";
const TEXT_PREFIX: &str = "text_";
const SNAPSHOT_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub struct BulkSync {
    store: Arc<dyn TranslationStore>,
}

impl BulkSync {
    pub fn new(store: Arc<dyn TranslationStore>) -> Self {
        Self { store }
    }

    /// Export every record to `path`, creating or truncating it. Returns the row count.
    pub fn export<M: AsRef<str>>(&self, path: &Path, mutations: &[M]) -> Result<usize, SyncError> {
        let file = File::create(path)?;
        let rows = self.export_to_writer(BufWriter::new(file), mutations)?;
        info!(path = %path.display(), rows, "translations exported");
        Ok(rows)
    }

    pub fn export_to_writer<W: Write, M: AsRef<str>>(
        &self,
        mut writer: W,
        mutations: &[M],
    ) -> Result<usize, SyncError> {
        writer.write_all(BOM)?;
        let mut csv = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .from_writer(writer);

        let mut header = vec![
            "uuid".to_string(),
            "code".to_string(),
            "label".to_string(),
            "tenant".to_string(),
        ];
        header.extend(
            mutations
                .iter()
                .map(|m| format!("{TEXT_PREFIX}{}", m.as_ref())),
        );
        csv.write_record(&header)?;

        let records = self.store.all_ordered()?;
        for record in &records {
            let mut row = vec![
                record.uuid.as_str(),
                record.code.as_str(),
                record.label.as_str(),
                record.tenant.as_str(),
            ];
            row.extend(mutations.iter().map(|m| record.text(m.as_ref()).unwrap_or("")));
            csv.write_record(&row)?;
        }
        csv.flush()?;
        Ok(records.len())
    }

    /// Import a CSV file. Text columns for mutations outside `available` are ignored.
    pub fn import<M: AsRef<str>>(&self, path: &Path, available: &[M]) -> Result<usize, SyncError> {
        let file = File::open(path)?;
        let rows = self.import_from_reader(file, available)?;
        info!(path = %path.display(), rows, "translations imported");
        Ok(rows)
    }

    pub fn import_from_str<M: AsRef<str>>(&self, content: &str, available: &[M]) -> Result<usize, SyncError> {
        self.import_from_reader(content.as_bytes(), available)
    }

    pub fn import_from_reader<R: Read, M: AsRef<str>>(
        &self,
        mut reader: R,
        available: &[M],
    ) -> Result<usize, SyncError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let patches = parse_rows(data.strip_prefix(BOM).unwrap_or(&data), available)?;
        Ok(self.store.upsert_batch(&patches)?)
    }

    /// Export into `<dir>/<timestamp>.csv`, creating `dir` if needed.
    pub fn snapshot<M: AsRef<str>>(&self, dir: &Path, mutations: &[M]) -> Result<PathBuf, SyncError> {
        std::fs::create_dir_all(dir)?;
        let name = format!("{}.csv", chrono::Local::now().format(SNAPSHOT_FORMAT));
        let path = dir.join(name);
        self.export(&path, mutations)?;
        Ok(path)
    }
}

/// Parse the whole input into patches; any malformed row fails the lot.
fn parse_rows<M: AsRef<str>>(body: &[u8], available: &[M]) -> Result<Vec<RecordPatch>, SyncError> {
    let mut csv = csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .from_reader(body);

    let headers = csv.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let uuid_col = column("uuid").ok_or(SyncError::MissingColumn("uuid"))?;
    let code_col = column("code");
    let label_col = column("label");
    let tenant_col = column("tenant");

    // Mutation codes are opaque (`en-GB` is valid), so match on the prefix only.
    let mut text_cols: Vec<(usize, String)> = Vec::new();
    for (i, header) in headers.iter().enumerate() {
        let Some(mutation) = header.strip_prefix(TEXT_PREFIX) else {
            continue;
        };
        if available.iter().any(|m| m.as_ref() == mutation) {
            text_cols.push((i, mutation.to_string()));
        } else {
            warn!(column = header, "mutation not available here, column ignored");
        }
    }

    let mut patches = Vec::new();
    for row in csv.records() {
        let row = row?;
        let cell = |i: usize| row.get(i).unwrap_or("");
        let uuid = match cell(uuid_col) {
            "" => uuid::Uuid::new_v4().to_string(),
            given => given.to_string(),
        };
        let mut patch = RecordPatch {
            uuid: Some(uuid),
            code: code_col.map(|i| cell(i).to_string()),
            label: label_col.map(|i| cell(i).to_string()),
            tenant: tenant_col.map(|i| cell(i).to_string()),
            ..RecordPatch::default()
        };
        for (i, mutation) in &text_cols {
            let text = cell(*i);
            patch
                .text
                .insert(mutation.clone(), (!text.is_empty()).then(|| text.to_string()));
        }
        patches.push(patch);
    }
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslatorConfig;
    use crate::store::{Conflict, SqliteStore};

    fn sync() -> (Arc<SqliteStore>, BulkSync) {
        let registry = TranslatorConfig::with_mutations(&["cs", "en"]).registry();
        let store = Arc::new(SqliteStore::open_in_memory(&registry).unwrap());
        let sync = BulkSync::new(store.clone());
        (store, sync)
    }

    #[test]
    fn export_writes_bom_header_and_ordered_rows() {
        let (store, sync) = sync();
        for (uuid, code, cs) in [("b", "x.b", "B"), ("a", "x.a", "A")] {
            let patch = RecordPatch {
                uuid: Some(uuid.into()),
                code: Some(code.into()),
                label: Some(format!("label {uuid}")),
                ..RecordPatch::default()
            }
            .with_text("cs", Some(cs));
            store.upsert(&patch, Conflict::Uuid).unwrap();
        }

        let mut out = Vec::new();
        let rows = sync.export_to_writer(&mut out, &["cs", "en"]).unwrap();
        assert_eq!(rows, 2);
        assert!(out.starts_with(BOM));
        let text = String::from_utf8(out[BOM.len()..].to_vec()).unwrap();
        assert_eq!(
            text,
            "uuid;code;label;tenant;text_cs;text_en\n\
             a;x.a;label a;;A;\n\
             b;x.b;label b;;B;\n"
        );
    }

    #[test]
    fn import_ignores_unavailable_mutations() {
        let (store, sync) = sync();
        let rows = sync
            .import_from_str("uuid;label;text_cs;text_de\nu1;Hi;Ahoj;Hallo\n", &["cs", "en"])
            .unwrap();
        assert_eq!(rows, 1);
        let record = store.find_by_key("u1").unwrap().unwrap();
        assert_eq!(record.label, "Hi");
        assert_eq!(record.text("cs"), Some("Ahoj"));
        assert_eq!(record.text.len(), 1);
    }

    #[test]
    fn import_strips_bom_and_handles_quoting() {
        let (store, sync) = sync();
        let content = "\u{feff}uuid;text_cs\nu1;\"a;b\"\"c\"\n";
        sync.import_from_str(content, &["cs"]).unwrap();
        assert_eq!(store.find_by_key("u1").unwrap().unwrap().text("cs"), Some("a;b\"c"));
    }

    #[test]
    fn import_without_label_column_keeps_label() {
        let (store, sync) = sync();
        sync.import_from_str("uuid;label;text_cs\nu1;Original;A\n", &["cs"]).unwrap();
        sync.import_from_str("uuid;text_cs\nu1;B\n", &["cs"]).unwrap();
        let record = store.find_by_key("u1").unwrap().unwrap();
        assert_eq!(record.label, "Original");
        assert_eq!(record.text("cs"), Some("B"));
    }

    #[test]
    fn empty_cell_clears_text_and_empty_uuid_creates_record() {
        let (store, sync) = sync();
        sync.import_from_str("uuid;text_cs;text_en\nu1;A;B\n", &["cs", "en"]).unwrap();
        sync.import_from_str("uuid;text_cs;text_en\nu1;A;\n;New;\n", &["cs", "en"]).unwrap();
        assert_eq!(store.find_by_key("u1").unwrap().unwrap().text("en"), None);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn malformed_input_writes_nothing() {
        let (store, sync) = sync();
        let err = sync
            .import_from_str("uuid;text_cs\nu1;A\nu2;B;extra\n", &["cs"])
            .unwrap_err();
        assert!(matches!(err, SyncError::Csv(_)));
        assert_eq!(store.count().unwrap(), 0);

        let err = sync.import_from_str("code;text_cs\nx.y;A\n", &["cs"]).unwrap_err();
        assert!(matches!(err, SyncError::MissingColumn("uuid")));
    }

    #[test]
    fn import_merges_rows_into_records_authored_under_another_uuid() {
        let (store, sync) = sync();
        let authored = store
            .upsert(
                &RecordPatch {
                    code: Some("menu.home".into()),
                    ..RecordPatch::default()
                }
                .with_text("cs", Some("Domů")),
                Conflict::Code { update: &[] },
            )
            .unwrap();

        let rows = sync
            .import_from_str("uuid;code;text_cs\nother-uuid;menu.home;Doma\nu2;a.b;X\n", &["cs"])
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(store.count().unwrap(), 2);
        let record = store.find_by_key("menu.home").unwrap().unwrap();
        assert_eq!(record.uuid, authored.uuid);
        assert_eq!(record.text("cs"), Some("Doma"));
        assert_eq!(store.find_by_key("a.b").unwrap().unwrap().text("cs"), Some("X"));
    }

    #[test]
    fn text_columns_accept_any_mutation_code() {
        let registry = TranslatorConfig::from_json(
            r#"{"mutations": [{"code": "cs"}, {"code": "en-GB", "suffix": "_en_gb"}]}"#,
        )
        .unwrap()
        .registry();
        let store = Arc::new(SqliteStore::open_in_memory(&registry).unwrap());
        let sync = BulkSync::new(store.clone());
        sync.import_from_str("uuid;text_cs;text_en-GB\nu1;A;B\n", &["cs", "en-GB"])
            .unwrap();
        let record = store.find_by_key("u1").unwrap().unwrap();
        assert_eq!(record.text("en-GB"), Some("B"));
    }

    #[test]
    fn snapshot_creates_directory_and_file() {
        let (_store, sync) = sync();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("backups").join("translations");
        let path = sync.snapshot(&target, &["cs"]).unwrap();
        assert!(path.starts_with(&target));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
        let content = std::fs::read(&path).unwrap();
        assert!(content.starts_with(BOM));
    }

    #[test]
    fn export_to_unwritable_destination_fails() {
        let (_store, sync) = sync();
        let dir = tempfile::tempdir().unwrap();
        let err = sync
            .export(&dir.path().join("missing").join("out.csv"), &["cs"])
            .unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
