//! Translation records, partial updates and `scope.key` identifiers.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Resolved texts of one scope under one mutation, keyed by lookup key.
pub type ScopeTexts = HashMap<String, String>;

/// Separator between scope and key in an identifier.
pub const SCOPE_SEPARATOR: char = '.';

/// A persisted translation row.
///
/// `text` is three-state per mutation: missing key means "not translated",
/// an empty string was set on purpose, anything else is the translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub uuid: String,
    pub code: String,
    pub label: String,
    pub tenant: String,
    pub text: BTreeMap<String, String>,
}

impl TranslationRecord {
    /// Key the record is addressed by in scope lookups: `code`, or `uuid`
    /// for records imported without one.
    pub fn lookup_key(&self) -> &str {
        if self.code.is_empty() {
            &self.uuid
        } else {
            &self.code
        }
    }

    pub fn text(&self, mutation: &str) -> Option<&str> {
        self.text.get(mutation).map(String::as_str)
    }
}

/// Fields an upsert may touch on conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Code,
    Label,
    Tenant,
    Text,
}

/// Partial record used for upserts. Absent fields are left untouched;
/// a `None` text value clears that mutation's column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub uuid: Option<String>,
    pub code: Option<String>,
    pub label: Option<String>,
    pub tenant: Option<String>,
    pub text: BTreeMap<String, Option<String>>,
}

impl RecordPatch {
    pub fn with_text(mut self, mutation: &str, text: Option<&str>) -> Self {
        self.text
            .insert(mutation.to_string(), text.map(str::to_string));
        self
    }
}

/// A `scope.key` identifier split at the first separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeKey<'a> {
    pub identifier: &'a str,
    pub scope: &'a str,
    pub key: &'a str,
    separators: usize,
}

impl<'a> ScopeKey<'a> {
    /// Never fails; use [`ScopeKey::is_well_formed`] to detect contract
    /// violations. Without a separator the whole identifier is both scope and key.
    pub fn parse(identifier: &'a str) -> Self {
        let separators = identifier.matches(SCOPE_SEPARATOR).count();
        let (scope, key) = identifier
            .split_once(SCOPE_SEPARATOR)
            .unwrap_or((identifier, identifier));
        Self {
            identifier,
            scope,
            key,
            separators,
        }
    }

    pub fn is_well_formed(&self) -> bool {
        self.separators == 1
    }
}
