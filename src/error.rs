//! Error taxonomy shared across the crate.
//! Identifier-shape violations are not errors: they are logged and resolution
//! carries on. Everything here is surfaced to the caller.

use thiserror::Error;

/// Configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no mutations configured")]
    NoMutations,
    #[error("default mutation '{0}' is not a configured mutation")]
    UnknownDefault(String),
    #[error("fallback edge {from} -> {to} names an unknown mutation")]
    UnknownFallback { from: String, to: String },
    #[error("mutation '{0}' falls back to itself")]
    SelfFallback(String),
    #[error("storage suffix '{suffix}' of mutation '{mutation}' is not a valid column suffix")]
    InvalidSuffix { mutation: String, suffix: String },
}

/// Failure inside the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store db error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("store has no column for mutation '{0}'")]
    UnknownColumn(String),
    #[error("record patch has no key to upsert on")]
    MissingKey,
}

/// Failure inside a cross-session cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Load(#[from] StoreError),
    #[error("cache db error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Template substitution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("template expects argument {index} but only {supplied} supplied")]
    MissingArgument { index: usize, supplied: usize },
    #[error("argument {index} cannot be formatted as {expected}")]
    TypeMismatch { index: usize, expected: &'static str },
}

/// Error returned by the translation resolver.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("mutation '{0}' is not available")]
    UnknownMutation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// Bulk export/import failure. The whole operation is aborted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("import file has no '{0}' column")]
    MissingColumn(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}
