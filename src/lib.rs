//! Scoped translator: resolves `scope.key` identifiers into localized text.
//! Scopes are batch-loaded from the record store (optionally through a
//! cross-session cache) with single-hop locale fallback, misses are tracked
//! and optionally created in authoring mode, and the whole table can be
//! exported to or imported from `;`-separated CSV.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fallback;
pub mod format;
pub mod mutation;
pub mod record;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod tracker;

pub use cache::{MemoryScopeCache, ScopeCache, SqliteScopeCache};
pub use config::TranslatorConfig;
pub use error::{CacheError, ConfigError, FormatError, StoreError, SyncError, TranslateError};
pub use format::Arg;
pub use record::{RecordPatch, TranslationRecord};
pub use resolver::{MissEvent, MissObserver, ResolutionSession, Translator};
pub use store::{SqliteStore, TranslationStore};
pub use sync::BulkSync;
pub use tracker::UntranslatedTracker;
