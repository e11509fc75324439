//! Translation resolver.
//!
//! A [`Translator`] holds the process-wide, read-only pieces (configuration,
//! mutation registry, fallback table) and borrowed collaborators (store,
//! optional cross-session cache). Each unit of work opens a
//! [`ResolutionSession`] bound to one mutation; the session owns the
//! per-scope memo and the untranslated tracker and is dropped at the end.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{scope_cache_key, MemoryScopeCache, ScopeCache};
use crate::config::TranslatorConfig;
use crate::error::{ConfigError, TranslateError};
use crate::fallback::FallbackTable;
use crate::format::{format_template, Arg};
use crate::mutation::MutationRegistry;
use crate::record::{Field, RecordPatch, ScopeKey, ScopeTexts, TranslationRecord};
use crate::store::{Conflict, TranslationStore};
use crate::tracker::UntranslatedTracker;

/// Wraps the key of a missing translation outside the default mutation.
pub const MISSING_MARKER: char = '░';

/// A resolution that found no text.
#[derive(Debug, Clone)]
pub struct MissEvent<'a> {
    pub identifier: &'a str,
    pub default_text: &'a str,
    pub mutation: &'a str,
    /// This miss inserted a new record (authoring mode).
    pub created: bool,
}

/// Notified on every miss. Wired by the host application, e.g. to feed a
/// debug panel.
pub trait MissObserver: Send + Sync {
    fn on_miss(&self, event: &MissEvent<'_>);
}

/// Logs every miss through `tracing`.
#[derive(Debug, Default)]
pub struct TracingMissObserver;

impl MissObserver for TracingMissObserver {
    fn on_miss(&self, event: &MissEvent<'_>) {
        info!(
            identifier = event.identifier,
            mutation = event.mutation,
            created = event.created,
            "untranslated identifier"
        );
    }
}

pub struct Translator {
    config: TranslatorConfig,
    registry: MutationRegistry,
    fallbacks: FallbackTable,
    store: Arc<dyn TranslationStore>,
    cache: Option<Arc<dyn ScopeCache>>,
    observers: Vec<Arc<dyn MissObserver>>,
}

impl Translator {
    /// Validates `config`. When caching is enabled an in-memory scope cache
    /// is attached; replace it with [`Translator::with_cache`].
    pub fn new(
        config: TranslatorConfig,
        store: Arc<dyn TranslationStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache: Option<Arc<dyn ScopeCache>> = if config.cache {
            Some(Arc::new(MemoryScopeCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            )))
        } else {
            None
        };
        Ok(Self {
            registry: config.registry(),
            fallbacks: config.fallback_table(),
            config,
            store,
            cache,
            observers: Vec::new(),
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn ScopeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MissObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &MutationRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TranslationStore> {
        &self.store
    }

    pub fn is_available(&self, mutation: &str) -> bool {
        self.registry.is_available(mutation)
    }

    /// Open a session resolving under `mutation`.
    pub fn session(&self, mutation: &str) -> Result<ResolutionSession<'_>, TranslateError> {
        let mutation = self.registry.require(mutation)?;
        Ok(ResolutionSession {
            translator: self,
            mutation: mutation.code.clone(),
            scopes: HashMap::new(),
            untranslated: UntranslatedTracker::new(),
            authored: HashSet::new(),
        })
    }

    pub fn default_session(&self) -> ResolutionSession<'_> {
        ResolutionSession {
            translator: self,
            mutation: self.registry.default_mutation().to_string(),
            scopes: HashMap::new(),
            untranslated: UntranslatedTracker::new(),
            authored: HashSet::new(),
        }
    }

    /// Records of one scope visible to the configured tenant.
    pub fn translations(&self, scope: &str) -> Result<Vec<TranslationRecord>, TranslateError> {
        Ok(self.store.scope_records(scope, &self.config.tenant)?)
    }
}

/// One unit of work resolving under a single mutation. Not shared between threads.
pub struct ResolutionSession<'t> {
    translator: &'t Translator,
    mutation: String,
    scopes: HashMap<String, Arc<ScopeTexts>>,
    untranslated: UntranslatedTracker,
    /// Identifiers already written by authoring mode in this session.
    authored: HashSet<String>,
}

impl<'t> ResolutionSession<'t> {
    pub fn mutation(&self) -> &str {
        &self.mutation
    }

    pub fn is_default_mutation(&self) -> bool {
        self.mutation == self.translator.registry.default_mutation()
    }

    pub fn untranslated(&self) -> &UntranslatedTracker {
        &self.untranslated
    }

    /// Scopes memoized so far in this session.
    pub fn loaded_scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Resolve `identifier` and substitute `args` into the result.
    pub fn translate(
        &mut self,
        identifier: &str,
        default_text: &str,
        args: &[Arg],
    ) -> Result<String, TranslateError> {
        let id = ScopeKey::parse(identifier);
        if !id.is_well_formed() {
            warn!(
                identifier,
                "use exactly one '.' to separate scope and key"
            );
        }

        let texts = self.scope_texts(id.scope)?;
        let template = match texts.get(identifier) {
            Some(text) => text.clone(),
            None => {
                self.on_miss(identifier, default_text)?;
                self.missing_text(id.key, default_text)
            }
        };

        Ok(format_template(&template, args)?)
    }

    /// [`ResolutionSession::translate`] without arguments.
    pub fn text(&mut self, identifier: &str, default_text: &str) -> Result<String, TranslateError> {
        self.translate(identifier, default_text, &[])
    }

    fn scope_texts(&mut self, scope: &str) -> Result<Arc<ScopeTexts>, TranslateError> {
        if let Some(texts) = self.scopes.get(scope) {
            return Ok(Arc::clone(texts));
        }

        let translator = self.translator;
        let mutation = self.mutation.as_str();
        let fallback = translator.fallbacks.fallback_of(mutation);
        let tenant = translator.config.tenant.as_str();
        let mut load = || translator.store.find_scope(scope, mutation, fallback, tenant);

        let texts = match &translator.cache {
            Some(cache) if translator.config.cache => {
                let key = scope_cache_key(tenant, scope, mutation);
                cache.load_or_compute(&key, &mut load)?
            }
            _ => Arc::new(load()?),
        };

        self.scopes.insert(scope.to_string(), Arc::clone(&texts));
        Ok(texts)
    }

    fn on_miss(&mut self, identifier: &str, default_text: &str) -> Result<(), TranslateError> {
        let translator = self.translator;
        debug!(identifier, mutation = %self.mutation, "translation missing");

        if translator.config.track_untranslated {
            self.untranslated.record(identifier, default_text);
        }

        let created = if translator.config.create_mode && !self.authored.contains(identifier) {
            let inserted = self.create_record(identifier, default_text)?;
            self.authored.insert(identifier.to_string());
            inserted
        } else {
            false
        };

        let event = MissEvent {
            identifier,
            default_text,
            mutation: &self.mutation,
            created,
        };
        for observer in &translator.observers {
            observer.on_miss(&event);
        }
        Ok(())
    }

    /// Upsert by code; an existing record only gets its label refreshed.
    /// Returns whether a new record was inserted.
    fn create_record(&self, identifier: &str, default_text: &str) -> Result<bool, TranslateError> {
        let config = &self.translator.config;
        let uuid = uuid::Uuid::new_v4().to_string();
        let patch = RecordPatch {
            uuid: Some(uuid.clone()),
            code: Some(identifier.to_string()),
            label: Some(default_text.to_string()),
            tenant: (!config.tenant.is_empty()).then(|| config.tenant.clone()),
            ..RecordPatch::default()
        }
        .with_text(self.translator.registry.default_mutation(), Some(default_text));

        let record = self
            .translator
            .store
            .upsert(&patch, Conflict::Code { update: &[Field::Label] })?;
        let inserted = record.uuid == uuid;
        if inserted {
            info!(identifier, uuid = %record.uuid, "translation record created");
        } else {
            debug!(identifier, uuid = %record.uuid, "translation record relabelled");
        }
        Ok(inserted)
    }

    fn missing_text(&self, key: &str, default_text: &str) -> String {
        if self.is_default_mutation() {
            default_text.to_string()
        } else {
            format!("{MISSING_MARKER}{key}{MISSING_MARKER}")
        }
    }
}
