//! Translator configuration loading and validation.
//! Loaded once at startup from a JSON file; the registry and fallback table
//! built from it are immutable for the life of the process.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::fallback::FallbackTable;
use crate::mutation::{Mutation, MutationRegistry};

/// One configured mutation. `suffix` defaults to `_<code>`.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationEntry {
    pub code: String,
    #[serde(default)]
    pub suffix: Option<String>,
}

impl MutationEntry {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            suffix: None,
        }
    }

    fn suffix(&self) -> String {
        self.suffix
            .clone()
            .unwrap_or_else(|| format!("_{}", self.code))
    }
}

/// On-disk configuration format.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    pub mutations: Vec<MutationEntry>,
    /// Falls back to the first configured mutation when unset.
    pub default_mutation: Option<String>,
    pub cache: bool,
    pub create_mode: bool,
    /// Record misses in the per-session untranslated tracker.
    pub track_untranslated: bool,
    pub fallbacks: HashMap<String, String>,
    pub scope_labels: BTreeMap<String, String>,
    /// Multi-tenant discriminator; empty means records are shared.
    pub tenant: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            mutations: vec![MutationEntry::new("cs")],
            default_mutation: None,
            cache: false,
            create_mode: false,
            track_untranslated: true,
            fallbacks: HashMap::new(),
            scope_labels: BTreeMap::new(),
            tenant: String::new(),
            cache_capacity: 512,
            cache_ttl_secs: 600,
        }
    }
}

impl TranslatorConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Convenience constructor for a set of mutation codes with default suffixes.
    pub fn with_mutations(codes: &[&str]) -> Self {
        Self {
            mutations: codes.iter().map(|c| MutationEntry::new(c)).collect(),
            ..Self::default()
        }
    }

    pub fn default_mutation(&self) -> &str {
        match &self.default_mutation {
            Some(code) => code.as_str(),
            None => self.mutations.first().map(|m| m.code.as_str()).unwrap_or(""),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mutations.is_empty() {
            return Err(ConfigError::NoMutations);
        }
        // Suffixes are spliced into SQL column names.
        let suffix_re = Regex::new(r"^[A-Za-z0-9_]+$").expect("static regex");
        for entry in &self.mutations {
            let suffix = entry.suffix();
            if !suffix_re.is_match(&suffix) {
                return Err(ConfigError::InvalidSuffix {
                    mutation: entry.code.clone(),
                    suffix,
                });
            }
        }

        let known = |code: &str| self.mutations.iter().any(|m| m.code == code);
        let default = self.default_mutation();
        if !known(default) {
            return Err(ConfigError::UnknownDefault(default.to_string()));
        }
        for (from, to) in &self.fallbacks {
            if !known(from) || !known(to) {
                return Err(ConfigError::UnknownFallback {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            if from == to {
                return Err(ConfigError::SelfFallback(from.clone()));
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> MutationRegistry {
        let mutations = self
            .mutations
            .iter()
            .map(|entry| Mutation {
                code: entry.code.clone(),
                suffix: entry.suffix(),
            })
            .collect();
        MutationRegistry::new(mutations, self.default_mutation())
    }

    pub fn fallback_table(&self) -> FallbackTable {
        FallbackTable::new(self.fallbacks.clone())
    }

    /// Human label for a scope, if one is configured.
    pub fn scope_label(&self, scope: &str) -> Option<&str> {
        self.scope_labels.get(scope).map(String::as_str)
    }
}
