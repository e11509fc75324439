//! Mutation registry: the fixed set of locale identifiers a deployment knows
//! about, each with the storage suffix addressing its text column.
//! Built once from configuration, read-only afterwards.

use crate::error::TranslateError;

/// A registered mutation and its column suffix (e.g. `cs` -> `_cs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub code: String,
    pub suffix: String,
}

impl Mutation {
    /// Name of the store column holding this mutation's text.
    pub fn column(&self) -> String {
        format!("text{}", self.suffix)
    }
}

#[derive(Debug, Clone)]
pub struct MutationRegistry {
    mutations: Vec<Mutation>,
    default: String,
}

impl MutationRegistry {
    /// Caller guarantees `default` is one of `mutations` (checked by config validation).
    pub fn new(mutations: Vec<Mutation>, default: impl Into<String>) -> Self {
        Self {
            mutations,
            default: default.into(),
        }
    }

    pub fn default_mutation(&self) -> &str {
        &self.default
    }

    pub fn is_available(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    fn get(&self, code: &str) -> Option<&Mutation> {
        self.mutations.iter().find(|m| m.code == code)
    }

    /// Resolve a requested mutation, failing fast when it is not registered.
    pub fn require(&self, code: &str) -> Result<&Mutation, TranslateError> {
        self.get(code)
            .ok_or_else(|| TranslateError::UnknownMutation(code.to_string()))
    }

    /// Registered mutations in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.mutations.iter()
    }

    pub fn codes(&self) -> Vec<String> {
        self.mutations.iter().map(|m| m.code.clone()).collect()
    }
}
