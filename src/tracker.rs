//! Per-session record of identifiers that had no translation.
//! Stores identifier -> default text (first default seen wins); append-only
//! until the owning session is dropped.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct UntranslatedTracker {
    entries: BTreeMap<String, String>,
}

impl UntranslatedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `identifier` is seen.
    pub fn record(&mut self, identifier: &str, default_text: &str) -> bool {
        if self.entries.contains_key(identifier) {
            return false;
        }
        self.entries
            .insert(identifier.to_string(), default_text.to_string());
        true
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    /// Identifier -> default text, sorted by identifier.
    pub fn all(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// Group tracked identifiers by scope, titled with the configured scope
    /// label or the bare scope name.
    pub fn grouped(&self, scope_labels: &BTreeMap<String, String>) -> BTreeMap<String, Vec<(String, String)>> {
        let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (identifier, default_text) in &self.entries {
            let scope = identifier
                .split_once(crate::record::SCOPE_SEPARATOR)
                .map_or(identifier.as_str(), |(scope, _)| scope);
            let title = scope_labels
                .get(scope)
                .cloned()
                .unwrap_or_else(|| scope.to_string());
            groups
                .entry(title)
                .or_default()
                .push((identifier.clone(), default_text.clone()));
        }
        groups
    }
}
