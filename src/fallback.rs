//! Single-hop fallback table: mutation -> mutation consulted when the
//! primary text is absent. Chains are never followed past one hop.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    edges: HashMap<String, String>,
}

impl FallbackTable {
    pub fn new(edges: HashMap<String, String>) -> Self {
        Self { edges }
    }

    pub fn fallback_of(&self, mutation: &str) -> Option<&str> {
        self.edges.get(mutation).map(String::as_str)
    }
}
