use serde_json::{Value, json};
use std::collections::HashMap;

/// Last-resort records for a component whose API fetch failed
pub trait FallbackProvider: Send + Sync {
    fn fallback_data(&self, component_id: &str) -> Option<Vec<Value>>;
}

/// Provides nothing; exhausted API fetches resolve to an empty result
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFallback;

impl FallbackProvider for NoFallback {
    fn fallback_data(&self, _component_id: &str) -> Option<Vec<Value>> {
        None
    }
}

/// Fixed records keyed by exact component id
#[derive(Debug, Default, Clone)]
pub struct StaticFallback {
    records: HashMap<String, Vec<Value>>,
}

impl StaticFallback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_records(mut self, component_id: impl Into<String>, records: Vec<Value>) -> Self {
        self.records.insert(component_id.into(), records);
        self
    }

    pub fn insert(&mut self, component_id: impl Into<String>, records: Vec<Value>) {
        self.records.insert(component_id.into(), records);
    }
}

impl FallbackProvider for StaticFallback {
    fn fallback_data(&self, component_id: &str) -> Option<Vec<Value>> {
        self.records.get(component_id).cloned()
    }
}

/// Development dataset of user records.
#[must_use]
pub fn sample_users() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "John Doe", "email": "john@example.com", "role": "Admin"}),
        json!({"id": 2, "name": "Jane Smith", "email": "jane@example.com", "role": "User"}),
        json!({"id": 3, "name": "Bob Johnson", "email": "bob@example.com", "role": "Editor"}),
    ]
}

/// Development dataset of product records.
#[must_use]
pub fn sample_products() -> Vec<Value> {
    vec![
        json!({"id": 1, "name": "Laptop", "price": 999.99, "category": "Electronics"}),
        json!({"id": 2, "name": "Desk Chair", "price": 199.99, "category": "Furniture"}),
        json!({"id": 3, "name": "Coffee Mug", "price": 12.99, "category": "Kitchen"}),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_fallback_exact_match_only() {
        let provider = StaticFallback::new().with_records("ProductList", sample_products());
        assert_eq!(provider.fallback_data("ProductList").map(|r| r.len()), Some(3));
        assert!(provider.fallback_data("ProductListing").is_none());
        assert!(NoFallback.fallback_data("ProductList").is_none());
    }
}
