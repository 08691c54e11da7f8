//! In-process value store
//!
//! Used for dry runs and tests. Keeps the latest value per key plus the full
//! write log in order.

use super::{StoreError, ValueStore};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
    writes: Vec<(String, f64)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, as another client of the store would
    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Every `set` call so far, in call order
    pub fn writes(&self) -> &[(String, f64)] {
        &self.writes
    }

    /// Latest value written or seeded under `key`
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl ValueStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: f64) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        self.writes.push((key.to_string(), value));
        Ok(())
    }
}
