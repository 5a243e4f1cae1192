use promptml_core::CategoryKey;
use serde_json::Value;
use std::collections::HashMap;

/// Last delivered originating message per category.
#[derive(Debug, Default, Clone)]
pub struct NoteRegistry {
    entries: HashMap<CategoryKey, Vec<Value>>,
}

impl NoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CategoryKey) -> Option<&[Value]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Overwrites the entry; returns the message it replaced.
    pub fn set(&mut self, key: CategoryKey, message: Vec<Value>) -> Option<Vec<Value>> {
        self.entries.insert(key, message)
    }

    pub fn contains(&self, key: &CategoryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<CategoryKey> {
        let mut keys = self.entries.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
