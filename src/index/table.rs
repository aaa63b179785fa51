//! Index implementation
//!
//! Insertion-ordered map from string keys to JSON values.

use std::collections::{btree_map, BTreeMap, HashMap};

use serde_json::Value;

use super::Flow;

struct Slot {
    /// Insertion sequence; position in `order`
    seq: u64,
    value: Value,
}

/// In-memory index of live keys
#[derive(Default)]
pub struct Index {
    entries: HashMap<String, Slot>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Index {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite. An existing key keeps its position.
    pub fn insert(&mut self, key: String, value: Value) {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.value = value;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, Slot { seq, value });
    }

    /// Remove a key, returning its value if it was present
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.value)
    }

    /// Set or delete: `None` and `Some(Value::Null)` remove the key
    pub fn apply(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) if !value.is_null() => self.insert(key.to_string(), value),
            _ => {
                self.remove(key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Visit entries in insertion order until the visitor returns `Flow::Stop`.
    /// Returns the number of entries visited.
    pub fn for_each<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&str, &Value) -> Flow,
    {
        let mut visited = 0;
        for (key, value) in self.iter() {
            visited += 1;
            if visitor(key, value).is_stop() {
                break;
            }
        }
        visited
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> IndexIter<'_> {
        IndexIter {
            order: self.order.values(),
            entries: &self.entries,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Iterator over index entries in insertion order
pub struct IndexIter<'a> {
    order: btree_map::Values<'a, u64, String>,
    entries: &'a HashMap<String, Slot>,
}

impl<'a> Iterator for IndexIter<'a> {
    type Item = (&'a str, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.order.next()?;
        let slot = self.entries.get(key)?;
        Some((key.as_str(), &slot.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}
