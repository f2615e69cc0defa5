//! EntityMemory — extracted domain entities, deduplicated and bounded (§3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default cap on stored entities per type before the oldest is evicted (§3).
pub const DEFAULT_MAX_PER_TYPE: usize = 200;

/// One extracted entity, keyed by a stable natural key (e.g. a Salesforce Id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub key: String,
    pub data: Value,
}

/// Mapping from entity type to a deduplicated, bounded set of entities (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityMemory {
    by_type: HashMap<String, Vec<EntityRecord>>,
    #[serde(default = "default_max_per_type")]
    max_per_type: usize,
}

fn default_max_per_type() -> usize {
    DEFAULT_MAX_PER_TYPE
}

impl EntityMemory {
    pub fn new(max_per_type: usize) -> Self {
        Self {
            by_type: HashMap::new(),
            max_per_type,
        }
    }

    /// Upserts a record by natural key, evicting the oldest entry of that type
    /// when the bound would otherwise be exceeded (§3: "deduplicated on write;
    /// bounded per type (oldest evicted)").
    pub fn upsert(&mut self, entity_type: &str, record: EntityRecord) {
        let bucket = self.by_type.entry(entity_type.to_string()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|r| r.key == record.key) {
            existing.data = record.data;
            return;
        }
        if bucket.len() >= self.max_per_type {
            bucket.remove(0);
        }
        bucket.push(record);
    }

    pub fn get(&self, entity_type: &str) -> &[EntityRecord] {
        self.by_type.get(entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.by_type.keys().map(String::as_str)
    }

    pub fn len(&self, entity_type: &str) -> usize {
        self.get(entity_type).len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(Vec::is_empty)
    }
}
