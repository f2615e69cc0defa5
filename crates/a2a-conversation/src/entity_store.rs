//! Entity memory: per user id, per entity type, deduplicated list (§6
//! "Persisted state layout"). Same single-writer-plus-atomic-rename shape as
//! [`crate::store::ConversationStore`], keyed by user id instead of thread id.

use std::path::PathBuf;
use std::sync::Arc;

use a2a_types::entity::{EntityRecord, DEFAULT_MAX_PER_TYPE};
use a2a_types::EntityMemory;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::ConversationError;
use crate::persistence::{load_snapshot, save_snapshot};

pub struct EntityMemoryStore {
    data_dir: PathBuf,
    by_user: Arc<DashMap<String, Arc<Mutex<EntityMemory>>>>,
}

impl EntityMemoryStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir, by_user: Arc::new(DashMap::new()) }
    }

    fn path(&self, user_id: &str) -> PathBuf {
        self.data_dir.join(format!("entities-{user_id}.json"))
    }

    fn handle(&self, user_id: &str) -> Result<Arc<Mutex<EntityMemory>>, ConversationError> {
        if let Some(existing) = self.by_user.get(user_id) {
            return Ok(existing.clone());
        }
        let path = self.path(user_id);
        let memory = if path.exists() { load_snapshot(&path)? } else { EntityMemory::new(DEFAULT_MAX_PER_TYPE) };
        let handle = Arc::new(Mutex::new(memory));
        self.by_user.insert(user_id.to_string(), handle.clone());
        Ok(handle)
    }

    pub async fn upsert_many(&self, user_id: &str, entity_type: &str, records: Vec<EntityRecord>) -> Result<(), ConversationError> {
        let handle = self.handle(user_id)?;
        let mut memory = handle.lock().await;
        for record in records {
            memory.upsert(entity_type, record);
        }
        save_snapshot(&self.path(user_id), &*memory)
    }

    pub async fn snapshot(&self, user_id: &str) -> Result<EntityMemory, ConversationError> {
        let handle = self.handle(user_id)?;
        Ok(handle.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upserts_persist_and_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = EntityMemoryStore::new(dir.path().to_path_buf());
            store
                .upsert_many("user-1", "account", vec![EntityRecord { key: "001X".into(), data: json!({"Name": "GenePoint"}) }])
                .await
                .unwrap();
        }
        let reopened = EntityMemoryStore::new(dir.path().to_path_buf());
        let snapshot = reopened.snapshot("user-1").await.unwrap();
        assert_eq!(snapshot.get("account").len(), 1);
    }
}
