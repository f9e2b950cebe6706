use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{ check_id, decode_record, encode_record, ConversationStore, IdGenerator };
use crate::error::{ MentorError, Result };
use crate::models::chat::Conversation;

/// Process-local store. Records are kept serialized so they behave like persisted ones.
pub struct InMemoryConversationStore {
    records: RwLock<BTreeMap<String, String>>,
    system_prompt: String,
    ids: IdGenerator,
}

impl InMemoryConversationStore {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            system_prompt: system_prompt.to_string(),
            ids: IdGenerator::new(),
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self) -> Result<String> {
        let mut records = self.records.write().await;
        let mut id = self.ids.next_id();
        while records.contains_key(&id) {
            id = self.ids.next_id();
        }
        let conversation = Conversation::new(id.as_str(), &self.system_prompt);
        records.insert(id.clone(), encode_record(&conversation)?);
        Ok(id)
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        check_id(id)?;
        let records = self.records.read().await;
        let raw = records.get(id).ok_or_else(|| MentorError::NotFound(id.to_string()))?;
        decode_record(id, raw.as_bytes())
    }

    async fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.read().await.keys().rev().cloned().collect())
    }

    async fn save(&self, id: &str, conversation: &Conversation) -> Result<()> {
        check_id(id)?;
        let encoded = encode_record(conversation)?;
        self.records.write().await.insert(id.to_string(), encoded);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check_id(id)?;
        match self.records.write().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(MentorError::NotFound(id.to_string())),
        }
    }
}
