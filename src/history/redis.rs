use async_trait::async_trait;
use crate::models::chat::Conversation;
use crate::history::{ check_id, decode_record, encode_record, is_valid_id, ConversationStore, IdGenerator };
use crate::error::{ MentorError, Result };
use log::{ info, warn };
use redis::{ Client, AsyncCommands, AsyncIter };

/// One string key `<prefix><id>` per conversation. SET replaces a value in a
/// single step, so readers never see a partial record.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
    scan_count: usize,
    system_prompt: String,
    ids: IdGenerator,
}

impl RedisConversationStore {
    pub fn new(host: &str, key_prefix: &str, scan_count: usize, system_prompt: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
            scan_count: scan_count.max(1),
            system_prompt: system_prompt.to_string(),
            ids: IdGenerator::new(),
        })
    }

    async fn get_connection(&self) -> std::result::Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn create(&self) -> Result<String> {
        let mut conn = self.get_connection().await?;
        loop {
            let id = self.ids.next_id();
            let conversation = Conversation::new(id.as_str(), &self.system_prompt);
            let created: bool = conn.set_nx(self.key(&id), encode_record(&conversation)?).await?;
            if created {
                info!("Created conversation {}", id);
                return Ok(id);
            }
        }
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        check_id(id)?;
        let mut conn = self.get_connection().await?;
        let raw: Option<String> = conn.get(self.key(id)).await?;
        let raw = raw.ok_or_else(|| MentorError::NotFound(id.to_string()))?;
        decode_record(id, raw.as_bytes())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let pattern = format!("{}*", self.key_prefix);
        let mut cmd = redis::cmd("SCAN");
        cmd.cursor_arg(0).arg("MATCH").arg(&pattern).arg("COUNT").arg(self.scan_count);
        let mut keys: AsyncIter<String> = cmd.iter_async(&mut conn).await?;

        let mut ids = Vec::new();
        while let Some(key) = keys.next_item().await {
            match key.strip_prefix(&self.key_prefix) {
                Some(id) if is_valid_id(id) => ids.push(id.to_string()),
                _ => warn!("Skipping unexpected key in conversation namespace: {}", key),
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids.dedup();
        Ok(ids)
    }

    async fn save(&self, id: &str, conversation: &Conversation) -> Result<()> {
        check_id(id)?;
        let mut conn = self.get_connection().await?;
        let _: () = conn.set(self.key(id), encode_record(conversation)?).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check_id(id)?;
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.del(self.key(id)).await?;
        if removed == 0 {
            return Err(MentorError::NotFound(id.to_string()));
        }
        info!("Deleted conversation {}", id);
        Ok(())
    }
}
