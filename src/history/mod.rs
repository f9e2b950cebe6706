mod file;
mod memory;
mod redis;

pub use self::file::FileConversationStore;
pub use self::memory::InMemoryConversationStore;
pub use self::redis::RedisConversationStore;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::info;
use std::error::Error;
use std::sync::atomic::{ AtomicI64, Ordering };
use std::sync::Arc;
use crate::cli::Args;
use crate::error::{ MentorError, Result };
use crate::models::chat::{ Conversation, ConversationRecord };

/// Keyed persistence for conversations. The set of stored ids is the index.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Writes a fresh conversation holding only the system prompt and returns its id.
    async fn create(&self) -> Result<String>;

    async fn load(&self, id: &str) -> Result<Conversation>;

    /// All ids, newest first.
    async fn list(&self) -> Result<Vec<String>>;

    /// Replaces the record for `id`. Readers never observe a partial write.
    async fn save(&self, id: &str, conversation: &Conversation) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;
}

/// Issues creation-time ids (`YYYYMMDD_HHMMSS_mmm`, UTC) that sort
/// lexicographically in creation order. Never repeats or goes backwards
/// within one generator, even when called twice in the same millisecond.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last_millis: AtomicI64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = match
            self.last_millis.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
        {
            Ok(prev) | Err(prev) => prev,
        };
        format_id(now.max(previous + 1))
    }
}

fn format_id(millis: i64) -> String {
    let at = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(Utc::now);
    at.format("%Y%m%d_%H%M%S_%3f").to_string()
}

/// Ids name files and keys, so only a conservative alphabet is accepted.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() &&
        id.len() <= 64 &&
        id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub(crate) fn check_id(id: &str) -> Result<()> {
    if is_valid_id(id) { Ok(()) } else { Err(MentorError::NotFound(id.to_string())) }
}

pub(crate) fn encode_record(conversation: &Conversation) -> Result<String> {
    serde_json::to_string_pretty(&conversation.to_record()).map_err(MentorError::storage)
}

pub(crate) fn decode_record(id: &str, bytes: &[u8]) -> Result<Conversation> {
    let record: ConversationRecord = serde_json
        ::from_slice(bytes)
        .map_err(|e| MentorError::CorruptRecord {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Conversation::from_record(id, record))
}

pub async fn create_conversation_store(
    args: &Args,
    system_prompt: &str
) -> std::result::Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "file" => {
            let store = FileConversationStore::new(&args.history_dir, system_prompt).await?;
            Ok(Arc::new(store))
        }
        "redis" => {
            let store = RedisConversationStore::new(
                &args.history_host,
                &args.history_redis_prefix,
                args.history_redis_scan_count,
                system_prompt
            )?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemoryConversationStore::new(system_prompt))),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub async fn initialize_conversation_store(
    args: &Args,
    system_prompt: &str
) -> std::result::Result<Arc<dyn ConversationStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "file" => info!("Conversations will be stored in directory: {}", args.history_dir),
        "redis" => info!("Conversations will be stored in redis at {}", args.history_host),
        other => info!("Conversations will be stored in: {}", other),
    }
    create_conversation_store(args, system_prompt).await
}
