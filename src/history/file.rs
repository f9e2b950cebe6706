use async_trait::async_trait;
use log::{ info, warn };
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{ check_id, decode_record, encode_record, is_valid_id, ConversationStore, IdGenerator };
use crate::error::{ MentorError, Result };
use crate::models::chat::Conversation;

const RECORD_EXTENSION: &str = "json";

/// One `<id>.json` file per conversation. The directory listing is the index.
pub struct FileConversationStore {
    dir: PathBuf,
    system_prompt: String,
    ids: IdGenerator,
}

impl FileConversationStore {
    pub async fn new(dir: impl AsRef<Path>, system_prompt: &str) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;
        info!("File conversation store ready at {}", dir.display());
        Ok(Self {
            dir,
            system_prompt: system_prompt.to_string(),
            ids: IdGenerator::new(),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Writes `contents` to a hidden temporary file next to the target.
    async fn write_temp(&self, id: &str, contents: &str) -> Result<PathBuf> {
        let temp_path = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(contents.as_bytes()).await?;
            file.sync_all().await
        }.await;

        if let Err(e) = result {
            self.remove_temp(&temp_path).await;
            return Err(MentorError::from(e));
        }
        Ok(temp_path)
    }

    async fn remove_temp(&self, temp_path: &Path) {
        if let Err(e) = fs::remove_file(temp_path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove temporary file {}: {}", temp_path.display(), e);
            }
        }
    }

    /// Replaces the record for `id` by renaming a complete temporary file over it.
    async fn write_atomic(&self, id: &str, contents: &str) -> Result<()> {
        let temp_path = self.write_temp(id, contents).await?;
        if let Err(e) = fs::rename(&temp_path, self.record_path(id)).await {
            self.remove_temp(&temp_path).await;
            return Err(MentorError::from(e));
        }
        Ok(())
    }

    /// Publishes a complete record only if none exists for `id`. The hard link
    /// fails with `AlreadyExists` instead of replacing the target. Returns
    /// `false` when the id is taken.
    async fn write_new(&self, id: &str, contents: &str) -> Result<bool> {
        let temp_path = self.write_temp(id, contents).await?;
        let linked = fs::hard_link(&temp_path, self.record_path(id)).await;
        self.remove_temp(&temp_path).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(MentorError::from(e)),
        }
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn create(&self) -> Result<String> {
        loop {
            let id = self.ids.next_id();
            let conversation = Conversation::new(id.as_str(), &self.system_prompt);
            if !self.write_new(&id, &encode_record(&conversation)?).await? {
                warn!("Conversation id {} already taken, trying the next one", id);
                continue;
            }
            info!("Created conversation {}", id);
            return Ok(id);
        }
    }

    async fn load(&self, id: &str) -> Result<Conversation> {
        check_id(id)?;
        let bytes = match fs::read(self.record_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MentorError::NotFound(id.to_string()));
            }
            Err(e) => {
                return Err(e.into());
            }
        };
        decode_record(id, &bytes)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                if is_valid_id(id) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    async fn save(&self, id: &str, conversation: &Conversation) -> Result<()> {
        check_id(id)?;
        self.write_atomic(id, &encode_record(conversation)?).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        check_id(id)?;
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => {
                info!("Deleted conversation {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(MentorError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatMessage, Role, NEW_CHAT_TITLE };
    use tempfile::tempdir;

    async fn store(dir: &Path) -> FileConversationStore {
        FileConversationStore::new(dir, "You are a tutor.").await.unwrap()
    }

    #[tokio::test]
    async fn create_writes_system_prompt_and_sentinel_title() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;

        let id = store.create().await.unwrap();
        let raw = std::fs::read_to_string(temp_dir.path().join(format!("{}.json", id))).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["title"], NEW_CHAT_TITLE);
        assert_eq!(json["title_assigned"], false);
        assert_eq!(json["messages"][0]["role"], "system");

        let loaded = store.load(&id).await.unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.title, None);
        assert_eq!(loaded.messages, vec![ChatMessage::system("You are a tutor.")]);
    }

    #[tokio::test]
    async fn create_puts_new_id_first_in_list() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;

        let first = store.create().await.unwrap();
        let before = store.list().await.unwrap();
        let second = store.create().await.unwrap();
        let after = store.list().await.unwrap();

        assert!(!before.contains(&second));
        assert_eq!(after, vec![second, first]);
    }

    #[tokio::test]
    async fn save_twice_then_load_round_trips() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        let id = store.create().await.unwrap();

        let mut conversation = store.load(&id).await.unwrap();
        conversation.title = Some("Python Lists".into());
        conversation.messages.push(ChatMessage::user("What is a list?"));
        conversation.messages.push(ChatMessage::assistant("An ordered collection."));

        store.save(&id, &conversation).await.unwrap();
        store.save(&id, &conversation).await.unwrap();
        assert_eq!(store.load(&id).await.unwrap(), conversation);
    }

    #[tokio::test]
    async fn delete_then_load_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        let id = store.create().await.unwrap();

        store.delete(&id).await.unwrap();
        assert!(matches!(store.load(&id).await, Err(MentorError::NotFound(_))));
        assert!(matches!(store.delete(&id).await, Err(MentorError::NotFound(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_record_is_corrupt() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        std::fs::write(temp_dir.path().join("20240101_000000.json"), r#"{"title":"x"}"#).unwrap();
        std::fs::write(temp_dir.path().join("20240101_000001.json"), "not json").unwrap();

        assert!(matches!(store.load("20240101_000000").await, Err(MentorError::CorruptRecord { .. })));
        assert!(matches!(store.load("20240101_000001").await, Err(MentorError::CorruptRecord { .. })));
    }

    #[tokio::test]
    async fn reads_records_written_without_flag() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        std::fs::write(
            temp_dir.path().join("20240101_120000.json"),
            r#"{"title":"Decorators 101","messages":[{"role":"system","content":"s"},{"role":"user","content":"q"}]}"#
        ).unwrap();

        let conversation = store.load("20240101_120000").await.unwrap();
        assert_eq!(conversation.title.as_deref(), Some("Decorators 101"));
        assert_eq!(conversation.messages[1].role, Role::User);
    }

    #[tokio::test]
    async fn list_ignores_foreign_and_temporary_files() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        let id = store.create().await.unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(temp_dir.path().join(format!(".{}.abc.tmp", id)), "x").unwrap();

        assert_eq!(store.list().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn new_record_never_replaces_an_existing_one() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        let path = temp_dir.path().join("20240101_120000_000.json");
        std::fs::write(&path, "written by another process").unwrap();

        assert!(!store.write_new("20240101_120000_000", "{}").await.unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "written by another process");
        assert!(store.write_new("20240101_120000_001", "{}").await.unwrap());

        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn traversal_ids_are_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = store(temp_dir.path()).await;
        assert!(matches!(store.load("../secret").await, Err(MentorError::NotFound(_))));
        assert!(matches!(store.delete("../secret").await, Err(MentorError::NotFound(_))));
    }
}
