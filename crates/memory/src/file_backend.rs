//! File-based memory backend: persistent JSON-lines storage.
//!
//! A directory holds three JSONL files, one JSON object per line:
//!
//! - `conversations.jsonl`
//! - `messages.jsonl`
//! - `contexts.jsonl`
//!
//! Default location: `~/.conduit/memory/`

use async_trait::async_trait;
use conduit_core::context::ContextItem;
use conduit_core::error::MemoryError;
use conduit_core::memory::{
    Conversation, ConversationOptions, MemoryProvider, MessageQuery, StoredContext, StoredMessage,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::store::ConversationStore;

const CONVERSATIONS_FILE: &str = "conversations.jsonl";
const MESSAGES_FILE: &str = "messages.jsonl";
const CONTEXTS_FILE: &str = "contexts.jsonl";

/// Which files a mutation touched.
#[derive(Clone, Copy)]
struct Dirty {
    conversations: bool,
    messages: bool,
    contexts: bool,
}

/// A directory-backed memory store.
///
/// Everything is loaded on creation and the touched files are rewritten on
/// every mutation. Fast reads, durable writes.
pub struct FileBackend {
    dir: PathBuf,
    store: Arc<RwLock<ConversationStore>>,
}

impl FileBackend {
    /// Open (or lazily create) a store in `dir`.
    pub fn new(dir: PathBuf) -> Self {
        let store = ConversationStore {
            conversations: load_lines(&dir.join(CONVERSATIONS_FILE)),
            messages: load_lines(&dir.join(MESSAGES_FILE)),
            contexts: load_lines(&dir.join(CONTEXTS_FILE)),
        };
        debug!(
            dir = %dir.display(),
            conversations = store.conversations.len(),
            messages = store.messages.len(),
            "File memory backend loaded"
        );
        Self {
            dir,
            store: Arc::new(RwLock::new(store)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn flush(&self, dirty: Dirty) -> Result<(), MemoryError> {
        let store = self.store.read().await;

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MemoryError::Storage(format!("Failed to create memory directory: {e}"))
        })?;

        if dirty.conversations {
            write_lines(&self.dir.join(CONVERSATIONS_FILE), &store.conversations)?;
        }
        if dirty.messages {
            write_lines(&self.dir.join(MESSAGES_FILE), &store.messages)?;
        }
        if dirty.contexts {
            write_lines(&self.dir.join(CONTEXTS_FILE), &store.contexts)?;
        }
        Ok(())
    }
}

fn load_lines<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(), // Not written yet
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted memory line");
                None
            }
        })
        .collect()
}

fn write_lines<T: Serialize>(path: &Path, entries: &[T]) -> Result<(), MemoryError> {
    let mut content = String::new();
    for entry in entries {
        let line = serde_json::to_string(entry)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory line: {e}")))?;
        content.push_str(&line);
        content.push('\n');
    }
    std::fs::write(path, &content)
        .map_err(|e| MemoryError::Storage(format!("Failed to write {}: {e}", path.display())))
}

#[async_trait]
impl MemoryProvider for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn create_conversation(&self, opts: ConversationOptions) -> Result<String, MemoryError> {
        let id = self.store.write().await.create(opts);
        self.flush(Dirty {
            conversations: true,
            messages: false,
            contexts: false,
        })
        .await?;
        Ok(id)
    }

    async fn store_message(
        &self,
        message: ContextItem,
        conversation_id: &str,
    ) -> Result<(), MemoryError> {
        self.store.write().await.add_message(message, conversation_id);
        self.flush(Dirty {
            conversations: true,
            messages: true,
            contexts: false,
        })
        .await
    }

    async fn store_context(
        &self,
        context: StoredContext,
        conversation_id: &str,
    ) -> Result<(), MemoryError> {
        self.store.write().await.add_context(context, conversation_id);
        self.flush(Dirty {
            conversations: true,
            messages: false,
            contexts: true,
        })
        .await
    }

    async fn get_messages(&self, query: MessageQuery) -> Result<Vec<StoredMessage>, MemoryError> {
        Ok(self.store.read().await.messages(&query))
    }

    async fn get_contexts(&self, conversation_id: &str) -> Result<Vec<StoredContext>, MemoryError> {
        Ok(self.store.read().await.contexts(conversation_id))
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, MemoryError> {
        Ok(self.store.read().await.conversation(id))
    }

    async fn delete_conversation(&self, id: &str) -> Result<bool, MemoryError> {
        let deleted = self.store.write().await.delete(id);
        if deleted {
            self.flush(Dirty {
                conversations: true,
                messages: true,
                contexts: true,
            })
            .await?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conduit_core::context::ContextChain;
    use std::io::Write;

    #[tokio::test]
    async fn store_and_reload_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("memory");

        let mem = FileBackend::new(dir.clone());
        let id = mem
            .create_conversation(ConversationOptions {
                platform: "cli".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        mem.store_message(ContextItem::message("cli", "Rust is great"), &id)
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.join(MESSAGES_FILE)).unwrap();
        assert!(content.contains("Rust is great"));

        let reloaded = FileBackend::new(dir);
        assert!(reloaded.get_conversation(&id).await.unwrap().is_some());
        let messages = reloaded.get_messages(MessageQuery::conversation(&id)).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].item.content, "Rust is great");
    }

    #[tokio::test]
    async fn contexts_survive_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let mem = FileBackend::new(tmp.path().to_path_buf());

        let mut chain = ContextChain::with_initial(ContextItem::message("http", "hello"));
        chain.append(ContextItem::new("text", "generated_text", "generate_text", "hi there"));
        mem.store_context(
            StoredContext {
                conversation_id: String::new(),
                event_id: Some("ev-1".into()),
                chain,
                stored_at: Utc::now(),
            },
            "conv-1",
        )
        .await
        .unwrap();

        let reloaded = FileBackend::new(tmp.path().to_path_buf());
        let contexts = reloaded.get_contexts("conv-1").await.unwrap();
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].chain.last().unwrap().content, "hi there");
        assert!(reloaded.get_conversation("conv-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let mem = FileBackend::new(tmp.path().to_path_buf());
        let id = mem.create_conversation(ConversationOptions::default()).await.unwrap();
        mem.store_message(ContextItem::message("cli", "To be deleted"), &id)
            .await
            .unwrap();
        assert!(mem.delete_conversation(&id).await.unwrap());

        let reloaded = FileBackend::new(tmp.path().to_path_buf());
        assert!(reloaded.get_conversation(&id).await.unwrap().is_none());
        assert!(reloaded.get_messages(MessageQuery::conversation(&id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handles_missing_directory_gracefully() {
        let tmp = tempfile::tempdir().unwrap();
        let mem = FileBackend::new(tmp.path().join("not-yet-created"));
        assert!(mem.get_conversation("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handles_corrupted_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(tmp.path().join(CONVERSATIONS_FILE)).unwrap();
        writeln!(file, r#"{{"id":"1","platform":"cli","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(file, "this is not json").unwrap();
        writeln!(file, r#"{{"id":"2","platform":"http","created_at":"2026-01-01T00:00:00Z","updated_at":"2026-01-01T00:00:00Z"}}"#).unwrap();
        drop(file);

        let mem = FileBackend::new(tmp.path().to_path_buf());
        assert!(mem.get_conversation("1").await.unwrap().is_some());
        assert!(mem.get_conversation("2").await.unwrap().is_some());
    }
}
