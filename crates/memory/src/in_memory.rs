//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use conduit_core::context::ContextItem;
use conduit_core::error::MemoryError;
use conduit_core::memory::{
    Conversation, ConversationOptions, MemoryProvider, MessageQuery, StoredContext, StoredMessage,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::store::ConversationStore;

/// Keeps conversations in process memory; everything is lost on exit.
pub struct InMemoryBackend {
    store: Arc<RwLock<ConversationStore>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(ConversationStore::default())),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryProvider for InMemoryBackend {
    fn name(&self) -> &str { "in_memory" }

    async fn create_conversation(&self, opts: ConversationOptions) -> Result<String, MemoryError> {
        Ok(self.store.write().await.create(opts))
    }

    async fn store_message(
        &self,
        message: ContextItem,
        conversation_id: &str,
    ) -> Result<(), MemoryError> {
        self.store.write().await.add_message(message, conversation_id);
        Ok(())
    }

    async fn store_context(
        &self,
        context: StoredContext,
        conversation_id: &str,
    ) -> Result<(), MemoryError> {
        self.store.write().await.add_context(context, conversation_id);
        Ok(())
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
        Ok(self.store.write().await.delete(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conduit_core::context::ContextChain;

    #[tokio::test]
    async fn create_store_and_read_back() {
        let mem = InMemoryBackend::new();
        let id = mem
            .create_conversation(ConversationOptions {
                platform: "cli".into(),
                title: Some("Rust questions".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        mem.store_message(ContextItem::message("cli", "Tell me about Rust"), &id)
            .await
            .unwrap();
        mem.store_message(ContextItem::message("cli", "And Python?"), &id)
            .await
            .unwrap();

        let conversation = mem.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conversation.title.as_deref(), Some("Rust questions"));

        let all = mem.get_messages(MessageQuery::conversation(&id)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].item.content, "Tell me about Rust");

        let rust_only = mem
            .get_messages(MessageQuery {
                text: Some("rust".into()),
                ..MessageQuery::conversation(&id)
            })
            .await
            .unwrap();
        assert_eq!(rust_only.len(), 1);
    }

    #[tokio::test]
    async fn contexts_are_scoped_to_conversation() {
        let mem = InMemoryBackend::new();
        let a = mem.create_conversation(ConversationOptions::default()).await.unwrap();
        let b = mem.create_conversation(ConversationOptions::default()).await.unwrap();

        let chain = ContextChain::with_initial(ContextItem::message("cli", "hello"));
        mem.store_context(
            StoredContext {
                conversation_id: String::new(),
                event_id: Some("ev-1".into()),
                chain,
                stored_at: Utc::now(),
            },
            &a,
        )
        .await
        .unwrap();

        let stored = mem.get_contexts(&a).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].conversation_id, a);
        assert!(mem.get_contexts(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_conversation() {
        let mem = InMemoryBackend::new();
        let id = mem.create_conversation(ConversationOptions::default()).await.unwrap();
        mem.store_message(ContextItem::message("cli", "bye"), &id).await.unwrap();

        assert!(mem.delete_conversation(&id).await.unwrap());
        assert!(mem.get_conversation(&id).await.unwrap().is_none());
        assert!(mem.get_messages(MessageQuery::conversation(&id)).await.unwrap().is_empty());
        assert!(!mem.delete_conversation("nonexistent").await.unwrap());
    }
}
