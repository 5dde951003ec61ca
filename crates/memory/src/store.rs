//! Conversation bookkeeping shared by every backend.
//!
//! Backends own a [`ConversationStore`] behind a lock; this module holds
//! the plain data and the query logic, with no I/O.

use chrono::Utc;
use conduit_core::context::ContextItem;
use conduit_core::memory::{
    Conversation, ConversationOptions, MessageQuery, StoredContext, StoredMessage,
};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<StoredMessage>,
    pub contexts: Vec<StoredContext>,
}

impl ConversationStore {
    pub fn create(&mut self, opts: ConversationOptions) -> String {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        self.conversations.push(Conversation {
            id: id.clone(),
            platform: opts.platform,
            title: opts.title,
            created_at: now,
            updated_at: now,
            metadata: opts.metadata,
        });
        id
    }

    /// Bump `updated_at`, creating the conversation if a trigger named one
    /// this store has never seen.
    fn touch(&mut self, conversation_id: &str, platform: &str) {
        let now = Utc::now();
        match self.conversations.iter_mut().find(|c| c.id == conversation_id) {
            Some(c) => c.updated_at = now,
            None => self.conversations.push(Conversation {
                id: conversation_id.to_string(),
                platform: platform.to_string(),
                title: None,
                created_at: now,
                updated_at: now,
                metadata: Default::default(),
            }),
        }
    }

    pub fn add_message(&mut self, item: ContextItem, conversation_id: &str) -> StoredMessage {
        self.touch(conversation_id, &item.plugin_id);
        let message = StoredMessage {
            conversation_id: conversation_id.to_string(),
            item,
        };
        self.messages.push(message.clone());
        message
    }

    pub fn add_context(&mut self, mut context: StoredContext, conversation_id: &str) -> StoredContext {
        let platform = context
            .chain
            .first()
            .map(|i| i.plugin_id.clone())
            .unwrap_or_default();
        self.touch(conversation_id, &platform);
        context.conversation_id = conversation_id.to_string();
        self.contexts.push(context.clone());
        context
    }

    /// Matching messages, oldest first, keeping the newest `limit`.
    pub fn messages(&self, query: &MessageQuery) -> Vec<StoredMessage> {
        let matching: Vec<&StoredMessage> =
            self.messages.iter().filter(|m| query.matches(m)).collect();
        let skip = matching.len().saturating_sub(query.limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn contexts(&self, conversation_id: &str) -> Vec<StoredContext> {
        self.contexts
            .iter()
            .filter(|c| c.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations.iter().find(|c| c.id == id).cloned()
    }

    /// Remove a conversation with its messages and contexts.
    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.conversations.len() + self.messages.len() + self.contexts.len();
        self.conversations.retain(|c| c.id != id);
        self.messages.retain(|m| m.conversation_id != id);
        self.contexts.retain(|c| c.conversation_id != id);
        before != self.conversations.len() + self.messages.len() + self.contexts.len()
    }
}
