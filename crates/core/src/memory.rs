//! Memory provider trait: conversation storage reached by the runtime.
//!
//! The runtime stores each event's inbound message and its finished context
//! chain under a conversation. How a backend lays this out on disk (or in a
//! database) is its own business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{ContextChain, ContextItem};
use crate::error::MemoryError;

/// Options for creating a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationOptions {
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A message stored under a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub conversation_id: String,
    pub item: ContextItem,
}

/// A finished context chain stored under a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContext {
    pub conversation_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    pub chain: ContextChain,
    pub stored_at: DateTime<Utc>,
}

/// A query over stored messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Case-insensitive substring match on content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl MessageQuery {
    pub fn conversation(id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(id.into()),
            text: None,
            limit: default_limit(),
        }
    }

    pub fn matches(&self, message: &StoredMessage) -> bool {
        let conversation_ok = self
            .conversation_id
            .as_ref()
            .is_none_or(|id| *id == message.conversation_id);
        let text_ok = self.text.as_ref().is_none_or(|t| {
            message
                .item
                .content
                .to_lowercase()
                .contains(&t.to_lowercase())
        });
        conversation_ok && text_ok
    }
}

/// Implementations: in-memory (tests, ephemeral sessions) and JSON-lines files.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn create_conversation(&self, opts: ConversationOptions) -> Result<String, MemoryError>;

    async fn store_message(
        &self,
        message: ContextItem,
        conversation_id: &str,
    ) -> Result<(), MemoryError>;

    async fn store_context(
        &self,
        context: StoredContext,
        conversation_id: &str,
    ) -> Result<(), MemoryError>;

    /// Matching messages, oldest first, at most `query.limit`.
    async fn get_messages(&self, query: MessageQuery) -> Result<Vec<StoredMessage>, MemoryError>;

    async fn get_contexts(&self, conversation_id: &str) -> Result<Vec<StoredContext>, MemoryError>;

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, MemoryError>;

    /// Returns whether anything was deleted.
    async fn delete_conversation(&self, id: &str) -> Result<bool, MemoryError>;
}
