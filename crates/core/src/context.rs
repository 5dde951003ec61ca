//! Context items and the append-only context chain.
//!
//! Every step of a pipeline reads the chain and appends to it. Items are
//! never edited, removed, or reordered once appended; the only mutating
//! operation on [`ContextChain`] is [`ContextChain::append`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnqueueError;

/// Well-known context item types.
pub mod types {
    pub const MESSAGE: &str = "message";
    pub const GENERATED_TEXT: &str = "generated_text";
    pub const GENERATED_IMAGE: &str = "generated_image";
    pub const ERROR: &str = "error";
    pub const RESULT: &str = "result";
}

/// One entry in a [`ContextChain`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,

    /// The plugin that produced this item
    pub plugin_id: String,

    /// Item type chosen by the producer (e.g. "message", "generated_text", "error")
    #[serde(rename = "type")]
    pub item_type: String,

    /// The executor or trigger action that produced this item
    pub action: String,

    pub content: String,

    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Type-specific fields (raw message payload, model name, image URL, ...)
    #[serde(default, flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ContextItem {
    /// Serialized names of the fixed fields. `fields` must not reuse them.
    pub const RESERVED_KEYS: [&'static str; 7] =
        ["id", "pluginId", "type", "action", "content", "timestamp", "error"];

    pub fn new(
        plugin_id: impl Into<String>,
        item_type: impl Into<String>,
        action: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            plugin_id: plugin_id.into(),
            item_type: item_type.into(),
            action: action.into(),
            content: content.into(),
            timestamp: Utc::now(),
            error: None,
            fields: serde_json::Map::new(),
        }
    }

    /// An inbound user message from a trigger on `platform`.
    pub fn message(platform: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(platform, types::MESSAGE, "receive", content)
    }

    /// An error entry. The message is both the content and the `error` field.
    pub fn error(
        plugin_id: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let mut item = Self::new(plugin_id, types::ERROR, action, message.clone());
        item.error = Some(message);
        item
    }

    /// Attach a type-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn is_error(&self) -> bool {
        self.item_type == types::ERROR
    }

    /// Check that the item is well-formed enough to start an event.
    pub fn validate(&self) -> Result<(), EnqueueError> {
        if self.id.trim().is_empty() {
            return Err(EnqueueError::MalformedItem("id is empty".into()));
        }
        if self.plugin_id.trim().is_empty() {
            return Err(EnqueueError::MalformedItem("pluginId is empty".into()));
        }
        if self.item_type.trim().is_empty() {
            return Err(EnqueueError::MalformedItem("type is empty".into()));
        }
        Ok(())
    }
}

/// Append-only, ordered log of context items for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextChain {
    items: Vec<ContextItem>,
}

impl ContextChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a chain from the event's initial item.
    pub fn with_initial(item: ContextItem) -> Self {
        Self { items: vec![item] }
    }

    /// Append an item and return a reference to it as stored.
    pub fn append(&mut self, item: ContextItem) -> &ContextItem {
        self.items.push(item);
        &self.items[self.items.len() - 1]
    }

    pub fn items(&self) -> &[ContextItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContextItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&ContextItem> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&ContextItem> {
        self.items.last()
    }

    /// The most recent item that is not an error.
    pub fn last_non_error(&self) -> Option<&ContextItem> {
        self.items.iter().rev().find(|i| !i.is_error())
    }

    /// Whether `self` is a prefix of `other` (same items, same order).
    pub fn is_prefix_of(&self, other: &ContextChain) -> bool {
        other.items.len() >= self.items.len() && other.items[..self.items.len()] == self.items[..]
    }

    /// Render the chain as plain text for model prompts.
    pub fn render(&self) -> String {
        self.items
            .iter()
            .map(|i| format!("[{}/{}] {}", i.plugin_id, i.item_type, i.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<'a> IntoIterator for &'a ContextChain {
    type Item = &'a ContextItem;
    type IntoIter = std::slice::Iter<'a, ContextItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
