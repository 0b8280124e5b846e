//! Local chat store: characters, conversations, and ordered messages.
//!
//! Characters own conversations, conversations own messages; both ownership
//! edges cascade on delete. Back-references are explicit parent-id fields.
//! [`ChatStore`] is the repository interface; [`JsonStore`] is the file-backed
//! implementation.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod json;

pub use json::JsonStore;

pub type CharacterId = Uuid;
pub type ConversationId = Uuid;
pub type MessageId = Uuid;

/// Placeholder title given to a conversation until its first user message.
pub const DEFAULT_CONVERSATION_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A persona definition: name, system prompt, and preferred model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub system_prompt: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            system_prompt: system_prompt.into(),
            model_id: model_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An ordered message thread tied to one character. `model_id` is snapshotted
/// at creation; editing the character's preferred model later never alters
/// existing conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub character_id: CharacterId,
    pub title: String,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(character_id: CharacterId, title: impl Into<String>, model_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            character_id,
            title: title.into(),
            model_id: model_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One turn of a conversation. `order_index` is unique and increasing within
/// the owning conversation, starting at 0 with the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub order_index: u32,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(
        conversation_id: ConversationId,
        role: MessageRole,
        content: impl Into<String>,
        order_index: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            order_index,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// Failed to read the store file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store file is not valid JSON for the current schema.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to write the store file back to disk.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A referenced record does not exist.
    MissingRecord(&'static str, Uuid),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Read { path, source } => {
                write!(f, "Failed to read chat store at {}: {}", path.display(), source)
            }
            StoreError::Parse { path, source } => {
                write!(f, "Failed to parse chat store at {}: {}", path.display(), source)
            }
            StoreError::Write { path, source } => {
                write!(f, "Failed to write chat store at {}: {}", path.display(), source)
            }
            StoreError::MissingRecord(kind, id) => write!(f, "No such {kind}: {id}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Read { source, .. } | StoreError::Write { source, .. } => Some(source),
            StoreError::Parse { source, .. } => Some(source),
            StoreError::MissingRecord(..) => None,
        }
    }
}

/// Repository over the persisted chat records. Mutations are durable before
/// they return; implementations surface write failures rather than dropping
/// them.
pub trait ChatStore {
    fn insert_character(&mut self, character: Character) -> Result<(), StoreError>;
    fn character(&self, id: CharacterId) -> Option<Character>;
    fn character_by_name(&self, name: &str) -> Option<Character>;
    /// All characters, ordered by creation time.
    fn characters(&self) -> Vec<Character>;
    fn character_count(&self) -> usize;
    fn update_character(&mut self, character: Character) -> Result<(), StoreError>;
    /// Deletes the character and cascades to its conversations and their
    /// messages.
    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError>;

    fn insert_conversation(&mut self, conversation: Conversation) -> Result<(), StoreError>;
    fn conversation(&self, id: ConversationId) -> Option<Conversation>;
    /// Conversations belonging to a character, most recently updated first.
    fn conversations_for(&self, character_id: CharacterId) -> Vec<Conversation>;
    fn update_conversation(&mut self, conversation: Conversation) -> Result<(), StoreError>;
    /// Deletes the conversation and cascades to its messages.
    fn delete_conversation(&mut self, id: ConversationId) -> Result<(), StoreError>;

    fn insert_message(&mut self, message: StoredMessage) -> Result<(), StoreError>;
    /// Messages of a conversation in ascending order-index order.
    fn messages_for(&self, conversation_id: ConversationId) -> Vec<StoredMessage>;
    fn delete_message(&mut self, id: MessageId) -> Result<(), StoreError>;
    /// The order index the next appended message should carry.
    fn next_order_index(&self, conversation_id: ConversationId) -> u32;
}
