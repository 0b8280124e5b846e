//! File-backed chat store.
//!
//! Records live in owned collections in memory and are rewritten to a single
//! JSON file after every mutation, via a temp file in the same directory so a
//! crashed write never truncates existing history. An unbound store (no
//! path) keeps everything in memory, which is what the tests use.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{
    Character, CharacterId, ChatStore, Conversation, ConversationId, MessageId, StoreError,
    StoredMessage,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    characters: Vec<Character>,
    conversations: Vec<Conversation>,
    messages: Vec<StoredMessage>,
}

pub struct JsonStore {
    data: StoreData,
    path: Option<PathBuf>,
}

impl JsonStore {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            data: StoreData::default(),
            path: None,
        }
    }

    /// Open (or create) a store bound to `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| StoreError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            StoreData::default()
        };

        Ok(Self {
            data,
            path: Some(path),
        })
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        self.write_to(path)
    }

    fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let write_err = |source: std::io::Error| StoreError::Write {
            path: path.to_path_buf(),
            source,
        };

        let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());
        if let Some(dir) = parent {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let contents = serde_json::to_string_pretty(&self.data).map_err(|source| {
            StoreError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let mut temp_file = match parent {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(write_err)?;

        temp_file.write_all(contents.as_bytes()).map_err(write_err)?;
        temp_file.as_file_mut().sync_all().map_err(write_err)?;
        temp_file.persist(path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

impl ChatStore for JsonStore {
    fn insert_character(&mut self, character: Character) -> Result<(), StoreError> {
        self.data.characters.push(character);
        self.persist()
    }

    fn character(&self, id: CharacterId) -> Option<Character> {
        self.data.characters.iter().find(|c| c.id == id).cloned()
    }

    fn character_by_name(&self, name: &str) -> Option<Character> {
        self.data
            .characters
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    fn characters(&self) -> Vec<Character> {
        let mut characters = self.data.characters.clone();
        characters.sort_by_key(|c| c.created_at);
        characters
    }

    fn character_count(&self) -> usize {
        self.data.characters.len()
    }

    fn update_character(&mut self, character: Character) -> Result<(), StoreError> {
        let slot = self
            .data
            .characters
            .iter_mut()
            .find(|c| c.id == character.id)
            .ok_or(StoreError::MissingRecord("character", character.id))?;
        *slot = Character {
            updated_at: Utc::now(),
            ..character
        };
        self.persist()
    }

    fn delete_character(&mut self, id: CharacterId) -> Result<(), StoreError> {
        self.data.characters.retain(|c| c.id != id);
        let doomed: Vec<ConversationId> = self
            .data
            .conversations
            .iter()
            .filter(|c| c.character_id == id)
            .map(|c| c.id)
            .collect();
        self.data.conversations.retain(|c| c.character_id != id);
        self.data
            .messages
            .retain(|m| !doomed.contains(&m.conversation_id));
        self.persist()
    }

    fn insert_conversation(&mut self, conversation: Conversation) -> Result<(), StoreError> {
        self.data.conversations.push(conversation);
        self.persist()
    }

    fn conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.data.conversations.iter().find(|c| c.id == id).cloned()
    }

    fn conversations_for(&self, character_id: CharacterId) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .data
            .conversations
            .iter()
            .filter(|c| c.character_id == character_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations
    }

    fn update_conversation(&mut self, conversation: Conversation) -> Result<(), StoreError> {
        let slot = self
            .data
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
            .ok_or(StoreError::MissingRecord("conversation", conversation.id))?;
        *slot = conversation;
        self.persist()
    }

    fn delete_conversation(&mut self, id: ConversationId) -> Result<(), StoreError> {
        self.data.conversations.retain(|c| c.id != id);
        self.data.messages.retain(|m| m.conversation_id != id);
        self.persist()
    }

    fn insert_message(&mut self, message: StoredMessage) -> Result<(), StoreError> {
        self.data.messages.push(message);
        self.persist()
    }

    fn messages_for(&self, conversation_id: ConversationId) -> Vec<StoredMessage> {
        let mut messages: Vec<StoredMessage> = self
            .data
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.order_index);
        messages
    }

    fn delete_message(&mut self, id: MessageId) -> Result<(), StoreError> {
        self.data.messages.retain(|m| m.id != id);
        self.persist()
    }

    fn next_order_index(&self, conversation_id: ConversationId) -> u32 {
        self.data
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .map(|m| m.order_index)
            .max()
            .map(|last| last + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MessageRole;

    fn store_with_character() -> (JsonStore, Character) {
        let mut store = JsonStore::in_memory();
        let character = Character::new("Sherlock Holmes", "You are Sherlock.", "test/model");
        store.insert_character(character.clone()).unwrap();
        (store, character)
    }

    #[test]
    fn deleting_a_character_cascades_to_conversations_and_messages() {
        let (mut store, character) = store_with_character();
        let conversation = Conversation::new(character.id, "New Chat", "test/model");
        store.insert_conversation(conversation.clone()).unwrap();
        store
            .insert_message(StoredMessage::new(
                conversation.id,
                MessageRole::System,
                "prompt",
                0,
            ))
            .unwrap();

        store.delete_character(character.id).unwrap();

        assert_eq!(store.character_count(), 0);
        assert!(store.conversation(conversation.id).is_none());
        assert!(store.messages_for(conversation.id).is_empty());
    }

    #[test]
    fn deleting_a_conversation_cascades_to_messages_only() {
        let (mut store, character) = store_with_character();
        let conversation = Conversation::new(character.id, "New Chat", "test/model");
        store.insert_conversation(conversation.clone()).unwrap();
        store
            .insert_message(StoredMessage::new(
                conversation.id,
                MessageRole::System,
                "prompt",
                0,
            ))
            .unwrap();

        store.delete_conversation(conversation.id).unwrap();

        assert_eq!(store.character_count(), 1);
        assert!(store.messages_for(conversation.id).is_empty());
    }

    #[test]
    fn messages_come_back_in_order_index_order() {
        let (mut store, character) = store_with_character();
        let conversation = Conversation::new(character.id, "New Chat", "test/model");
        store.insert_conversation(conversation.clone()).unwrap();

        // Insert out of order; the store must sort on read.
        for (index, content) in [(2u32, "second"), (0, "prompt"), (1, "first")] {
            let role = if index == 0 {
                MessageRole::System
            } else {
                MessageRole::User
            };
            store
                .insert_message(StoredMessage::new(conversation.id, role, content, index))
                .unwrap();
        }

        let messages = store.messages_for(conversation.id);
        let indices: Vec<u32> = messages.iter().map(|m| m.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(store.next_order_index(conversation.id), 3);
    }

    #[test]
    fn next_order_index_starts_at_zero() {
        let (store, _) = store_with_character();
        assert_eq!(store.next_order_index(uuid::Uuid::new_v4()), 0);
    }

    #[test]
    fn updating_a_missing_conversation_is_an_error() {
        let (mut store, character) = store_with_character();
        let conversation = Conversation::new(character.id, "New Chat", "test/model");
        assert!(matches!(
            store.update_conversation(conversation),
            Err(StoreError::MissingRecord("conversation", _))
        ));
    }

    #[test]
    fn store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chats.json");

        let character = Character::new("Ada Lovelace", "You are Ada.", "test/model");
        let conversation = Conversation::new(character.id, "New Chat", "test/model");
        {
            let mut store = JsonStore::open(&path).unwrap();
            store.insert_character(character.clone()).unwrap();
            store.insert_conversation(conversation.clone()).unwrap();
            store
                .insert_message(StoredMessage::new(
                    conversation.id,
                    MessageRole::System,
                    "You are Ada.",
                    0,
                ))
                .unwrap();
        }

        let store = JsonStore::open(&path).unwrap();
        assert_eq!(store.character_count(), 1);
        let loaded = store.conversation(conversation.id).unwrap();
        assert_eq!(loaded.title, "New Chat");
        assert_eq!(loaded.model_id, "test/model");
        assert_eq!(store.messages_for(conversation.id).len(), 1);
    }

    #[test]
    fn conversations_come_back_most_recently_updated_first() {
        let (mut store, character) = store_with_character();
        let older = Conversation::new(character.id, "Older", "test/model");
        let newer = Conversation::new(character.id, "Newer", "test/model");
        store.insert_conversation(older.clone()).unwrap();
        store.insert_conversation(newer.clone()).unwrap();

        let mut touched = newer.clone();
        touched.updated_at = newer.updated_at + chrono::Duration::seconds(60);
        store.update_conversation(touched).unwrap();

        let titles: Vec<String> = store
            .conversations_for(character.id)
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["Newer", "Older"]);
    }

    #[test]
    fn character_lookup_by_name_ignores_case() {
        let (store, character) = store_with_character();
        assert_eq!(
            store.character_by_name("sherlock holmes").unwrap().id,
            character.id
        );
        assert!(store.character_by_name("moriarty").is_none());
    }
}
