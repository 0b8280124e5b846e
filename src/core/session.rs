//! Session orchestration: the state machine around one active conversation.
//!
//! A [`ChatSession`] owns the store and drives the send → stream → commit
//! sequence. Streaming runs on a spawned task that reports back over the
//! channel returned from [`ChatSession::new`]; the frontend drains it and
//! feeds each event into [`ChatSession::handle_stream_event`], which is
//! where the state machine advances. Partial assistant text lives only in
//! the live buffer; a message is committed to the store only when a stream
//! ends without error.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::api::ChatMessage;
use crate::core::chat_stream::{ChatStreamService, StreamMessage};
use crate::core::client::OpenRouterClient;
use crate::core::error::OpenRouterError;
use crate::store::{
    CharacterId, ChatStore, Conversation, ConversationId, MessageRole, StoreError, StoredMessage,
    DEFAULT_CONVERSATION_TITLE,
};

/// Title cutoffs: the first sentence wins when its period sits within
/// `TITLE_SENTENCE_WINDOW` characters; otherwise short inputs pass through
/// whole and long ones are truncated with an ellipsis marker.
const TITLE_SENTENCE_WINDOW: usize = 60;
const TITLE_MAX_PLAIN: usize = 50;
const TITLE_TRUNCATE_AT: usize = 47;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No conversation loaded.
    Idle,
    /// Conversation loaded, not generating.
    Active,
    /// A completion stream is in flight.
    Generating,
}

#[derive(Debug)]
pub enum SessionError {
    /// No conversation is loaded, or the referenced one does not exist.
    NoConversation,
    /// A completion is already in flight for this session.
    Busy,
    /// The message text was blank after trimming.
    EmptyMessage,
    /// Regenerate requires the last message to be an assistant turn.
    NotRegenerable,
    /// The character to start a conversation with does not exist.
    UnknownCharacter(CharacterId),
    Api(OpenRouterError),
    Store(StoreError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoConversation => write!(f, "no active conversation"),
            SessionError::Busy => write!(f, "a response is already being generated"),
            SessionError::EmptyMessage => write!(f, "message is empty"),
            SessionError::NotRegenerable => {
                write!(f, "the last message is not an assistant response")
            }
            SessionError::UnknownCharacter(id) => write!(f, "no such character: {id}"),
            SessionError::Api(err) => write!(f, "{err}"),
            SessionError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Api(err) => Some(err),
            SessionError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<OpenRouterError> for SessionError {
    fn from(err: OpenRouterError) -> Self {
        SessionError::Api(err)
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err)
    }
}

/// Derive a conversation title from the first user message.
pub fn generate_title(content: &str) -> String {
    let trimmed = content.trim();
    if let Some(period_pos) = trimmed.find('.') {
        if trimmed[..period_pos].chars().count() < TITLE_SENTENCE_WINDOW {
            return trimmed[..=period_pos].to_string();
        }
    }
    if trimmed.chars().count() <= TITLE_MAX_PLAIN {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(TITLE_TRUNCATE_AT).collect();
    format!("{truncated}...")
}

pub struct ChatSession<S: ChatStore> {
    store: S,
    client: Arc<OpenRouterClient>,
    streams: ChatStreamService,
    current: Option<ConversationId>,
    state: SessionState,
    streaming_content: String,
    last_error: Option<String>,
    stream_id: u64,
}

impl<S: ChatStore> ChatSession<S> {
    /// Create a session and the receiver its stream events arrive on. The
    /// caller drains the receiver and passes every event back through
    /// [`handle_stream_event`](Self::handle_stream_event).
    pub fn new(
        store: S,
        client: Arc<OpenRouterClient>,
    ) -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (streams, rx) = ChatStreamService::new();
        (
            Self {
                store,
                client,
                streams,
                current: None,
                state: SessionState::Idle,
                streaming_content: String::new(),
                last_error: None,
                stream_id: 0,
            },
            rx,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_generating(&self) -> bool {
        self.state == SessionState::Generating
    }

    /// Text accumulated so far by the in-flight (or failed) stream.
    pub fn streaming_content(&self) -> &str {
        &self.streaming_content
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        self.current.and_then(|id| self.store.conversation(id))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Start a fresh conversation with `character`, seeding it with the
    /// character's system prompt at order index 0 and snapshotting its model.
    pub fn start_conversation(
        &mut self,
        character_id: CharacterId,
    ) -> Result<ConversationId, SessionError> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }
        let character = self
            .store
            .character(character_id)
            .ok_or(SessionError::UnknownCharacter(character_id))?;

        let conversation = Conversation::new(
            character.id,
            DEFAULT_CONVERSATION_TITLE,
            character.model_id.clone(),
        );
        let conversation_id = conversation.id;
        self.store.insert_conversation(conversation)?;
        self.store.insert_message(StoredMessage::new(
            conversation_id,
            MessageRole::System,
            character.system_prompt,
            0,
        ))?;

        self.attach(conversation_id);
        Ok(conversation_id)
    }

    /// Load an existing conversation as the current one.
    pub fn open_conversation(&mut self, id: ConversationId) -> Result<(), SessionError> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }
        if self.store.conversation(id).is_none() {
            return Err(SessionError::NoConversation);
        }
        self.attach(id);
        Ok(())
    }

    fn attach(&mut self, id: ConversationId) {
        self.current = Some(id);
        self.state = SessionState::Active;
        self.streaming_content.clear();
        self.last_error = None;
    }

    /// Append a user message and kick off a streaming completion.
    pub fn send_message(&mut self, text: &str) -> Result<(), SessionError> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }
        let conversation_id = self.current.ok_or(SessionError::NoConversation)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut conversation = self
            .store
            .conversation(conversation_id)
            .ok_or(SessionError::NoConversation)?;
        if conversation.title == DEFAULT_CONVERSATION_TITLE {
            conversation.title = generate_title(trimmed);
        }
        conversation.updated_at = Utc::now();
        self.store.update_conversation(conversation)?;

        let index = self.store.next_order_index(conversation_id);
        self.store.insert_message(StoredMessage::new(
            conversation_id,
            MessageRole::User,
            trimmed,
            index,
        ))?;

        self.begin_completion()
    }

    /// Delete the trailing assistant message and recompute it.
    pub fn regenerate(&mut self) -> Result<(), SessionError> {
        if self.is_generating() {
            return Err(SessionError::Busy);
        }
        let conversation_id = self.current.ok_or(SessionError::NoConversation)?;

        let last = self
            .store
            .messages_for(conversation_id)
            .into_iter()
            .last()
            .filter(|m| m.role == MessageRole::Assistant)
            .ok_or(SessionError::NotRegenerable)?;
        self.store.delete_message(last.id)?;

        if let Some(mut conversation) = self.store.conversation(conversation_id) {
            conversation.updated_at = Utc::now();
            self.store.update_conversation(conversation)?;
        }

        self.begin_completion()
    }

    /// Delete a conversation, detaching it first if it is current.
    pub fn delete_conversation(&mut self, id: ConversationId) -> Result<(), SessionError> {
        if self.current == Some(id) {
            self.current = None;
            self.state = SessionState::Idle;
            self.streaming_content.clear();
            self.last_error = None;
        }
        self.store.delete_conversation(id)?;
        Ok(())
    }

    /// The rendered transcript: ordered messages with the system prompt
    /// excluded.
    pub fn display_messages(&self) -> Vec<StoredMessage> {
        let Some(conversation_id) = self.current else {
            return Vec::new();
        };
        self.store
            .messages_for(conversation_id)
            .into_iter()
            .filter(|m| m.role != MessageRole::System)
            .collect()
    }

    fn begin_completion(&mut self) -> Result<(), SessionError> {
        let conversation_id = self.current.ok_or(SessionError::NoConversation)?;
        let conversation = self
            .store
            .conversation(conversation_id)
            .ok_or(SessionError::NoConversation)?;

        let api_messages: Vec<ChatMessage> = self
            .store
            .messages_for(conversation_id)
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content,
            })
            .collect();

        self.stream_id += 1;
        let params = self
            .client
            .stream_params(&conversation.model_id, api_messages, self.stream_id)?;

        self.streaming_content.clear();
        self.last_error = None;
        self.state = SessionState::Generating;
        self.streams.spawn_stream(params);
        Ok(())
    }

    /// Advance the state machine with one stream event. Events tagged with a
    /// superseded stream id are discarded.
    pub fn handle_stream_event(
        &mut self,
        event: (StreamMessage, u64),
    ) -> Result<(), SessionError> {
        let (message, stream_id) = event;
        if stream_id != self.stream_id {
            return Ok(());
        }

        match message {
            StreamMessage::Chunk(content) => {
                if self.is_generating() {
                    self.streaming_content.push_str(&content);
                }
                Ok(())
            }
            StreamMessage::Error(text) => {
                self.last_error = Some(text);
                Ok(())
            }
            StreamMessage::End => self.finish_completion(),
        }
    }

    fn finish_completion(&mut self) -> Result<(), SessionError> {
        if !self.is_generating() {
            return Ok(());
        }
        self.state = SessionState::Active;

        // On error the accumulated text stays visible in the live buffer but
        // is never written to the store.
        if self.last_error.is_some() {
            return Ok(());
        }

        let conversation_id = self.current.ok_or(SessionError::NoConversation)?;
        let index = self.store.next_order_index(conversation_id);
        self.store.insert_message(StoredMessage::new(
            conversation_id,
            MessageRole::Assistant,
            std::mem::take(&mut self.streaming_content),
            index,
        ))?;

        if let Some(mut conversation) = self.store.conversation(conversation_id) {
            conversation.updated_at = Utc::now();
            self.store.update_conversation(conversation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::MemoryCredentialStore;
    use crate::store::{Character, JsonStore};

    fn test_client() -> Arc<OpenRouterClient> {
        // Unreachable endpoint: spawned streams fail fast, and tests drive
        // the state machine with hand-fed events instead.
        Arc::new(OpenRouterClient::with_base_url(
            Arc::new(MemoryCredentialStore::with_secret("sk-or-test")),
            "http://127.0.0.1:9/api/v1",
        ))
    }

    fn session_with_character() -> (
        ChatSession<JsonStore>,
        CharacterId,
        mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ) {
        let mut store = JsonStore::in_memory();
        let character = Character::new("Socrates", "You are Socrates.", "test/model");
        let character_id = character.id;
        store.insert_character(character).unwrap();
        let (session, rx) = ChatSession::new(store, test_client());
        (session, character_id, rx)
    }

    #[test]
    fn starting_a_conversation_seeds_the_system_prompt() {
        let (mut session, character_id, _rx) = session_with_character();
        let conversation_id = session.start_conversation(character_id).unwrap();

        assert_eq!(session.state(), SessionState::Active);
        let conversation = session.current_conversation().unwrap();
        assert_eq!(conversation.id, conversation_id);
        assert_eq!(conversation.title, DEFAULT_CONVERSATION_TITLE);
        assert_eq!(conversation.model_id, "test/model");

        let messages = session.store().messages_for(conversation_id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].order_index, 0);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "You are Socrates.");

        // The system prompt never shows up in the rendered transcript.
        assert!(session.display_messages().is_empty());
    }

    #[test]
    fn starting_with_an_unknown_character_fails() {
        let (mut session, _, _rx) = session_with_character();
        let bogus = uuid::Uuid::new_v4();
        assert!(matches!(
            session.start_conversation(bogus),
            Err(SessionError::UnknownCharacter(id)) if id == bogus
        ));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn send_message_titles_the_conversation_and_streams() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session
            .send_message("Hello there. How are you today and feeling great?")
            .unwrap();

        assert_eq!(session.state(), SessionState::Generating);
        let conversation = session.current_conversation().unwrap();
        assert_eq!(conversation.title, "Hello there.");

        let messages = session.store().messages_for(conversation.id);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].order_index, 1);
    }

    #[tokio::test]
    async fn completed_stream_commits_one_assistant_message() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();

        session
            .handle_stream_event((StreamMessage::Chunk("Hi".to_string()), 1))
            .unwrap();
        session
            .handle_stream_event((StreamMessage::Chunk(" there".to_string()), 1))
            .unwrap();
        assert_eq!(session.streaming_content(), "Hi there");

        session.handle_stream_event((StreamMessage::End, 1)).unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.streaming_content(), "");
        let transcript = session.display_messages();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role, MessageRole::Assistant);
        assert_eq!(transcript[1].content, "Hi there");
        assert_eq!(transcript[1].order_index, 2);
    }

    #[tokio::test]
    async fn failed_stream_persists_nothing_and_keeps_the_buffer() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();

        session
            .handle_stream_event((StreamMessage::Chunk("partial".to_string()), 1))
            .unwrap();
        session
            .handle_stream_event((StreamMessage::Error("API error (500): boom".to_string()), 1))
            .unwrap();
        session.handle_stream_event((StreamMessage::End, 1)).unwrap();

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.last_error(), Some("API error (500): boom"));
        assert_eq!(session.streaming_content(), "partial");

        // Only the system prompt and the user turn made it to the store.
        let conversation = session.current_conversation().unwrap();
        assert_eq!(session.store().messages_for(conversation.id).len(), 2);
    }

    #[tokio::test]
    async fn events_from_a_superseded_stream_are_discarded() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();

        session
            .handle_stream_event((StreamMessage::Chunk("stale".to_string()), 7))
            .unwrap();
        session.handle_stream_event((StreamMessage::End, 7)).unwrap();

        assert_eq!(session.state(), SessionState::Generating);
        assert_eq!(session.streaming_content(), "");
    }

    #[tokio::test]
    async fn sending_while_generating_is_rejected() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();

        assert!(matches!(
            session.send_message("again"),
            Err(SessionError::Busy)
        ));
        assert!(matches!(session.regenerate(), Err(SessionError::Busy)));
        assert!(matches!(
            session.start_conversation(character_id),
            Err(SessionError::Busy)
        ));
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        assert!(matches!(
            session.send_message("   \n\t  "),
            Err(SessionError::EmptyMessage)
        ));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn regenerate_requires_a_trailing_assistant_message() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();

        // Last message is the system prompt.
        assert!(matches!(
            session.regenerate(),
            Err(SessionError::NotRegenerable)
        ));

        session.send_message("Hi.").unwrap();
        session.handle_stream_event((StreamMessage::Error("x".to_string()), 1)).unwrap();
        session.handle_stream_event((StreamMessage::End, 1)).unwrap();

        // Last message is the user turn.
        assert!(matches!(
            session.regenerate(),
            Err(SessionError::NotRegenerable)
        ));
    }

    #[tokio::test]
    async fn regenerate_replaces_the_last_assistant_message() {
        let (mut session, character_id, _rx) = session_with_character();
        session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();
        session
            .handle_stream_event((StreamMessage::Chunk("first answer".to_string()), 1))
            .unwrap();
        session.handle_stream_event((StreamMessage::End, 1)).unwrap();

        session.regenerate().unwrap();
        assert_eq!(session.state(), SessionState::Generating);

        let conversation = session.current_conversation().unwrap();
        let messages = session.store().messages_for(conversation.id);
        assert_eq!(messages.last().unwrap().role, MessageRole::User);

        session
            .handle_stream_event((StreamMessage::Chunk("second answer".to_string()), 2))
            .unwrap();
        session.handle_stream_event((StreamMessage::End, 2)).unwrap();

        let transcript = session.display_messages();
        assert_eq!(transcript.last().unwrap().content, "second answer");
        assert_eq!(transcript.last().unwrap().order_index, 2);
    }

    #[tokio::test]
    async fn reopening_a_conversation_continues_its_thread() {
        let (mut session, character_id, _rx) = session_with_character();
        let first = session.start_conversation(character_id).unwrap();
        session.send_message("Hi.").unwrap();
        session
            .handle_stream_event((StreamMessage::Chunk("Hello".to_string()), 1))
            .unwrap();
        session.handle_stream_event((StreamMessage::End, 1)).unwrap();

        // Switch away and come back, as resuming does.
        session.start_conversation(character_id).unwrap();
        session.open_conversation(first).unwrap();

        assert_eq!(session.state(), SessionState::Active);
        let transcript = session.display_messages();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].content, "Hello");

        session.send_message("And again.").unwrap();
        let messages = session.store().messages_for(first);
        assert_eq!(messages.last().unwrap().order_index, 3);
    }

    #[tokio::test]
    async fn opening_a_missing_conversation_fails() {
        let (mut session, _, _rx) = session_with_character();
        assert!(matches!(
            session.open_conversation(uuid::Uuid::new_v4()),
            Err(SessionError::NoConversation)
        ));
    }

    #[tokio::test]
    async fn deleting_the_current_conversation_goes_idle() {
        let (mut session, character_id, _rx) = session_with_character();
        let conversation_id = session.start_conversation(character_id).unwrap();
        session.delete_conversation(conversation_id).unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.current_conversation().is_none());
        assert!(session.store().conversation(conversation_id).is_none());
    }

    #[test]
    fn title_keeps_the_first_sentence_when_short() {
        assert_eq!(
            generate_title("Hello there. How are you today and feeling great?"),
            "Hello there."
        );
    }

    #[test]
    fn title_passes_short_input_through() {
        let input = "a".repeat(50);
        assert_eq!(generate_title(&input), input);
    }

    #[test]
    fn title_truncates_long_input_with_ellipsis() {
        let input = "b".repeat(80);
        let title = generate_title(&input);
        assert_eq!(title, format!("{}...", "b".repeat(47)));
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn title_ignores_periods_outside_the_window() {
        let input = format!("{}. tail", "c".repeat(70));
        let title = generate_title(&input);
        assert_eq!(title, format!("{}...", "c".repeat(47)));
    }
}
