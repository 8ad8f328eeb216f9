use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Session state shared between the exchange controller and the UI
pub type SharedSession = Arc<Mutex<Session>>;

/// Errors raised by store operations that reference a conversation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("conversation {0} does not exist")]
    UnknownConversation(ConversationId),
}

/// Stable identifier of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "AI",
        }
    }
}

/// A single authored turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// An ordered, independently titled thread of messages
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(skip)]
    title_is_placeholder: bool,
}

impl Conversation {
    fn seeded(defaults: &ConversationDefaults) -> Self {
        Self {
            id: ConversationId::new(),
            title: defaults.placeholder_title.clone(),
            messages: vec![Message::assistant(defaults.greeting.clone())],
            title_is_placeholder: true,
        }
    }

    /// Whether the title is still the placeholder assigned at creation
    pub fn is_placeholder_title(&self) -> bool {
        self.title_is_placeholder
    }
}

/// Values every new conversation starts with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationDefaults {
    pub placeholder_title: String,
    pub greeting: String,
}

impl Default for ConversationDefaults {
    fn default() -> Self {
        Self {
            placeholder_title: "New chat".to_string(),
            greeting: "Hello! Feel free to ask me anything you need help with.".to_string(),
        }
    }
}

/// Holds the conversations of a session and which one is active.
///
/// The store is seeded with one conversation at construction. Conversations are
/// never removed, so the seed acts as the fallback whenever the active id cannot
/// be resolved. Operations that name an unknown conversation return
/// [`SessionError::UnknownConversation`] and leave the store untouched.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    defaults: ConversationDefaults,
    conversations: Vec<Conversation>,
    active_id: ConversationId,
}

impl ConversationStore {
    pub fn new(defaults: ConversationDefaults) -> Self {
        let seed = Conversation::seeded(&defaults);
        let active_id = seed.id;
        Self {
            defaults,
            conversations: vec![seed],
            active_id,
        }
    }

    /// Create a new conversation, append it and make it active
    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::seeded(&self.defaults);
        let id = conversation.id;
        self.conversations.push(conversation);
        self.active_id = id;
        tracing::debug!(conversation = %id, total = self.len(), "Created conversation");
        id
    }

    /// Make `id` the active conversation
    pub fn select_conversation(&mut self, id: ConversationId) -> Result<(), SessionError> {
        if self.position(id).is_none() {
            tracing::warn!(conversation = %id, "Ignoring selection of unknown conversation");
            return Err(SessionError::UnknownConversation(id));
        }
        self.active_id = id;
        Ok(())
    }

    /// Cycle the active conversation forward, wrapping at the end
    pub fn select_next(&mut self) -> ConversationId {
        let index = self.active_position();
        let next = (index + 1) % self.conversations.len();
        self.active_id = self.conversations[next].id;
        self.active_id
    }

    /// Cycle the active conversation backward, wrapping at the start
    pub fn select_previous(&mut self) -> ConversationId {
        let index = self.active_position();
        let previous = index
            .checked_sub(1)
            .unwrap_or(self.conversations.len() - 1);
        self.active_id = self.conversations[previous].id;
        self.active_id
    }

    pub fn append_message(
        &mut self,
        id: ConversationId,
        message: Message,
    ) -> Result<(), SessionError> {
        let conversation = self.conversation_mut(id)?;
        conversation.messages.push(message);
        Ok(())
    }

    /// Overwrite a conversation's title. Deciding when is up to the caller.
    pub fn set_title(&mut self, id: ConversationId, title: String) -> Result<(), SessionError> {
        let conversation = self.conversation_mut(id)?;
        conversation.title = title;
        conversation.title_is_placeholder = false;
        Ok(())
    }

    /// The active conversation, or the default one if the active id is dangling
    pub fn active_conversation(&self) -> &Conversation {
        self.conversation(self.active_id)
            .unwrap_or_else(|| self.default_conversation())
    }

    /// Id of the conversation [`active_conversation`](Self::active_conversation) resolves to
    pub fn active_id(&self) -> ConversationId {
        self.active_conversation().id
    }

    pub fn default_conversation(&self) -> &Conversation {
        &self.conversations[0]
    }

    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// All conversations in creation order
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    fn conversation_mut(&mut self, id: ConversationId) -> Result<&mut Conversation, SessionError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(SessionError::UnknownConversation(id))
    }

    fn position(&self, id: ConversationId) -> Option<usize> {
        self.conversations.iter().position(|c| c.id == id)
    }

    fn active_position(&self) -> usize {
        self.position(self.active_id).unwrap_or(0)
    }
}

/// A reply that could not be generated, kept so the user can retry it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFailure {
    pub conversation_id: ConversationId,
    pub text: String,
    pub message: String,
}

/// Everything a running chat session holds in memory
#[derive(Debug, Clone)]
pub struct Session {
    pub store: ConversationStore,
    pending: Option<ConversationId>,
    last_failure: Option<ExchangeFailure>,
}

impl Session {
    pub fn new(defaults: ConversationDefaults) -> Self {
        Self {
            store: ConversationStore::new(defaults),
            pending: None,
            last_failure: None,
        }
    }

    pub fn shared(defaults: ConversationDefaults) -> SharedSession {
        Arc::new(Mutex::new(Self::new(defaults)))
    }

    /// True while an exchange is waiting for its reply
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Conversation whose reply is outstanding
    pub fn pending_conversation(&self) -> Option<ConversationId> {
        self.pending
    }

    pub fn begin_pending(&mut self, conversation_id: ConversationId) {
        self.pending = Some(conversation_id);
    }

    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn last_failure(&self) -> Option<&ExchangeFailure> {
        self.last_failure.as_ref()
    }

    pub fn record_failure(&mut self, failure: ExchangeFailure) {
        self.last_failure = Some(failure);
    }

    pub fn take_failure(&mut self) -> Option<ExchangeFailure> {
        self.last_failure.take()
    }

    /// Immutable copy of the state for rendering
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversations: self.store.conversations().to_vec(),
            active_id: self.store.active_id(),
            pending: self.is_pending(),
            pending_conversation: self.pending_conversation(),
            failure: self.last_failure().cloned(),
        }
    }
}

/// Point-in-time view of a session, safe to hold across awaits
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub conversations: Vec<Conversation>,
    pub active_id: ConversationId,
    pub pending: bool,
    pub pending_conversation: Option<ConversationId>,
    pub failure: Option<ExchangeFailure>,
}

impl SessionSnapshot {
    pub fn active_conversation(&self) -> &Conversation {
        self.conversations
            .iter()
            .find(|c| c.id == self.active_id)
            .unwrap_or(&self.conversations[0])
    }

    pub fn active_index(&self) -> usize {
        self.conversations
            .iter()
            .position(|c| c.id == self.active_id)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn store() -> ConversationStore {
        ConversationStore::new(ConversationDefaults::default())
    }

    #[test]
    fn test_new_store_has_seeded_active_conversation() {
        let store = store();
        assert_eq!(store.len(), 1);

        let active = store.active_conversation();
        assert_eq!(active.title, "New chat");
        assert!(active.is_placeholder_title());
        assert_eq!(active.messages.len(), 1);
        assert_eq!(active.messages[0].role, Role::Assistant);
        assert_eq!(active.id, store.default_conversation().id);
    }

    #[test]
    fn test_create_conversation_appends_and_activates() {
        let mut store = store();
        let first = store.active_id();

        let id = store.create_conversation();

        assert_ne!(id, first);
        assert_eq!(store.len(), 2);
        assert_eq!(store.active_id(), id);
        assert_eq!(store.conversations()[1].id, id);

        let created = store.active_conversation();
        assert_eq!(created.messages.len(), 1);
        assert_eq!(created.messages[0].role, Role::Assistant);
        assert!(created.is_placeholder_title());
    }

    #[test]
    fn test_select_unknown_conversation_is_rejected() {
        let mut store = store();
        let second = store.create_conversation();
        let stranger = ConversationId::new();

        let result = store.select_conversation(stranger);

        assert_eq!(result, Err(SessionError::UnknownConversation(stranger)));
        assert_eq!(store.active_id(), second);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_select_existing_conversation() {
        let mut store = store();
        let first = store.active_id();
        store.create_conversation();

        store.select_conversation(first).unwrap();
        assert_eq!(store.active_id(), first);
    }

    #[test]
    fn test_append_message_keeps_order() {
        let mut store = store();
        let id = store.active_id();

        store.append_message(id, Message::user("one")).unwrap();
        store.append_message(id, Message::assistant("two")).unwrap();

        let contents: Vec<_> = store
            .active_conversation()
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents[1..], ["one", "two"]);
    }

    #[test]
    fn test_append_to_unknown_conversation_changes_nothing() {
        let mut store = store();
        let stranger = ConversationId::new();

        let result = store.append_message(stranger, Message::user("lost"));

        assert!(matches!(result, Err(SessionError::UnknownConversation(_))));
        assert_eq!(store.active_conversation().messages.len(), 1);
    }

    #[test]
    fn test_set_title_clears_placeholder() {
        let mut store = store();
        let id = store.active_id();

        store.set_title(id, "Custom".to_string()).unwrap();

        let conversation = store.conversation(id).unwrap();
        assert_eq!(conversation.title, "Custom");
        assert!(!conversation.is_placeholder_title());
        assert!(store.set_title(ConversationId::new(), "x".to_string()).is_err());
    }

    #[test]
    fn test_active_conversation_falls_back_to_default() {
        let mut store = store();
        store.create_conversation();
        store.active_id = ConversationId::new();

        assert_eq!(store.active_conversation().id, store.default_conversation().id);
        assert_eq!(store.active_id(), store.default_conversation().id);
    }

    #[test]
    fn test_select_next_and_previous_wrap() {
        let mut store = store();
        let a = store.active_id();
        let b = store.create_conversation();
        let c = store.create_conversation();

        assert_eq!(store.select_next(), a);
        assert_eq!(store.select_next(), b);
        assert_eq!(store.select_previous(), a);
        assert_eq!(store.select_previous(), c);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut session = Session::new(ConversationDefaults::default());
        let snapshot = session.snapshot();
        let id = session.store.active_id();

        session.store.append_message(id, Message::user("after")).unwrap();
        session.begin_pending(id);

        assert_eq!(snapshot.active_conversation().messages.len(), 1);
        assert!(!snapshot.pending);
        assert_eq!(snapshot.active_index(), 0);
        assert_eq!(session.snapshot().pending_conversation, Some(id));
    }

    #[test]
    fn test_pending_tracks_conversation() {
        let mut session = Session::new(ConversationDefaults::default());
        let id = session.store.active_id();
        assert!(!session.is_pending());

        session.begin_pending(id);
        assert!(session.is_pending());
        assert_eq!(session.pending_conversation(), Some(id));

        session.clear_pending();
        assert!(!session.is_pending());
        assert_eq!(session.pending_conversation(), None);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create,
        SelectKnown(usize),
        SelectUnknown,
        Append(usize),
        Next,
        Previous,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Create),
            (0usize..8).prop_map(Op::SelectKnown),
            Just(Op::SelectUnknown),
            (0usize..8).prop_map(Op::Append),
            Just(Op::Next),
            Just(Op::Previous),
        ]
    }

    proptest! {
        #[test]
        fn prop_store_invariants_hold(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let mut store = store();
            for op in ops {
                let before_active = store.active_id();
                match op {
                    Op::Create => {
                        store.create_conversation();
                    }
                    Op::SelectKnown(i) => {
                        let id = store.conversations()[i % store.len()].id;
                        store.select_conversation(id).unwrap();
                    }
                    Op::SelectUnknown => {
                        let lengths: Vec<_> = store.conversations().iter().map(|c| c.messages.len()).collect();
                        prop_assert!(store.select_conversation(ConversationId::new()).is_err());
                        prop_assert_eq!(store.active_id(), before_active);
                        let after: Vec<_> = store.conversations().iter().map(|c| c.messages.len()).collect();
                        prop_assert_eq!(lengths, after);
                    }
                    Op::Append(i) => {
                        let id = store.conversations()[i % store.len()].id;
                        store.append_message(id, Message::user("x")).unwrap();
                    }
                    Op::Next => {
                        store.select_next();
                    }
                    Op::Previous => {
                        store.select_previous();
                    }
                }

                prop_assert!(store.conversation(store.active_id()).is_some());
                for conversation in store.conversations() {
                    prop_assert!(!conversation.messages.is_empty());
                    prop_assert_eq!(conversation.messages[0].role, Role::Assistant);
                }
            }
        }
    }
}
