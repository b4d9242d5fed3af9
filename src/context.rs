//! # Conversation context
//!
//! Per-session dialogue history for the LLM fallback. Each session keeps at most
//! `2 × max_turns` [`Turn`]s (one user message plus one assistant reply per
//! exchange); appending past that drops the oldest turns first.
//!
//! Contexts live only in process memory. A [`ContextManager`] creates them lazily
//! on first access and forgets them only through [`ContextManager::clear_context`].
//!
//! ```rust
//! use bizbot::context::{ContextManager, Role};
//!
//! let mut contexts = ContextManager::new(2);
//! contexts.set_business_type("session-1", "retail");
//! contexts.add_user_message("session-1", "Where is my order?");
//! contexts.add_assistant_message("session-1", "Please share the order number.");
//!
//! let turns = contexts.get_context_for_llm("session-1");
//! assert_eq!(turns[0].role, Role::User);
//! assert_eq!(contexts.get_business_type("session-1").as_deref(), Some("retail"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Who produced a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Bookkeeping attached to a conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextMetadata {
    pub created_at: DateTime<Utc>,
    /// Bumped by every append and metadata write.
    pub last_updated: DateTime<Utc>,
    pub business_type: Option<String>,
    /// Free-form values, e.g. user preferences.
    pub extra: BTreeMap<String, JsonValue>,
}

/// The bounded history of one session.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    session_id: String,
    max_turns: usize,
    turns: VecDeque<Turn>,
    metadata: ContextMetadata,
}

impl ConversationContext {
    /// Create an empty context. A `max_turns` of zero is treated as one.
    pub fn new(session_id: impl Into<String>, max_turns: usize) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            max_turns: max_turns.max(1),
            turns: VecDeque::new(),
            metadata: ContextMetadata {
                created_at: now,
                last_updated: now,
                business_type: None,
                extra: BTreeMap::new(),
            },
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Maximum number of stored turns: `2 × max_turns`.
    pub fn capacity(&self) -> usize {
        self.max_turns * 2
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn add_user_message(&mut self, message: impl Into<String>) {
        self.push(Turn::user(message));
    }

    pub fn add_assistant_message(&mut self, message: impl Into<String>) {
        self.push(Turn::assistant(message));
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity() {
            self.turns.pop_front();
        }
        self.touch();
    }

    /// The stored turns, oldest first.
    pub fn get_context_for_llm(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn metadata(&self) -> &ContextMetadata {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: JsonValue) {
        self.metadata.extra.insert(key.into(), value);
        self.touch();
    }

    pub fn get_metadata(&self, key: &str) -> Option<&JsonValue> {
        self.metadata.extra.get(key)
    }

    pub fn business_type(&self) -> Option<&str> {
        self.metadata.business_type.as_deref()
    }

    pub fn set_business_type(&mut self, business_type: impl Into<String>) {
        self.metadata.business_type = Some(business_type.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.metadata.last_updated = Utc::now();
    }
}

/// All live conversation contexts of this process, keyed by session id.
#[derive(Debug, Default)]
pub struct ContextManager {
    contexts: HashMap<String, ConversationContext>,
    max_turns: usize,
}

impl ContextManager {
    /// `max_turns` applies to every context this manager creates.
    pub fn new(max_turns: usize) -> Self {
        Self {
            contexts: HashMap::new(),
            max_turns,
        }
    }

    pub fn get_or_create_context(&mut self, session_id: &str) -> &mut ConversationContext {
        let max_turns = self.max_turns;
        self.contexts
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Creating conversation context for session {session_id}");
                ConversationContext::new(session_id, max_turns)
            })
    }

    /// Look up a context without creating it.
    pub fn get(&self, session_id: &str) -> Option<&ConversationContext> {
        self.contexts.get(session_id)
    }

    pub fn add_user_message(&mut self, session_id: &str, message: impl Into<String>) {
        self.get_or_create_context(session_id)
            .add_user_message(message);
    }

    pub fn add_assistant_message(&mut self, session_id: &str, message: impl Into<String>) {
        self.get_or_create_context(session_id)
            .add_assistant_message(message);
    }

    pub fn get_context_for_llm(&mut self, session_id: &str) -> Vec<Turn> {
        self.get_or_create_context(session_id).get_context_for_llm()
    }

    pub fn set_business_type(&mut self, session_id: &str, business_type: impl Into<String>) {
        self.get_or_create_context(session_id)
            .set_business_type(business_type);
    }

    pub fn get_business_type(&mut self, session_id: &str) -> Option<String> {
        self.get_or_create_context(session_id)
            .business_type()
            .map(str::to_string)
    }

    /// Forget a session. Returns whether it existed.
    pub fn clear_context(&mut self, session_id: &str) -> bool {
        self.contexts.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
