use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Composite key identifying one ongoing conversation: a user-scope token
/// plus a conversation-scope token. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub user: String,
    pub conversation: String,
}

impl SessionId {
    /// Mint a fresh conversation under the given user scope.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            conversation: Uuid::new_v4().to_string(),
        }
    }

    pub fn from_parts(user: impl Into<String>, conversation: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            conversation: conversation.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.user, self.conversation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// Which component produced an agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Dispatcher,
    Resolver,
    Composer,
    Chat,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub origin: Option<Origin>,
    pub created_at: DateTime<Utc>,
    /// Structured data produced alongside the text, e.g. fetched records.
    pub attachment: Option<serde_json::Value>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            origin: None,
            created_at: Utc::now(),
            attachment: None,
        }
    }

    pub fn agent(content: impl Into<String>, origin: Origin) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            origin: Some(origin),
            created_at: Utc::now(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, attachment: serde_json::Value) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Compact digest of the conversation so far. Replaced wholesale on each
/// regeneration, never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub message_count_at_generation: usize,
}

/// Everything remembered for one session. Owned exclusively by its
/// SessionId; all mutation goes through the narrow methods below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    pub summary: Option<Summary>,
    summary_cursor: usize,
    known_symbols: Vec<String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append-only: the single mutator of the message log.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn summary_cursor(&self) -> usize {
        self.summary_cursor
    }

    /// Messages appended since the last summary generation.
    pub fn messages_since_summary(&self) -> &[Message] {
        &self.messages[self.summary_cursor..]
    }

    /// Install a freshly generated summary and advance the cursor to the
    /// current message count.
    pub fn replace_summary(&mut self, summary: Summary) {
        self.summary_cursor = self.messages.len();
        self.summary = Some(summary);
    }

    pub fn known_symbols(&self) -> &[String] {
        &self.known_symbols
    }

    /// Record a resolved symbol; most recently mentioned moves to the end.
    pub fn record_symbol(&mut self, symbol: &str) {
        self.known_symbols.retain(|s| s != symbol);
        self.known_symbols.push(symbol.to_string());
    }

    /// Render the context block handed to the completion service:
    /// summary (or an explicit no-context marker), a few recent
    /// messages, and the symbols discussed so far.
    pub fn context_for_completion(&self) -> String {
        let mut context = String::new();
        match &self.summary {
            Some(s) => {
                context.push_str("Conversation summary: ");
                context.push_str(&s.text);
            }
            None => context.push_str("Conversation summary: (no prior conversation)"),
        }

        let recent = self.messages.iter().rev().take(5).collect::<Vec<_>>();
        if !recent.is_empty() {
            context.push_str("\n\nRecent messages:\n");
            for msg in recent.into_iter().rev() {
                let who = match msg.role {
                    Role::User => "User",
                    Role::Agent => "Agent",
                };
                context.push_str(&format!("- {}: {}\n", who, msg.content));
            }
        }

        if !self.known_symbols.is_empty() {
            context.push_str(&format!(
                "\nSymbols previously discussed (oldest to newest): {}",
                self.known_symbols.join(", ")
            ));
        }

        context
    }
}

type SharedState = Arc<tokio::sync::Mutex<ConversationState>>;

/// Session-keyed store of conversation state.
///
/// Each session maps to its own async-mutexed state so one session is
/// single-flight while unrelated sessions proceed concurrently. The
/// outer map lock is never held across an await.
#[derive(Default)]
pub struct ConversationStore {
    sessions: Mutex<HashMap<String, SharedState>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to a session's state, created empty on first access.
    pub fn entry(&self, id: &SessionId) -> SharedState {
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        sessions
            .entry(id.key())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(ConversationState::new())))
            .clone()
    }

    pub async fn append(&self, id: &SessionId, message: Message) {
        let entry = self.entry(id);
        let mut state = entry.lock().await;
        state.append(message);
    }

    /// Snapshot of the session's state (implicitly created if unknown).
    pub async fn get(&self, id: &SessionId) -> ConversationState {
        let entry = self.entry(id);
        let state = entry.lock().await;
        state.clone()
    }

    /// Discard messages, summary, and known symbols. The SessionId itself
    /// stays valid and may be written again.
    pub async fn reset(&self, id: &SessionId) {
        let entry = self.entry(id);
        let mut state = entry.lock().await;
        *state = ConversationState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_by_exactly_one() {
        let mut state = ConversationState::new();
        for n in 1..=4 {
            state.append(Message::user(format!("message {}", n)));
            assert_eq!(state.message_count(), n);
        }
        assert!(state.summary_cursor() <= state.message_count());
    }

    #[test]
    fn replace_summary_advances_cursor() {
        let mut state = ConversationState::new();
        state.append(Message::user("hello"));
        state.append(Message::agent("hi", Origin::Chat));

        state.replace_summary(Summary {
            text: "greeting exchange".into(),
            topics: vec![],
            symbols: vec![],
            generated_at: Utc::now(),
            message_count_at_generation: 2,
        });

        assert_eq!(state.summary_cursor(), 2);
        assert!(state.messages_since_summary().is_empty());

        state.append(Message::user("what's AAPL at?"));
        assert_eq!(state.messages_since_summary().len(), 1);
        assert!(state.summary_cursor() <= state.message_count());
    }

    #[test]
    fn record_symbol_keeps_most_recent_last() {
        let mut state = ConversationState::new();
        state.record_symbol("AAPL");
        state.record_symbol("TSLA");
        state.record_symbol("AAPL");
        assert_eq!(state.known_symbols(), &["TSLA", "AAPL"]);
    }

    #[test]
    fn context_marks_missing_summary() {
        let state = ConversationState::new();
        assert!(state.context_for_completion().contains("no prior conversation"));
    }

    #[tokio::test]
    async fn get_on_unknown_session_is_empty() {
        let store = ConversationStore::new();
        let id = SessionId::from_parts("u1", "c1");
        let state = store.get(&id).await;
        assert_eq!(state.message_count(), 0);
        assert!(state.summary.is_none());
    }

    #[tokio::test]
    async fn reset_clears_state_but_not_identity() {
        let store = ConversationStore::new();
        let id = SessionId::from_parts("u1", "c1");
        store.append(&id, Message::user("hello")).await;
        assert_eq!(store.get(&id).await.message_count(), 1);

        store.reset(&id).await;
        let state = store.get(&id).await;
        assert_eq!(state.message_count(), 0);
        assert!(state.known_symbols().is_empty());

        store.append(&id, Message::user("again")).await;
        assert_eq!(store.get(&id).await.message_count(), 1);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = ConversationStore::new();
        let a = SessionId::from_parts("u1", "c1");
        let b = SessionId::from_parts("u1", "c2");
        store.append(&a, Message::user("only in a")).await;
        assert_eq!(store.get(&a).await.message_count(), 1);
        assert_eq!(store.get(&b).await.message_count(), 0);
    }
}
