//! Conversation log types
//!
//! The durable conversation store is an external collaborator; the
//! gateway commits turns through the `ConversationSink` boundary and
//! ships an in-memory implementation for sessions that do not persist.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One committed conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub committed_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            committed_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text)
    }
}

/// Boundary to whatever stores the conversation
pub trait ConversationSink: Send + Sync {
    /// Commit one turn. Order of calls is the order of the conversation.
    fn commit(&self, turn: Turn);

    /// Snapshot of the turns committed so far
    fn history(&self) -> Vec<Turn>;
}

/// In-memory conversation log
#[derive(Default)]
pub struct InMemoryConversationLog {
    turns: RwLock<Vec<Turn>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed turns
    pub fn turn_count(&self) -> usize {
        self.turns.read().len()
    }
}

impl ConversationSink for InMemoryConversationLog {
    fn commit(&self, turn: Turn) {
        self.turns.write().push(turn);
    }

    fn history(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_order() {
        let log = InMemoryConversationLog::new();
        log.commit(Turn::user("hello"));
        log.commit(Turn::assistant("hi there"));

        let history = log.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, TurnRole::User);
        assert_eq!(history[1].role, TurnRole::Assistant);
        assert_eq!(history[1].text, "hi there");
    }
}
