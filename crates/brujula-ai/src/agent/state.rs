//! Conversation state and the per-turn mutation set

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// A source document actually consulted during the latest retrieval.
///
/// Serialized with the boundary field names the chat layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedDocument {
    #[serde(rename = "Nombre del documento")]
    pub name: String,
    #[serde(rename = "Fuente")]
    pub source: String,
}

/// Per-session conversation record.
///
/// Created once per chat session and owned by the session runtime; the
/// orchestrator never mutates it directly: every turn produces a
/// [`TurnDelta`] the runtime applies atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered message log; conversation order, never reordered.
    pub messages: Vec<Message>,
    /// Rolling summary, empty until the history crosses the size threshold.
    pub summary: String,
    /// Follow-up question proposed for the latest turn.
    pub suggested_question: Option<String>,
    /// Documents consulted during the latest turn; recomputed every turn.
    pub used_docs: Vec<UsedDocument>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single system message, when present.
    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }

    /// Count of user + assistant messages (system and tool excluded).
    pub fn dialogue_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .count()
    }
}

/// Mutation set produced by one turn of the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct TurnDelta {
    /// System message to insert at the head of history, at most one per session.
    pub insert_system: Option<Message>,
    /// Messages appended during the turn, in order.
    pub append: Vec<Message>,
    /// Ids of messages to drop from history; unknown ids are skipped.
    pub remove: Vec<String>,
    /// Replacement content for the existing system message.
    pub rewrite_system: Option<String>,
    /// New rolling summary.
    pub summary: Option<String>,
    /// Follow-up question proposed this turn.
    pub suggested_question: Option<String>,
    /// Documents consulted this turn; always replaces the previous list.
    pub used_docs: Vec<UsedDocument>,
}

impl TurnDelta {
    /// Apply the mutation set to a conversation state.
    ///
    /// Removal is best-effort per message: entries without an id, or with an
    /// id nothing matches, are left in place.
    pub fn apply(self, state: &mut ConversationState) {
        if let Some(system) = self.insert_system {
            state.messages.insert(0, system);
        }

        state.messages.extend(self.append);

        if !self.remove.is_empty() {
            let remove: std::collections::HashSet<&str> =
                self.remove.iter().map(String::as_str).collect();
            state
                .messages
                .retain(|m| !m.id.as_deref().is_some_and(|id| remove.contains(id)));
        }

        if let Some(content) = self.rewrite_system {
            if let Some(system) = state.messages.iter_mut().find(|m| m.role == Role::System) {
                system.content = content;
            }
        }

        if let Some(summary) = self.summary {
            state.summary = summary;
        }

        if let Some(question) = self.suggested_question {
            state.suggested_question = Some(question);
        }

        state.used_docs = self.used_docs;
    }
}
