//! Per-turn boundary channels.
//!
//! A turn is observable on two separate channels: an ordered push stream of
//! content tokens for partial output, and a one-shot outcome resolved once
//! the turn reaches its terminal state.

use brujula_ai::UsedDocument;
use tokio::sync::{mpsc, oneshot};

/// Result of one completed turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Documents consulted during the turn, for rendering attachments.
    pub used_docs: Vec<UsedDocument>,
    /// Follow-up question the user may select next.
    pub suggested_question: Option<String>,
    /// Internal error description when the turn broke an invariant.
    pub error: Option<String>,
}

/// Handle to an in-flight turn.
pub struct TurnHandle {
    tokens: mpsc::Receiver<String>,
    outcome: oneshot::Receiver<TurnOutcome>,
}

impl TurnHandle {
    pub(crate) fn new(
        tokens: mpsc::Receiver<String>,
        outcome: oneshot::Receiver<TurnOutcome>,
    ) -> Self {
        Self { tokens, outcome }
    }

    /// Next content token, in generation order. `None` once the stream ends.
    pub async fn next_token(&mut self) -> Option<String> {
        self.tokens.recv().await
    }

    /// Drain the token stream into one string.
    pub async fn collect_text(&mut self) -> String {
        let mut text = String::new();
        while let Some(token) = self.tokens.recv().await {
            text.push_str(&token);
        }
        text
    }

    /// Wait for the turn to finish.
    ///
    /// Consumes the handle; any tokens not yet read are dropped so an
    /// unread stream can never block the turn.
    pub async fn outcome(self) -> TurnOutcome {
        let Self { tokens, outcome } = self;
        drop(tokens);
        outcome.await.unwrap_or_else(|_| TurnOutcome {
            error: Some("turn task aborted before completion".to_string()),
            ..TurnOutcome::default()
        })
    }
}
