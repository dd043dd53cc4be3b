//! Session runtime: owns one conversation per session id.
//!
//! The per-session mutex is the serialization key: no two turn-steps for
//! the same session run concurrently; distinct sessions share nothing and
//! progress independently. State lives in memory for the lifetime of the
//! process and is dropped with the session.

use std::sync::Arc;

use brujula_ai::error::AiError;
use brujula_ai::{ChannelEmitter, ConversationState, Message, TurnOrchestrator};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::handle::{TurnHandle, TurnOutcome};
use crate::starter::{StarterQuestion, default_starters};

/// Streamed to the user when a provider call fails mid-turn.
pub const APOLOGY_MESSAGE: &str = "Lo siento, ha ocurrido un problema al procesar tu consulta. \
Por favor, inténtalo nuevamente en unos minutos.";

const TOKEN_CHANNEL_CAPACITY: usize = 256;

struct SessionEntry {
    state: Mutex<ConversationState>,
    created_at: DateTime<Utc>,
}

/// Owns the conversations and runs turns against them.
pub struct SessionRuntime {
    orchestrator: Arc<TurnOrchestrator>,
    sessions: DashMap<String, Arc<SessionEntry>>,
    starters: Vec<StarterQuestion>,
}

impl SessionRuntime {
    pub fn new(orchestrator: TurnOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            sessions: DashMap::new(),
            starters: default_starters(),
        }
    }

    pub fn with_starters(mut self, starters: Vec<StarterQuestion>) -> Self {
        self.starters = starters;
        self
    }

    /// Starters for the boundary to render at session start.
    pub fn starter_questions(&self) -> &[StarterQuestion] {
        &self.starters
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// When the session was first seen, if it exists.
    pub fn started_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(session_id).map(|e| e.created_at)
    }

    /// Drop a session's state. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Copy of the session's conversation, for the boundary to inspect.
    pub async fn snapshot(&self, session_id: &str) -> Option<ConversationState> {
        let entry = self.sessions.get(session_id)?.clone();
        let state = entry.state.lock().await;
        Some(state.clone())
    }

    fn entry(&self, session_id: &str) -> Arc<SessionEntry> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session = %session_id, "session created");
                Arc::new(SessionEntry {
                    state: Mutex::new(ConversationState::new()),
                    created_at: Utc::now(),
                })
            })
            .clone()
    }

    /// Submit user text and start a turn.
    ///
    /// Returns immediately with the turn's boundary channels; the turn runs
    /// in the background, serialized behind any turn already in flight for
    /// the same session.
    pub fn submit(&self, session_id: &str, text: impl Into<String>) -> TurnHandle {
        let text = text.into();
        let entry = self.entry(session_id);
        let orchestrator = Arc::clone(&self.orchestrator);
        let session_id = session_id.to_string();

        let (token_tx, token_rx) = mpsc::channel(TOKEN_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut state = entry.state.lock().await;
            state.suggested_question = None;
            state
                .messages
                .push(Message::user(text).with_id(uuid::Uuid::new_v4().to_string()));

            let snapshot = state.clone();
            let mut emitter = ChannelEmitter::new(token_tx.clone());
            let outcome = match orchestrator.run_turn(&snapshot, &mut emitter).await {
                Ok(delta) => {
                    delta.apply(&mut state);
                    TurnOutcome {
                        used_docs: state.used_docs.clone(),
                        suggested_question: state.suggested_question.clone(),
                        error: None,
                    }
                }
                Err(error @ AiError::Contract(_)) => {
                    tracing::error!(session = %session_id, %error, "turn aborted on broken invariant");
                    TurnOutcome {
                        error: Some(error.to_string()),
                        ..TurnOutcome::default()
                    }
                }
                Err(error) => {
                    tracing::warn!(session = %session_id, %error, "provider failure, apologizing");
                    let _ = token_tx.send(APOLOGY_MESSAGE.to_string()).await;
                    state.messages.push(
                        Message::assistant(APOLOGY_MESSAGE)
                            .with_id(uuid::Uuid::new_v4().to_string()),
                    );
                    state.used_docs.clear();
                    TurnOutcome::default()
                }
            };

            let _ = outcome_tx.send(outcome);
        });

        TurnHandle::new(token_rx, outcome_rx)
    }

    /// Re-submit the stored suggested question as if the user had typed it.
    ///
    /// `None` when the session has no pending suggestion.
    pub async fn select_suggested_question(&self, session_id: &str) -> Option<TurnHandle> {
        let entry = self.sessions.get(session_id)?.clone();
        let question = entry.state.lock().await.suggested_question.clone()?;
        Some(self.submit(session_id, question))
    }
}

#[cfg(test)]
mod tests {
    use brujula_ai::tools::{RetrievalTool, RetrievedPassage, Retriever, ToolRegistry};
    use brujula_ai::{MockLlmClient, MockStep, Role};
    use serde_json::json;

    use super::*;

    struct FixedRetriever;

    #[async_trait::async_trait]
    impl Retriever for FixedRetriever {
        async fn search(&self, _query: &str) -> brujula_ai::Result<Vec<RetrievedPassage>> {
            Ok(vec![RetrievedPassage {
                document_name: "Política de Regalos.pdf".to_string(),
                source: "docs/regalos.pdf".to_string(),
                content: "Todo regalo debe declararse.".to_string(),
                score: 0.9,
            }])
        }
    }

    fn runtime(steps: Vec<MockStep>) -> SessionRuntime {
        let llm = Arc::new(MockLlmClient::from_steps("mock-model", steps));
        let mut tools = ToolRegistry::new();
        tools.register(RetrievalTool::new(Arc::new(FixedRetriever)));
        let orchestrator = TurnOrchestrator::new(llm, Arc::new(tools)).unwrap();
        SessionRuntime::new(orchestrator)
    }

    #[tokio::test]
    async fn full_turn_streams_answer_and_resolves_outcome() {
        let runtime = runtime(vec![
            MockStep::tool_call("call-1", "policy_retriever", json!({"query": "regalos"})),
            MockStep::streamed(["Debes ", "declararlo."]),
            MockStep::text("¿A quién se declara?"),
        ]);

        let mut handle = runtime.submit("session-1", "¿Qué hago si recibo un regalo?");
        assert_eq!(handle.collect_text().await, "Debes declararlo.");

        let outcome = handle.outcome().await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.used_docs.len(), 1);
        assert_eq!(outcome.used_docs[0].name, "Política de Regalos.pdf");
        assert_eq!(
            outcome.suggested_question.as_deref(),
            Some("¿A quién se declara?")
        );

        let state = runtime.snapshot("session-1").await.unwrap();
        let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn provider_failure_streams_apology_and_keeps_state_usable() {
        let runtime = runtime(vec![
            MockStep::error("rate limit exceeded"),
            MockStep::streamed(["Ahora sí."]),
            MockStep::text("¿Otra consulta?"),
        ]);

        let mut handle = runtime.submit("session-1", "hola");
        assert_eq!(handle.collect_text().await, APOLOGY_MESSAGE);
        let outcome = handle.outcome().await;
        assert!(outcome.error.is_none());
        assert!(outcome.used_docs.is_empty());

        let state = runtime.snapshot("session-1").await.unwrap();
        assert_eq!(state.messages.last().unwrap().content, APOLOGY_MESSAGE);

        // The next turn recovers normally.
        let handle = runtime.submit("session-1", "¿sigues ahí?");
        let outcome = handle.outcome().await;
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn resubmitted_suggestion_is_ordinary_user_input() {
        let runtime = runtime(vec![
            MockStep::streamed(["Debes declararlo."]),
            MockStep::text("¿Quiénes integran el comité?"),
            MockStep::streamed(["Lo integran tres gerencias."]),
            MockStep::text("¿Cómo se contacta al comité?"),
        ]);

        let handle = runtime.submit("session-1", "¿Qué hago si recibo un regalo?");
        let outcome = handle.outcome().await;
        let suggested = outcome.suggested_question.clone().unwrap();

        let handle = runtime
            .select_suggested_question("session-1")
            .await
            .expect("suggestion pending");
        let outcome = handle.outcome().await;
        assert!(outcome.error.is_none());

        let state = runtime.snapshot("session-1").await.unwrap();
        let second_user = state
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .nth(1)
            .unwrap();
        assert_eq!(second_user.content, suggested);
        assert!(second_user.name.is_none());
    }

    #[tokio::test]
    async fn selecting_without_suggestion_returns_none() {
        let runtime = runtime(vec![]);
        assert!(
            runtime
                .select_suggested_question("session-1")
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn turns_for_one_session_are_serialized() {
        let runtime = runtime(vec![
            MockStep::streamed(["primera respuesta"]).with_delay(25),
            MockStep::text("¿sugerencia 1?"),
            MockStep::streamed(["segunda respuesta"]),
            MockStep::text("¿sugerencia 2?"),
        ]);

        // The first turn holds the session lock once its stream starts;
        // the second queues behind it.
        let mut first = runtime.submit("session-1", "primera pregunta");
        assert_eq!(first.next_token().await.unwrap(), "primera respuesta");
        let second = runtime.submit("session-1", "segunda pregunta");
        first.outcome().await;
        second.outcome().await;

        let state = runtime.snapshot("session-1").await.unwrap();
        let dialogue: Vec<String> = state
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(
            dialogue,
            vec![
                "primera pregunta",
                "primera respuesta",
                "segunda pregunta",
                "segunda respuesta",
            ]
        );
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let runtime = runtime(vec![
            MockStep::streamed(["respuesta a"]),
            MockStep::text("¿a?"),
            MockStep::streamed(["respuesta b"]),
            MockStep::text("¿b?"),
        ]);

        runtime.submit("session-a", "pregunta a").outcome().await;
        runtime.submit("session-b", "pregunta b").outcome().await;

        assert_eq!(runtime.session_count(), 2);
        let a = runtime.snapshot("session-a").await.unwrap();
        assert!(a.messages.iter().all(|m| m.content != "respuesta b"));
        assert!(runtime.end_session("session-a"));
        assert_eq!(runtime.session_count(), 1);
    }

    #[tokio::test]
    async fn summarization_turn_clears_the_previous_suggestion() {
        let runtime = runtime(vec![
            // Turn 1 and 2: answer + suggestion.
            MockStep::streamed(["respuesta 1"]),
            MockStep::text("¿sugerencia 1?"),
            MockStep::streamed(["respuesta 2"]),
            MockStep::text("¿sugerencia 2?"),
            // Turn 3 reaches the summarization threshold: answer + summary.
            MockStep::streamed(["respuesta 3"]),
            MockStep::text("resumen de la conversación"),
        ]);

        runtime.submit("s", "pregunta 1").outcome().await;
        runtime.submit("s", "pregunta 2").outcome().await;
        let outcome = runtime.submit("s", "pregunta 3").outcome().await;

        assert!(outcome.suggested_question.is_none());
        let state = runtime.snapshot("s").await.unwrap();
        assert!(state.suggested_question.is_none());
        assert_eq!(state.summary, "resumen de la conversación");
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn starters_are_exposed_for_the_boundary() {
        let runtime = runtime(vec![]).with_starters(vec![StarterQuestion::new(
            "Vacaciones",
            "¿Cuántos días de vacaciones tengo?",
        )]);
        assert_eq!(runtime.starter_questions().len(), 1);
        assert_eq!(runtime.starter_questions()[0].label, "Vacaciones");
    }
}
