//! Turn orchestrator: the conversation state machine.
//!
//! One turn runs the fixed pipeline `Model` → `PendingToolDecision` →
//! (`Tools` → `Model`)* → `CleanMessages` → `MessageCountDecision` →
//! (`SuggestQuestion` | `SummarizeConversation`) → `Join`. The orchestrator
//! never touches the canonical [`ConversationState`]; it works on a snapshot
//! and accumulates a [`TurnDelta`] the session runtime applies atomically.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::agent::state::{ConversationState, TurnDelta, UsedDocument};
use crate::agent::stream::{TokenEmitter, ToolCallAccumulator};
use crate::error::{AiError, Result};
use crate::llm::{CompletionRequest, LlmClient, Message, Role, ToolCall};
use crate::prompts::{NO_SUMMARY_PLACEHOLDER, PromptRegistry};
use crate::tools::ToolRegistry;

/// Human+assistant message count at which history is compacted.
pub const SUMMARIZE_THRESHOLD: usize = 6;

/// Defensive cap on model→tools cycles within one turn.
pub const MAX_TOOL_ROUNDS: usize = 8;

/// Marker set on tool-dispatch and tool-result messages so cleanup can
/// find them later.
pub const TOOL_MESSAGE_TAG: &str = "tool_message";

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

static NOMBRE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Nombre del documento:\s*(.+)").expect("valid regex"));
static FUENTE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Fuente:\s*(.+)").expect("valid regex"));

/// States of the per-turn pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Model,
    PendingToolDecision,
    Tools,
    CleanMessages,
    MessageCountDecision,
    SuggestQuestion,
    SummarizeConversation,
    Join,
}

/// Per-turn working view: the snapshot the steps read and mutate, plus the
/// delta mirroring every mutation for the runtime to replay.
struct Working {
    messages: Vec<Message>,
    summary: String,
    delta: TurnDelta,
    tool_rounds: usize,
}

impl Working {
    fn new(state: &ConversationState) -> Self {
        Self {
            messages: state.messages.clone(),
            summary: state.summary.clone(),
            delta: TurnDelta::default(),
            tool_rounds: 0,
        }
    }

    /// Append a message to the view and record it in the delta, assigning
    /// the id that makes it removable later.
    fn append(&mut self, message: Message) {
        let message = message.with_id(uuid::Uuid::new_v4().to_string());
        self.delta.append.push(message.clone());
        self.messages.push(message);
    }

    /// Tag the most recent message in both the view and the delta.
    fn tag_last(&mut self, tag: &str) {
        if let Some(message) = self.messages.last_mut() {
            message.name = Some(tag.to_string());
        }
        if let Some(message) = self.delta.append.last_mut() {
            message.name = Some(tag.to_string());
        }
    }

    /// Mark a message id for removal and drop it from the view.
    fn remove(&mut self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        self.messages
            .retain(|m| !m.id.as_deref().is_some_and(|id| ids.iter().any(|r| r == id)));
        self.delta.remove.extend(ids);
    }

    fn dialogue_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .count()
    }
}

/// Drives one conversation turn to completion.
///
/// Holds the model client and tool registry it was constructed with; no
/// process-wide singletons.
pub struct TurnOrchestrator {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    prompts: PromptRegistry,
    temperature: f32,
    max_tokens: u32,
    tool_timeout: Duration,
}

impl TurnOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>) -> Result<Self> {
        Ok(Self {
            llm,
            tools,
            prompts: PromptRegistry::new()?,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Run one full turn against a snapshot of the conversation.
    ///
    /// Content tokens are forwarded to `emitter` in generation order as they
    /// arrive. The returned delta carries every mutation the turn produced;
    /// nothing has been applied to `state` when this returns.
    pub async fn run_turn(
        &self,
        state: &ConversationState,
        emitter: &mut dyn TokenEmitter,
    ) -> Result<TurnDelta> {
        let mut work = Working::new(state);
        let mut turn_state = TurnState::Model;

        loop {
            turn_state = match turn_state {
                TurnState::Model => self.step_model(&mut work, emitter).await?,
                TurnState::PendingToolDecision => self.step_pending_tool_decision(&mut work)?,
                TurnState::Tools => self.step_tools(&mut work).await?,
                TurnState::CleanMessages => self.step_clean_messages(&mut work),
                TurnState::MessageCountDecision => count_transition(work.dialogue_count()),
                TurnState::SuggestQuestion => self.step_suggest_question(&mut work).await?,
                TurnState::SummarizeConversation => self.step_summarize(&mut work).await?,
                TurnState::Join => return Ok(work.delta),
            };
        }
    }

    /// `Model`: ensure the single system message exists, then invoke the
    /// model over the full history with tools bound, streaming tokens out.
    async fn step_model(
        &self,
        work: &mut Working,
        emitter: &mut dyn TokenEmitter,
    ) -> Result<TurnState> {
        if !work.messages.iter().any(|m| m.role == Role::System) {
            let summary = if work.summary.is_empty() {
                NO_SUMMARY_PLACEHOLDER
            } else {
                work.summary.as_str()
            };
            let system = Message::system(self.prompts.render_rag(summary)?)
                .with_id(uuid::Uuid::new_v4().to_string());
            work.messages.insert(0, system.clone());
            work.delta.insert_system = Some(system);
        }

        let request = CompletionRequest::new(work.messages.clone())
            .with_tools(self.tools.schemas())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let (content, tool_calls) = if self.llm.supports_streaming() {
            self.stream_model_response(request, emitter).await?
        } else {
            let response = self.llm.complete(request).await?;
            let content = response.content.unwrap_or_default();
            if !content.is_empty() {
                emitter.emit_token(&content).await;
            }
            (content, response.tool_calls)
        };

        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            let content = (!content.is_empty()).then_some(content);
            Message::assistant_with_tool_calls(content, tool_calls)
        };
        work.append(message);

        Ok(TurnState::PendingToolDecision)
    }

    async fn stream_model_response(
        &self,
        request: CompletionRequest,
        emitter: &mut dyn TokenEmitter,
    ) -> Result<(String, Vec<ToolCall>)> {
        let mut stream = self.llm.complete_stream(request);
        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.text.is_empty() {
                content.push_str(&chunk.text);
                emitter.emit_token(&chunk.text).await;
            }
            if let Some(delta) = &chunk.tool_call_delta {
                accumulator.accumulate(delta);
            }
            if let Some(usage) = &chunk.usage {
                tracing::debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "model call finished"
                );
            }
        }

        Ok((content, accumulator.finalize()))
    }

    /// `PendingToolDecision`: the turn tail must be an assistant message;
    /// anything else means a step appended out of order.
    fn step_pending_tool_decision(&self, work: &mut Working) -> Result<TurnState> {
        let last = work
            .messages
            .last()
            .ok_or_else(|| AiError::Contract("empty history after model step".to_string()))?;

        if last.role != Role::Assistant {
            return Err(AiError::Contract(format!(
                "expected assistant message at turn tail, got {:?}",
                last.role
            )));
        }

        if !last.has_tool_calls() {
            return Ok(TurnState::CleanMessages);
        }

        work.tag_last(TOOL_MESSAGE_TAG);

        if work.tool_rounds >= MAX_TOOL_ROUNDS {
            tracing::warn!(
                rounds = work.tool_rounds,
                "tool round cap reached, answering with what the model produced"
            );
            return Ok(TurnState::CleanMessages);
        }

        Ok(TurnState::Tools)
    }

    /// `Tools`: execute every requested call, append one tagged result
    /// message per call in request order, then hand control back to `Model`.
    async fn step_tools(&self, work: &mut Working) -> Result<TurnState> {
        let calls = work
            .messages
            .last()
            .and_then(|m| m.tool_calls.clone())
            .ok_or_else(|| AiError::Contract("tools step without tool calls".to_string()))?;

        let tool_futures: Vec<_> = calls
            .iter()
            .map(|call| {
                let tools = Arc::clone(&self.tools);
                let name = call.name.clone();
                let arguments = call.arguments.clone();
                let timeout = self.tool_timeout;
                async move {
                    match tokio::time::timeout(timeout, tools.execute(&name, arguments)).await {
                        Ok(result) => result,
                        Err(_) => Err(AiError::Tool(format!("tool {} timed out", name))),
                    }
                }
            })
            .collect();

        let results = futures::future::join_all(tool_futures).await;

        for (call, result) in calls.iter().zip(results) {
            let output = result?;
            let content = if output.success {
                match output.result {
                    Value::String(text) => text,
                    other => serde_json::to_string(&other)?,
                }
            } else {
                format!("Error: {}", output.error.unwrap_or_default())
            };
            tracing::debug!(tool = %call.name, "tool call executed");
            work.append(Message::tool_result(call.id.clone(), content).with_name(TOOL_MESSAGE_TAG));
        }

        work.tool_rounds += 1;
        Ok(TurnState::Model)
    }

    /// `CleanMessages`: harvest used documents out of tool output, then mark
    /// every tool-related message for removal. Removal is best-effort; a
    /// message without an id stays in history.
    fn step_clean_messages(&self, work: &mut Working) -> TurnState {
        let mut used_docs = Vec::new();
        let mut remove = Vec::new();

        for message in &work.messages {
            let tool_related = message.role == Role::Tool
                || message.name.as_deref() == Some(TOOL_MESSAGE_TAG);
            if !tool_related {
                continue;
            }
            used_docs.extend(extract_used_docs(&message.content));
            if let Some(id) = &message.id {
                remove.push(id.clone());
            }
        }

        work.delta.used_docs = used_docs;
        work.remove(remove);
        TurnState::MessageCountDecision
    }

    /// `SuggestQuestion`: one non-streaming model call over the latest
    /// exchange; the raw response text becomes the turn's suggestion.
    async fn step_suggest_question(&self, work: &mut Working) -> Result<TurnState> {
        let len = work.messages.len();
        if len < 2 {
            tracing::debug!("not enough history to suggest a question");
            return Ok(TurnState::Join);
        }

        let user_input = &work.messages[len - 2];
        let bot_response = &work.messages[len - 1];
        let prompt = self
            .prompts
            .render_suggestion(&user_input.content, &bot_response.content)?;

        let response = self
            .llm
            .complete(CompletionRequest::new(vec![Message::user(prompt)]))
            .await?;

        work.delta.suggested_question = response.content;
        Ok(TurnState::Join)
    }

    /// `SummarizeConversation`: compact every non-system message into the
    /// rolling summary, rewrite the system prompt with it, and mark the
    /// summarized messages for removal.
    async fn step_summarize(&self, work: &mut Working) -> Result<TurnState> {
        if !work.messages.iter().any(|m| m.role == Role::System) {
            return Err(AiError::Contract(
                "summarization reached with no system message".to_string(),
            ));
        }

        let to_summarize: Vec<&Message> = work
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();

        let transcript = to_summarize
            .iter()
            .map(|m| {
                let label = if m.role == Role::User { "USUARIO" } else { "BOT" };
                format!("{}: {}", label, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = self.prompts.render_summary(&transcript)?;
        let response = self
            .llm
            .complete(CompletionRequest::new(vec![Message::user(prompt)]))
            .await?;
        let summary = response.content.unwrap_or_default();

        let rewritten = self.prompts.render_rag(&summary)?;
        if let Some(system) = work.messages.iter_mut().find(|m| m.role == Role::System) {
            system.content = rewritten.clone();
        }
        work.delta.rewrite_system = Some(rewritten);
        work.delta.summary = Some(summary);

        let remove: Vec<String> = work
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .filter_map(|m| m.id.clone())
            .collect();
        work.remove(remove);

        Ok(TurnState::Join)
    }
}

fn count_transition(dialogue_count: usize) -> TurnState {
    if dialogue_count < SUMMARIZE_THRESHOLD {
        TurnState::SuggestQuestion
    } else {
        TurnState::SummarizeConversation
    }
}

/// Pair up `Nombre del documento:` / `Fuente:` lines in rendered tool
/// output. A block missing either field contributes nothing.
fn extract_used_docs(content: &str) -> Vec<UsedDocument> {
    let names = NOMBRE_PATTERN
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()));
    let sources = FUENTE_PATTERN
        .captures_iter(content)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()));

    names
        .zip(sources)
        .map(|(name, source)| UsedDocument { name, source })
        .collect()
}
