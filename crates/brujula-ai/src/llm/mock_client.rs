//! Deterministic scripted LLM client for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Duration, sleep};

use crate::error::{AiError, Result};

use super::{
    CompletionRequest, CompletionResponse, FinishReason, LlmClient, Role, StreamChunk,
    StreamResult, TokenUsage, ToolCall, ToolCallDelta,
};

/// Deterministic step for scripted mock completions.
#[derive(Debug, Clone)]
pub enum MockStepKind {
    /// Return a plain assistant message.
    Text(String),
    /// Return a plain assistant message, streamed as the given fragments.
    StreamedText(Vec<String>),
    /// Return a tool call response.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Return an LLM error.
    Error(String),
}

/// Scripted completion step with optional delay.
#[derive(Debug, Clone)]
pub struct MockStep {
    pub delay_ms: u64,
    pub kind: MockStepKind,
}

impl MockStep {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Text(content.into()),
        }
    }

    pub fn streamed<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            delay_ms: 0,
            kind: MockStepKind::StreamedText(
                fragments.into_iter().map(Into::into).collect(),
            ),
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::ToolCall {
                id: id.into(),
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            kind: MockStepKind::Error(message.into()),
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// A deterministic mock LLM client driven by scripted steps.
///
/// Steps are consumed in order regardless of whether the caller used
/// `complete` or `complete_stream`. When the script runs dry the client
/// echoes the latest user message.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    model: String,
    script: Arc<Mutex<VecDeque<MockStep>>>,
}

impl MockLlmClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn from_steps(model: impl Into<String>, steps: Vec<MockStep>) -> Self {
        Self {
            model: model.into(),
            script: Arc::new(Mutex::new(VecDeque::from(steps))),
        }
    }

    pub async fn push_step(&self, step: MockStep) {
        self.script.lock().await.push_back(step);
    }

    async fn next_step(&self) -> Option<MockStep> {
        self.script.lock().await.pop_front()
    }

    fn usage_for(content_len: usize) -> TokenUsage {
        let completion_tokens = content_len as u32;
        TokenUsage {
            prompt_tokens: 1,
            completion_tokens,
            total_tokens: 1 + completion_tokens,
        }
    }

    fn fallback_response(request: &CompletionRequest) -> CompletionResponse {
        let text = request
            .messages
            .iter()
            .rev()
            .find(|msg| matches!(msg.role, Role::User))
            .map(|msg| format!("mock-echo: {}", msg.content))
            .unwrap_or_else(|| "mock-ok".to_string());

        CompletionResponse {
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: Some(Self::usage_for(text.len())),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let Some(step) = self.next_step().await else {
            return Ok(Self::fallback_response(&request));
        };

        if step.delay_ms > 0 {
            sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.kind {
            MockStepKind::Text(content) => Ok(CompletionResponse {
                usage: Some(Self::usage_for(content.len())),
                content: Some(content),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
            }),
            MockStepKind::StreamedText(fragments) => {
                let content = fragments.concat();
                Ok(CompletionResponse {
                    usage: Some(Self::usage_for(content.len())),
                    content: Some(content),
                    tool_calls: Vec::new(),
                    finish_reason: FinishReason::Stop,
                })
            }
            MockStepKind::ToolCall {
                id,
                name,
                arguments,
            } => Ok(CompletionResponse {
                usage: Some(Self::usage_for(0)),
                content: None,
                tool_calls: vec![ToolCall {
                    id,
                    name,
                    arguments,
                }],
                finish_reason: FinishReason::ToolCalls,
            }),
            MockStepKind::Error(message) => Err(AiError::Llm(message)),
        }
    }

    fn complete_stream(&self, request: CompletionRequest) -> StreamResult {
        let client = self.clone();
        Box::pin(try_stream! {
            let step = client.next_step().await;

            match step {
                Some(MockStep { delay_ms, kind: MockStepKind::StreamedText(fragments) }) => {
                    if delay_ms > 0 {
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                    let mut total = 0usize;
                    for fragment in fragments {
                        total += fragment.len();
                        yield StreamChunk::text(fragment);
                    }
                    yield StreamChunk::final_chunk(
                        FinishReason::Stop,
                        Some(Self::usage_for(total)),
                    );
                }
                Some(MockStep { delay_ms, kind: MockStepKind::ToolCall { id, name, arguments } }) => {
                    if delay_ms > 0 {
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                    yield StreamChunk {
                        text: String::new(),
                        tool_call_delta: Some(ToolCallDelta {
                            index: 0,
                            id: Some(id),
                            name: Some(name),
                            arguments: Some(arguments.to_string()),
                        }),
                        finish_reason: None,
                        usage: None,
                    };
                    yield StreamChunk::final_chunk(FinishReason::ToolCalls, Some(Self::usage_for(0)));
                }
                Some(step) => {
                    // Replay remaining kinds through the non-stream path
                    client.script.lock().await.push_front(step);
                    let response = client.complete(request).await?;
                    if let Some(content) = response.content {
                        if !content.is_empty() {
                            yield StreamChunk::text(content);
                        }
                    }
                    yield StreamChunk::final_chunk(response.finish_reason, response.usage);
                }
                None => {
                    let response = Self::fallback_response(&request);
                    if let Some(content) = response.content {
                        yield StreamChunk::text(content);
                    }
                    yield StreamChunk::final_chunk(response.finish_reason, response.usage);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;

    use super::*;
    use crate::llm::{CompletionRequest, Message};

    #[tokio::test]
    async fn returns_scripted_text() {
        let client = MockLlmClient::from_steps("mock-model", vec![MockStep::text("hola")]);

        let response = client
            .complete(CompletionRequest::new(vec![Message::user("ping")]))
            .await
            .expect("mock response should succeed");

        assert_eq!(response.content.as_deref(), Some("hola"));
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn returns_scripted_tool_call() {
        let client = MockLlmClient::from_steps(
            "mock-model",
            vec![MockStep::tool_call(
                "call-1",
                "policy_retriever",
                serde_json::json!({"query": "regalos"}),
            )],
        );

        let response = client
            .complete(CompletionRequest::new(vec![Message::user("use tool")]))
            .await
            .expect("tool call response should succeed");

        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "policy_retriever");
    }

    #[tokio::test]
    async fn streams_fragments_in_order() {
        let client = MockLlmClient::from_steps(
            "mock-model",
            vec![MockStep::streamed(["Hola ", "mundo"])],
        );

        let chunks = client
            .complete_stream(CompletionRequest::new(vec![Message::user("hola")]))
            .try_collect::<Vec<_>>()
            .await
            .expect("stream should succeed");

        assert_eq!(chunks[0].text, "Hola ");
        assert_eq!(chunks[1].text, "mundo");
        assert!(chunks.last().unwrap().finish_reason.is_some());
    }

    #[tokio::test]
    async fn streams_tool_call_as_single_delta() {
        let client = MockLlmClient::from_steps(
            "mock-model",
            vec![MockStep::tool_call(
                "call-1",
                "policy_retriever",
                serde_json::json!({"query": "vacaciones"}),
            )],
        );

        let chunks = client
            .complete_stream(CompletionRequest::new(vec![Message::user("hola")]))
            .try_collect::<Vec<_>>()
            .await
            .expect("stream should succeed");

        let delta = chunks[0].tool_call_delta.as_ref().expect("delta expected");
        assert_eq!(delta.id.as_deref(), Some("call-1"));
        assert_eq!(
            chunks.last().unwrap().finish_reason,
            Some(FinishReason::ToolCalls)
        );
    }

    #[tokio::test]
    async fn falls_back_to_echo_when_script_is_empty() {
        let client = MockLlmClient::new("mock-model");

        let response = client
            .complete(CompletionRequest::new(vec![Message::user("ping")]))
            .await
            .expect("fallback should succeed");

        assert_eq!(response.content.as_deref(), Some("mock-echo: ping"));
    }
}
