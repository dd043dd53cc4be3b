//! Token emitters and streaming tool-call assembly

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

use crate::llm::{ToolCall, ToolCallDelta};

/// Sink for model-generated content tokens, forwarded in generation order.
#[async_trait]
pub trait TokenEmitter: Send {
    async fn emit_token(&mut self, text: &str);
}

/// Emitter that drops everything.
pub struct NullEmitter;

#[async_trait]
impl TokenEmitter for NullEmitter {
    async fn emit_token(&mut self, _text: &str) {}
}

/// Emitter pushing tokens into an mpsc channel toward the boundary.
pub struct ChannelEmitter {
    tx: mpsc::Sender<String>,
}

impl ChannelEmitter {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl TokenEmitter for ChannelEmitter {
    async fn emit_token(&mut self, text: &str) {
        // A closed receiver just means the boundary stopped listening
        let _ = self.tx.send(text.to_string()).await;
    }
}

#[derive(Debug, Clone)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments_json: String,
}

/// Assembles complete tool calls from streamed deltas, keyed by index.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    builders: BTreeMap<usize, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    pub fn accumulate(&mut self, delta: &ToolCallDelta) {
        let builder = self
            .builders
            .entry(delta.index)
            .or_insert_with(|| ToolCallBuilder {
                id: String::new(),
                name: String::new(),
                arguments_json: String::new(),
            });

        if let Some(id) = &delta.id {
            if builder.id.is_empty() {
                builder.id = id.clone();
            }
        }

        if let Some(name) = &delta.name {
            if builder.name.is_empty() {
                builder.name = name.clone();
            }
        }

        if let Some(args) = &delta.arguments {
            builder.arguments_json.push_str(args);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    pub fn finalize(self) -> Vec<ToolCall> {
        self.builders
            .into_values()
            .map(|builder| ToolCall {
                id: builder.id,
                name: builder.name,
                arguments: parse_arguments(&builder.arguments_json),
            })
            .collect()
    }
}

fn parse_arguments(json: &str) -> Value {
    if json.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                json_len = json.len(),
                error = %e,
                "Failed to parse tool call arguments, passing empty object"
            );
            Value::Object(serde_json::Map::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_joins_split_arguments() {
        let mut acc = ToolCallAccumulator::new();

        acc.accumulate(&ToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            name: Some("policy_retriever".to_string()),
            arguments: Some("{\"query\":".to_string()),
        });
        acc.accumulate(&ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some("\"regalos\"}".to_string()),
        });

        let calls = acc.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "policy_retriever");
        assert_eq!(calls[0].arguments, serde_json::json!({"query": "regalos"}));
    }

    #[test]
    fn accumulator_keeps_parallel_calls_ordered_by_index() {
        let mut acc = ToolCallAccumulator::new();

        acc.accumulate(&ToolCallDelta {
            index: 1,
            id: Some("call_2".to_string()),
            name: Some("two".to_string()),
            arguments: Some("{}".to_string()),
        });
        acc.accumulate(&ToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            name: Some("one".to_string()),
            arguments: Some("{}".to_string()),
        });

        let calls = acc.finalize();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "one");
        assert_eq!(calls[1].name, "two");
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let mut acc = ToolCallAccumulator::new();
        acc.accumulate(&ToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            name: Some("one".to_string()),
            arguments: Some("{not json".to_string()),
        });

        let calls = acc.finalize();
        assert_eq!(calls[0].arguments, serde_json::json!({}));
    }

    #[tokio::test]
    async fn channel_emitter_forwards_tokens_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut emitter = ChannelEmitter::new(tx);

        emitter.emit_token("Hola ").await;
        emitter.emit_token("mundo").await;
        drop(emitter);

        assert_eq!(rx.recv().await.unwrap(), "Hola ");
        assert_eq!(rx.recv().await.unwrap(), "mundo");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn null_emitter_accepts_tokens() {
        let mut emitter = NullEmitter;
        emitter.emit_token("ignorado").await;
    }
}
