//! Retrieval tool adapter over a vector-search backend.
//!
//! The backend is a black box reached through [`Retriever`]; this adapter
//! only shapes its output. Each passage is rendered as a labeled text block
//! so the model can cite the source document by name; the structured
//! [`RetrievedPassage`] values remain available to callers that hold the
//! retriever directly.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::Result;
use crate::tools::traits::{Tool, ToolOutput};

/// Name the retrieval tool is registered under.
pub const RETRIEVER_TOOL_NAME: &str = "policy_retriever";

/// Rendered when a query matches nothing in the index.
pub const NO_RESULTS_MESSAGE: &str = "No se encontraron documentos relevantes para la consulta.";

/// One ranked passage returned by the vector search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub document_name: String,
    pub source: String,
    pub content: String,
    pub score: f32,
}

/// Similarity search over the indexed policy corpus.
///
/// Top-K and the similarity metric belong to the implementation.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<RetrievedPassage>>;
}

/// Tool adapter exposing a [`Retriever`] to the model.
pub struct RetrievalTool {
    retriever: Arc<dyn Retriever>,
}

impl RetrievalTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }

    /// Render passages as the labeled text blocks the model sees.
    pub fn format_passages(passages: &[RetrievedPassage]) -> String {
        if passages.is_empty() {
            return NO_RESULTS_MESSAGE.to_string();
        }

        passages
            .iter()
            .map(|p| {
                format!(
                    "Nombre del documento: {}\nFuente: {}\nContenido: {}",
                    p.document_name, p.source, p.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Deserialize)]
struct RetrievalInput {
    query: String,
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        RETRIEVER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search and retrieve information from the company policy knowledge base"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural language query to search the policy documents for"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolOutput> {
        let params: RetrievalInput = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::error(format!("Invalid input: {}", e))),
        };

        let passages = self.retriever.search(&params.query).await?;
        tracing::debug!(
            query = %params.query,
            passages = passages.len(),
            "retrieval tool executed"
        );

        Ok(ToolOutput::success(Value::String(Self::format_passages(
            &passages,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRetriever {
        passages: Vec<RetrievedPassage>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn search(&self, _query: &str) -> Result<Vec<RetrievedPassage>> {
            Ok(self.passages.clone())
        }
    }

    fn passage(name: &str, source: &str, content: &str) -> RetrievedPassage {
        RetrievedPassage {
            document_name: name.to_string(),
            source: source.to_string(),
            content: content.to_string(),
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn formats_each_passage_as_labeled_block() {
        let tool = RetrievalTool::new(Arc::new(FixedRetriever {
            passages: vec![
                passage(
                    "Política de Regalos.pdf",
                    "docs/regalos.pdf",
                    "Los regalos deben declararse.",
                ),
                passage(
                    "Código de Ética.pdf",
                    "docs/etica.pdf",
                    "Los conflictos de interés se reportan.",
                ),
            ],
        }));

        let output = tool
            .execute(json!({"query": "regalos"}))
            .await
            .expect("retrieval should succeed");
        assert!(output.success);

        let text = output.result.as_str().unwrap();
        assert!(text.starts_with("Nombre del documento: Política de Regalos.pdf\n"));
        assert!(text.contains("Fuente: docs/regalos.pdf"));
        assert!(text.contains("\n\nNombre del documento: Código de Ética.pdf"));
    }

    #[tokio::test]
    async fn empty_results_render_fixed_message() {
        let tool = RetrievalTool::new(Arc::new(FixedRetriever { passages: vec![] }));

        let output = tool.execute(json!({"query": "nada"})).await.unwrap();
        assert_eq!(output.result.as_str().unwrap(), NO_RESULTS_MESSAGE);
    }

    #[tokio::test]
    async fn malformed_input_is_a_soft_error() {
        let tool = RetrievalTool::new(Arc::new(FixedRetriever { passages: vec![] }));

        let output = tool.execute(json!({"q": "regalos"})).await.unwrap();
        assert!(!output.success);
        assert!(output.error.unwrap().starts_with("Invalid input"));
    }
}
