//! Brute-force cosine-similarity index over embedded passages.
//!
//! The demo and test backend for [`Retriever`]. A policy corpus is small
//! enough that exact scoring beats carrying an ANN dependency; hosted vector
//! stores plug in behind the same trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::embedding::provider::EmbeddingProvider;
use crate::error::Result;
use crate::tools::{RetrievedPassage, Retriever};

const DEFAULT_TOP_K: usize = 4;

/// One document chunk to index, as loaded from the corpus file.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDocument {
    pub document_name: String,
    pub source: String,
    pub content: String,
}

struct IndexEntry {
    document: IndexDocument,
    vector: Vec<f32>,
}

/// In-memory exact-cosine index.
pub struct CosineIndex {
    embedding: Arc<dyn EmbeddingProvider>,
    entries: Vec<IndexEntry>,
    top_k: usize,
}

impl CosineIndex {
    /// Embed and index the given documents.
    pub async fn build(
        embedding: Arc<dyn EmbeddingProvider>,
        documents: Vec<IndexDocument>,
    ) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = embedding.embed_batch(&texts).await?;

        let entries = documents
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| IndexEntry { document, vector })
            .collect();

        Ok(Self {
            embedding,
            entries,
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl Retriever for CosineIndex {
    async fn search(&self, query: &str) -> Result<Vec<RetrievedPassage>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedding.embed(query).await?;

        let mut scored: Vec<RetrievedPassage> = self
            .entries
            .iter()
            .map(|entry| RetrievedPassage {
                document_name: entry.document.document_name.clone(),
                source: entry.document.source.clone(),
                content: entry.document.content.clone(),
                score: cosine_similarity(&query_vector, &entry.vector),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(self.top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Deterministic embedding over a fixed vocabulary.
    struct FixedEmbedding {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixedEmbedding {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::with_capacity(texts.len());
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn doc(name: &str, content: &str) -> IndexDocument {
        IndexDocument {
            document_name: name.to_string(),
            source: format!("docs/{}", name),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn ranks_closest_document_first() {
        let embedding = Arc::new(FixedEmbedding::new(&[
            ("regalos", vec![1.0, 0.0, 0.0]),
            ("vacaciones", vec![0.0, 1.0, 0.0]),
            ("¿qué hago con un regalo?", vec![0.9, 0.1, 0.0]),
        ]));

        let index = CosineIndex::build(
            embedding,
            vec![doc("regalos.pdf", "regalos"), doc("vacaciones.pdf", "vacaciones")],
        )
        .await
        .unwrap()
        .with_top_k(1);

        let results = index.search("¿qué hago con un regalo?").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_name, "regalos.pdf");
        assert!(results[0].score > 0.8);
    }

    #[tokio::test]
    async fn top_k_bounds_result_count() {
        let embedding = Arc::new(FixedEmbedding::new(&[]));
        let index = CosineIndex::build(
            embedding,
            vec![doc("a.pdf", "a"), doc("b.pdf", "b"), doc("c.pdf", "c")],
        )
        .await
        .unwrap()
        .with_top_k(2);

        let results = index.search("cualquier cosa").await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn empty_index_returns_no_passages() {
        let embedding = Arc::new(FixedEmbedding::new(&[]));
        let index = CosineIndex::build(embedding, vec![]).await.unwrap();
        assert!(index.is_empty());
        assert!(index.search("hola").await.unwrap().is_empty());
    }
}
