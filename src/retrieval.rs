use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, SearchPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::embeddings::{cosine_similarity, Embedder};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector search failed: {0}")]
    Search(String),
    #[error("corpus could not be loaded: {0}")]
    Corpus(String),
}

/// Best stored answer for a question and its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub text: String,
    pub score: f64,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Nearest stored answer, or `None` when the index has nothing to offer.
    async fn nearest(&self, question: &str) -> Result<Option<RetrievalHit>, RetrievalError>;
}

/// Vector search over a Qdrant collection whose points carry the answer
/// text in a `text` (or `answer`) payload field.
pub struct QdrantRetriever {
    client: Qdrant,
    collection_name: String,
    top_k: u64,
    embedder: Arc<dyn Embedder>,
}

impl QdrantRetriever {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection_name: String,
        top_k: u64,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let mut client_builder = Qdrant::from_url(url);

        if let Some(key) = api_key {
            client_builder = client_builder.api_key(key);
        }

        let client = client_builder
            .build()
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        Ok(Self {
            client,
            collection_name,
            top_k: top_k.max(1),
            embedder,
        })
    }

    /// Creates the collection if it is missing. An existing collection is
    /// left untouched.
    pub async fn ensure_collection(&self, dimensions: u64) -> Result<(), RetrievalError> {
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection_name)
                    .vectors_config(VectorParamsBuilder::new(dimensions, Distance::Cosine)),
            )
            .await;

        match result {
            Ok(_) => {
                tracing::info!("Created Qdrant collection: {}", self.collection_name);
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                tracing::debug!("Qdrant collection '{}' already exists", self.collection_name);
                Ok(())
            }
            Err(e) => Err(RetrievalError::Search(e.to_string())),
        }
    }
}

#[async_trait]
impl Retriever for QdrantRetriever {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn nearest(&self, question: &str) -> Result<Option<RetrievalHit>, RetrievalError> {
        let query_embedding = self.embedder.embed(question).await?;

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection_name, query_embedding, self.top_k)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RetrievalError::Search(e.to_string()))?;

        let best = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                let text = point
                    .payload
                    .get("text")
                    .or_else(|| point.payload.get("answer"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())?;
                Some(RetrievalHit {
                    text,
                    score: point.score as f64,
                })
            })
            .max_by(|a, b| a.score.total_cmp(&b.score));

        if let Some(ref hit) = best {
            tracing::debug!("Qdrant best hit score {:.3} ({} chars)", hit.score, hit.text.len());
        }
        Ok(best)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CorpusEntry {
    Text(String),
    Passage {
        #[serde(alias = "answer")]
        text: String,
        #[serde(default)]
        question: Option<String>,
    },
}

/// In-process retriever over a small passage corpus, used when no vector
/// database is configured.
pub struct CorpusRetriever {
    passages: Vec<(String, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
}

impl CorpusRetriever {
    /// Embeds `(key, answer)` pairs; the key is what questions are matched
    /// against, the answer is what gets returned.
    pub async fn build(
        entries: Vec<(String, String)>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RetrievalError> {
        let keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let vectors = embedder.embed_batch(keys).await?;
        let passages = entries
            .into_iter()
            .zip(vectors)
            .map(|((_, answer), vector)| (answer, vector))
            .collect();
        Ok(Self { passages, embedder })
    }

    /// Loads a JSON array whose items are either plain strings or objects
    /// with `text`/`answer` and an optional `question`.
    pub async fn from_json_file(path: &str, embedder: Arc<dyn Embedder>) -> Result<Self, RetrievalError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RetrievalError::Corpus(format!("{}: {}", path, e)))?;
        let entries: Vec<CorpusEntry> = serde_json::from_str(&raw)
            .map_err(|e| RetrievalError::Corpus(format!("{}: {}", path, e)))?;

        let pairs = entries
            .into_iter()
            .map(|entry| match entry {
                CorpusEntry::Text(text) => (text.clone(), text),
                CorpusEntry::Passage { text, question } => (question.unwrap_or_else(|| text.clone()), text),
            })
            .collect();

        Self::build(pairs, embedder).await
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl Retriever for CorpusRetriever {
    fn name(&self) -> &'static str {
        "corpus"
    }

    async fn nearest(&self, question: &str) -> Result<Option<RetrievalHit>, RetrievalError> {
        if self.passages.is_empty() {
            return Ok(None);
        }
        let query = self.embedder.embed(question).await?;

        Ok(self
            .passages
            .iter()
            .map(|(text, vector)| RetrievalHit {
                text: text.clone(),
                score: cosine_similarity(&query, vector) as f64,
            })
            .max_by(|a, b| a.score.total_cmp(&b.score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashedEmbeddings;

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashedEmbeddings::new(256))
    }

    #[tokio::test]
    async fn corpus_returns_best_matching_answer() {
        let retriever = CorpusRetriever::build(
            vec![
                (
                    "what are the symptoms of malaria".to_string(),
                    "Fever, chills and headache are common malaria symptoms.".to_string(),
                ),
                (
                    "how much water should I drink".to_string(),
                    "Most adults need about two litres of fluid a day.".to_string(),
                ),
            ],
            embedder(),
        )
        .await
        .unwrap();

        let hit = retriever
            .nearest("What are the symptoms of malaria?")
            .await
            .unwrap()
            .unwrap();
        assert!(hit.text.starts_with("Fever"));
        assert!((hit.score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_corpus_has_no_hit() {
        let retriever = CorpusRetriever::build(Vec::new(), embedder()).await.unwrap();
        assert!(retriever.is_empty());
        assert_eq!(retriever.nearest("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn loads_mixed_json_corpus() {
        let path = std::env::temp_dir().join(format!("corpus-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"["Wash hands often to prevent infection.",
               {"question": "what is a normal resting heart rate", "answer": "60 to 100 beats per minute."}]"#,
        )
        .unwrap();

        let retriever = CorpusRetriever::from_json_file(path.to_str().unwrap(), embedder())
            .await
            .unwrap();
        assert_eq!(retriever.len(), 2);

        let hit = retriever
            .nearest("What is a normal resting heart rate?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.text, "60 to 100 beats per minute.");

        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_corpus_file_is_an_error() {
        let err = CorpusRetriever::from_json_file("/nonexistent/corpus.json", embedder())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetrievalError::Corpus(_)));
    }
}
