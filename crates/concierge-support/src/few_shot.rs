//! Few-shot example retrieval.
//!
//! The dataset is a JSON object mapping example queries to example responses.
//! Query embeddings are computed once and cached under the index directory;
//! the cache is rebuilt when the embedding model or the dataset changes.
//! Retrieval ranks examples by cosine similarity to the incoming query.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{Embedder, ExampleRetriever, ScoredExample};
use crate::error::SupportError;

const INDEX_FILE: &str = "few_shot_index.json";

/// One embedded example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
  pub query: String,
  pub response: String,
  pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
  model: String,
  entries: Vec<IndexEntry>,
}

/// In-memory vector index over the example queries.
#[derive(Debug, Clone)]
pub struct FewShotIndex {
  model: String,
  entries: Vec<IndexEntry>,
}

impl FewShotIndex {
  pub fn new(model: impl Into<String>, entries: Vec<IndexEntry>) -> Self {
    Self {
      model: model.into(),
      entries,
    }
  }

  /// Read the `{query: response}` dataset.
  pub fn load_dataset(path: &Path) -> Result<Vec<(String, String)>, SupportError> {
    let raw = std::fs::read_to_string(path).map_err(|e| SupportError::io(path, e))?;
    let map: serde_json::Map<String, serde_json::Value> =
      serde_json::from_str(&raw).map_err(|e| SupportError::invalid(path, e))?;

    map
      .into_iter()
      .map(|(query, response)| match response {
        serde_json::Value::String(response) => Ok((query, response)),
        other => Err(SupportError::invalid(
          path,
          format!("response for '{}' must be a string, got {}", query, other),
        )),
      })
      .collect()
  }

  /// Embed every dataset query.
  pub async fn build(dataset: Vec<(String, String)>, embedder: &dyn Embedder) -> anyhow::Result<Self> {
    let queries: Vec<String> = dataset.iter().map(|(q, _)| q.clone()).collect();
    let embeddings = embedder.embed_batch(&queries).await?;
    if embeddings.len() != dataset.len() {
      return Err(
        SupportError::Index {
          message: format!(
            "embedded {} of {} examples",
            embeddings.len(),
            dataset.len()
          ),
        }
        .into(),
      );
    }

    let entries = dataset
      .into_iter()
      .zip(embeddings)
      .map(|((query, response), embedding)| IndexEntry {
        query,
        response,
        embedding,
      })
      .collect();

    Ok(Self::new(embedder.model_name(), entries))
  }

  /// Load the cached index from `index_dir`, rebuilding it if it is missing
  /// or stale.
  pub async fn load_or_build(
    dataset_path: &Path,
    index_dir: &Path,
    embedder: &dyn Embedder,
  ) -> anyhow::Result<Self> {
    let dataset = Self::load_dataset(dataset_path)?;
    let cache_path = index_dir.join(INDEX_FILE);

    if let Some(index) = Self::read_cache(&cache_path).await {
      if index.matches(&dataset, embedder.model_name()) {
        info!(path = %cache_path.display(), examples = index.len(), "few_shot_index_loaded");
        return Ok(index);
      }
      info!(path = %cache_path.display(), "few_shot_index_stale");
    }

    info!(examples = dataset.len(), model = %embedder.model_name(), "few_shot_index_building");
    let index = Self::build(dataset, embedder).await?;
    index.write_cache(index_dir, &cache_path).await?;
    Ok(index)
  }

  async fn read_cache(path: &Path) -> Option<Self> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str::<IndexFile>(&raw) {
      Ok(file) => Some(Self::new(file.model, file.entries)),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "ignoring unreadable few-shot cache");
        None
      }
    }
  }

  async fn write_cache(&self, index_dir: &Path, path: &Path) -> Result<(), SupportError> {
    tokio::fs::create_dir_all(index_dir)
      .await
      .map_err(|e| SupportError::io(index_dir, e))?;

    let file = IndexFile {
      model: self.model.clone(),
      entries: self.entries.clone(),
    };
    let raw = serde_json::to_string(&file).map_err(|e| SupportError::Index {
      message: e.to_string(),
    })?;
    tokio::fs::write(path, raw)
      .await
      .map_err(|e| SupportError::io(path, e))
  }

  fn matches(&self, dataset: &[(String, String)], model: &str) -> bool {
    self.model == model
      && self.entries.len() == dataset.len()
      && self
        .entries
        .iter()
        .zip(dataset)
        .all(|(entry, (query, response))| entry.query == *query && entry.response == *response)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The `top_k` entries most similar to `embedding`, best first.
  pub fn search(&self, embedding: &[f32], top_k: usize) -> Vec<ScoredExample> {
    let mut scored: Vec<ScoredExample> = self
      .entries
      .iter()
      .map(|entry| ScoredExample {
        query: entry.query.clone(),
        response: entry.response.clone(),
        score: cosine_similarity(embedding, &entry.embedding),
      })
      .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
  }
}

/// Cosine similarity; 0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }

  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if norm_a == 0.0 || norm_b == 0.0 {
    0.0
  } else {
    dot / (norm_a * norm_b)
  }
}

/// Embeds the incoming query and searches a [`FewShotIndex`].
pub struct EmbeddingRetriever {
  index: Arc<FewShotIndex>,
  embedder: Arc<dyn Embedder>,
  top_k: usize,
}

impl EmbeddingRetriever {
  pub fn new(index: Arc<FewShotIndex>, embedder: Arc<dyn Embedder>, top_k: usize) -> Self {
    Self {
      index,
      embedder,
      top_k,
    }
  }
}

#[async_trait]
impl ExampleRetriever for EmbeddingRetriever {
  async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<ScoredExample>> {
    if self.index.is_empty() {
      return Ok(Vec::new());
    }

    let embedding = self.embedder.embed(query).await?;
    let examples = self.index.search(&embedding, self.top_k);
    debug!(
      query = %query,
      scores = ?examples.iter().map(|e| e.score).collect::<Vec<_>>(),
      "few_shot_retrieved"
    );
    Ok(examples)
  }
}
