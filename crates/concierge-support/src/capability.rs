//! Collaborators the pipeline steps call out to.
//!
//! Each is a trait so the steps never depend on a concrete model provider,
//! order database or example store. OpenAI-backed implementations live in
//! [`crate::openai`]; tests plug in fakes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The last user message rewritten to stand on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedQuery {
  /// The standalone query from all the previous chat messages.
  pub standalone_query: String,
  /// The order id extracted from the latest user message, if any.
  pub order_id: Option<i64>,
}

/// Rewrites a conversation into a standalone query.
#[async_trait]
pub trait QueryExtractor: Send + Sync {
  async fn extract(&self, chat_history: &str, last_message: &str) -> anyhow::Result<ExtractedQuery>;
}

/// Looks up order records by id.
pub trait OrderLookup: Send + Sync {
  /// Returns `None` when no order has this id.
  fn lookup(&self, order_id: i64) -> anyhow::Result<Option<serde_json::Value>>;
}

/// A stored query/response pair with its similarity to the current query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredExample {
  pub query: String,
  pub response: String,
  pub score: f32,
}

/// Finds example exchanges similar to a query.
#[async_trait]
pub trait ExampleRetriever: Send + Sync {
  /// Returns candidates ordered by descending score.
  async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<ScoredExample>>;
}

/// Lazy, finite, non-restartable token sequence.
pub type TokenStream = Pin<Box<dyn Stream<Item = anyhow::Result<String>> + Send>>;

/// Generates an answer for a fully rendered prompt.
#[async_trait]
pub trait CompletionModel: Send + Sync {
  async fn stream(&self, prompt: &str) -> anyhow::Result<TokenStream>;
}

/// Turns text into embedding vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Identifies the embedding space; cached vectors from another model are stale.
  fn model_name(&self) -> &str;

  async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

  async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
