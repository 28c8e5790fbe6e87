//! OpenAI-backed capabilities.

use async_trait::async_trait;
use concierge_llm::{Message, OpenAi};

use crate::capability::{CompletionModel, Embedder, ExtractedQuery, QueryExtractor, TokenStream};
use crate::prompt::{EXTRACT_QUERY_TEMPLATE, ExtractSlots, render};

#[async_trait]
impl QueryExtractor for OpenAi {
  async fn extract(&self, chat_history: &str, last_message: &str) -> anyhow::Result<ExtractedQuery> {
    let prompt = render(
      EXTRACT_QUERY_TEMPLATE,
      &ExtractSlots {
        chat_history: chat_history.to_string(),
        last_message: last_message.to_string(),
      },
    )?;
    OpenAi::extract::<ExtractedQuery>(self, vec![Message::user(prompt)]).await
  }
}

#[async_trait]
impl CompletionModel for OpenAi {
  async fn stream(&self, prompt: &str) -> anyhow::Result<TokenStream> {
    self.stream_chat(vec![Message::user(prompt)]).await
  }
}

#[async_trait]
impl Embedder for OpenAi {
  fn model_name(&self) -> &str {
    self.embedding_model()
  }

  async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
    OpenAi::embed(self, text).await
  }

  async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
    OpenAi::embed_batch(self, texts).await
  }
}
