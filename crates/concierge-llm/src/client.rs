use std::pin::Pin;

use anyhow::{Context as _, Result, anyhow};
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::message::Message;
use crate::retry::RetryPolicy;
use crate::schema::StructuredOutput;
use crate::sse::{SseData, SseDecoder};
use crate::types::{ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, StreamChunk};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Lazy, finite stream of completion text fragments.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Client for OpenAI-compatible chat completion and embedding endpoints.
#[derive(Clone)]
pub struct OpenAi {
  api_key: String,
  model: String,
  embedding_model: String,
  base_url: String,
  retry: RetryPolicy,
  http: reqwest::Client,
}

impl OpenAi {
  pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
    Self {
      api_key: api_key.into(),
      model: model.into(),
      embedding_model: "text-embedding-3-small".to_string(),
      base_url: OPENAI_API_URL.to_string(),
      retry: RetryPolicy::default(),
      http: reqwest::Client::new(),
    }
  }

  pub fn from_env(model: impl Into<String>) -> Result<Self> {
    let api_key = std::env::var("OPENAI_API_KEY")
      .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
    Ok(Self::new(api_key, model))
  }

  pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
    self.embedding_model = model.into();
    self
  }

  pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into().trim_end_matches('/').to_string();
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn model(&self) -> &str {
    &self.model
  }

  pub fn embedding_model(&self) -> &str {
    &self.embedding_model
  }

  /// Complete a conversation and return the full reply.
  #[instrument(name = "openai_chat", skip(self, messages), fields(model = %self.model))]
  pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
    let request = ChatRequest::new(&self.model, messages);
    let response: ChatResponse = self
      .post("chat/completions", &request)
      .await?
      .json()
      .await
      .context("failed to decode chat completion")?;

    response
      .into_content()
      .ok_or_else(|| anyhow!("No response from OpenAI"))
  }

  /// System + user prompt convenience over [`OpenAi::chat`].
  pub async fn chat_completion(
    &self,
    system: impl Into<String>,
    user: impl Into<String>,
  ) -> Result<String> {
    self
      .chat(vec![Message::system(system), Message::user(user)])
      .await
  }

  /// Ask for a reply shaped as `T` using strict JSON-schema output.
  #[instrument(name = "openai_extract", skip_all, fields(model = %self.model, output = %T::output_name()))]
  pub async fn extract<T: StructuredOutput>(&self, messages: Vec<Message>) -> Result<T> {
    let request =
      ChatRequest::new(&self.model, messages).json_schema(&T::output_name(), T::strict_schema());
    let response: ChatResponse = self
      .post("chat/completions", &request)
      .await?
      .json()
      .await
      .context("failed to decode structured output")?;

    let json = response
      .into_content()
      .ok_or_else(|| anyhow!("No response from OpenAI"))?;

    serde_json::from_str(&json).map_err(|e| anyhow!("Failed to deserialize response: {}", e))
  }

  /// Stream a completion token by token.
  ///
  /// Request failures are returned before any token is produced. Dropping the
  /// stream closes the connection.
  #[instrument(name = "openai_stream", skip(self, messages), fields(model = %self.model))]
  pub async fn stream_chat(&self, messages: Vec<Message>) -> Result<CompletionStream> {
    let request = ChatRequest::new(&self.model, messages).streaming();
    let response = self.post("chat/completions", &request).await?;

    let stream = async_stream::stream! {
      let mut body = response.bytes_stream();
      let mut decoder = SseDecoder::new();

      'stream: {
        while let Some(chunk) = body.next().await {
          let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
              yield Err(anyhow::Error::new(e).context("completion stream interrupted"));
              break 'stream;
            }
          };

          for data in decoder.push(&chunk) {
            match decode_chunk(data) {
              Decoded::Token(token) => yield Ok::<String, anyhow::Error>(token),
              Decoded::Empty => {}
              Decoded::Done => break 'stream,
              Decoded::Malformed(e) => {
                yield Err(e);
                break 'stream;
              }
            }
          }
        }

        // The body ended without `[DONE]`; flush an unterminated last line.
        if let Some(data) = decoder.finish() {
          match decode_chunk(data) {
            Decoded::Token(token) => yield Ok(token),
            Decoded::Malformed(e) => yield Err(e),
            Decoded::Empty | Decoded::Done => {}
          }
        }
      }
    };

    Ok(Box::pin(stream))
  }

  /// Embed a single text.
  pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    let request = EmbeddingRequest {
      model: self.embedding_model.clone(),
      input: serde_json::Value::String(text.to_string()),
    };
    let response: EmbeddingResponse = self
      .post("embeddings", &request)
      .await?
      .json()
      .await
      .context("failed to decode embedding response")?;

    response
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or_else(|| anyhow!("No embedding in response"))
  }

  /// Embed many texts in one request; output order matches input order.
  #[instrument(name = "openai_embed_batch", skip(self, texts), fields(count = texts.len()))]
  pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingRequest {
      model: self.embedding_model.clone(),
      input: serde_json::Value::Array(
        texts
          .iter()
          .map(|t| serde_json::Value::String(t.clone()))
          .collect(),
      ),
    };
    let response: EmbeddingResponse = self
      .post("embeddings", &request)
      .await?
      .json()
      .await
      .context("failed to decode embedding response")?;

    let mut data = response.data;
    if data.len() != texts.len() {
      return Err(anyhow!(
        "expected {} embeddings, got {}",
        texts.len(),
        data.len()
      ));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
  }

  fn headers(&self) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
      AUTHORIZATION,
      HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(headers)
  }

  /// POST `body` to `path`, retrying transient failures.
  async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
    let url = format!("{}/{}", self.base_url, path);
    let headers = self.headers()?;
    let mut attempt = 0;

    loop {
      debug!(url = %url, attempt, "OpenAI request");

      let result = self
        .http
        .post(&url)
        .headers(headers.clone())
        .json(body)
        .send()
        .await;

      let retry_reason = match result {
        Ok(response) if response.status().is_success() => return Ok(response),
        Ok(response) => {
          let status = response.status();
          let error_text = response.text().await.unwrap_or_default();
          if !RetryPolicy::is_retryable_status(status) || attempt >= self.retry.max_retries {
            return Err(anyhow!("OpenAI API error ({}): {}", status, error_text));
          }
          status.to_string()
        }
        Err(e) => {
          if !RetryPolicy::is_retryable_error(&e) || attempt >= self.retry.max_retries {
            return Err(anyhow::Error::new(e).context(format!("request to {} failed", url)));
          }
          e.to_string()
        }
      };

      let delay = self.retry.delay(attempt);
      warn!(
        url = %url,
        attempt,
        delay_ms = delay.as_millis() as u64,
        reason = %retry_reason,
        "retrying OpenAI request"
      );
      tokio::time::sleep(delay).await;
      attempt += 1;
    }
  }
}

enum Decoded {
  Token(String),
  Empty,
  Done,
  Malformed(anyhow::Error),
}

fn decode_chunk(data: SseData) -> Decoded {
  let payload = match data {
    SseData::Done => return Decoded::Done,
    SseData::Payload(payload) => payload,
  };
  match serde_json::from_str::<StreamChunk>(&payload) {
    Ok(parsed) => parsed.into_content().map_or(Decoded::Empty, Decoded::Token),
    Err(e) => Decoded::Malformed(anyhow!("malformed stream chunk {}: {}", payload, e)),
  }
}
