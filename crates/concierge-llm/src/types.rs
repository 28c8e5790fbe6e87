//! Wire types for the chat completions and embeddings endpoints.

use serde::{Deserialize, Serialize};

use crate::message::Message;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
  pub model: String,
  pub messages: Vec<Message>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f32>,
  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
  pub fn new(model: &str, messages: Vec<Message>) -> Self {
    Self {
      model: model.to_string(),
      messages,
      temperature: default_temperature(model),
      stream: false,
      response_format: None,
    }
  }

  pub fn streaming(mut self) -> Self {
    self.stream = true;
    self
  }

  pub fn json_schema(mut self, name: &str, schema: serde_json::Value) -> Self {
    self.response_format = Some(ResponseFormat {
      format_type: "json_schema".to_string(),
      json_schema: JsonSchemaFormat {
        name: name.to_string(),
        strict: true,
        schema,
      },
    });
    self
  }
}

/// Reasoning models reject an explicit temperature.
fn default_temperature(model: &str) -> Option<f32> {
  let reasoning = ["gpt-5", "o1", "o3", "o4"];
  if reasoning.iter().any(|prefix| model.starts_with(prefix)) {
    None
  } else {
    Some(0.0)
  }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ResponseFormat {
  #[serde(rename = "type")]
  pub format_type: String,
  pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JsonSchemaFormat {
  pub name: String,
  pub strict: bool,
  pub schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
  pub choices: Vec<Choice>,
}

impl ChatResponse {
  pub fn into_content(self) -> Option<String> {
    self.choices.into_iter().next().and_then(|c| c.message.content)
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
  pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
  pub content: Option<String>,
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
  #[serde(default)]
  pub choices: Vec<StreamChoice>,
}

impl StreamChunk {
  pub fn into_content(self) -> Option<String> {
    self
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.delta.content)
      .filter(|content| !content.is_empty())
  }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamChoice {
  #[serde(default)]
  pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Delta {
  pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EmbeddingRequest {
  pub model: String,
  pub input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingResponse {
  pub data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmbeddingData {
  #[serde(default)]
  pub index: usize,
  pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_plain_request_omits_optional_fields() {
    let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
    let value = serde_json::to_value(&request).unwrap();

    assert_eq!(
      value,
      json!({
        "model": "gpt-4o-mini",
        "messages": [{"role": "user", "content": "hi"}],
        "temperature": 0.0
      })
    );
  }

  #[test]
  fn test_streaming_structured_request() {
    let request = ChatRequest::new("o4-mini", vec![])
      .streaming()
      .json_schema("structured_response", json!({"type": "object"}));
    let value = serde_json::to_value(&request).unwrap();

    assert_eq!(value["stream"], json!(true));
    assert!(value.get("temperature").is_none());
    assert_eq!(value["response_format"]["type"], "json_schema");
    assert_eq!(value["response_format"]["json_schema"]["strict"], true);
  }

  #[test]
  fn test_stream_chunk_skips_empty_deltas() {
    let role_only: StreamChunk =
      serde_json::from_value(json!({"choices": [{"delta": {"role": "assistant"}}]})).unwrap();
    assert_eq!(role_only.into_content(), None);

    let text: StreamChunk =
      serde_json::from_value(json!({"choices": [{"delta": {"content": "Hel"}}]})).unwrap();
    assert_eq!(text.into_content().as_deref(), Some("Hel"));

    let usage_only: StreamChunk = serde_json::from_value(json!({"usage": {}})).unwrap();
    assert_eq!(usage_only.into_content(), None);
  }
}
