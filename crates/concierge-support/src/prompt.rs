//! Prompt templates and the text blocks spliced into them.
//!
//! Templates are rendered with minijinja in strict mode, so a slot left
//! unfilled is an error rather than an empty string.

use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;

use crate::capability::ScoredExample;
use crate::error::SupportError;

/// Rewrites the last message into a standalone query.
pub const EXTRACT_QUERY_TEMPLATE: &str = "\
From the previous chat history between human and assistant, and the last message from the human, \
rewrite the last message from the human as a standalone query that doesn't rely on any context \
from the previous chat history. And also extract any information available that can be used to \
fulfill human's query. Follow the provided structure. Below are the chat history and the last \
message from the human:
<chat_history>
{{ chat_history }}
</chat_history>
<last_message>
{{ last_message }}
</last_message>
";

/// Answers the standalone query from order data and examples.
pub const ANSWER_TEMPLATE: &str = "\
Following is the conversation history between human and assistant.
---
{{ chat_history }}
---
Here is the human's question:
<query>
{{ query }}
</query>
Now using the information below, answer the human's query. If there are example query-response \
pairs, then you must follow the same response structure as the examples below.
{{ data }}
{{ examples }}
---
Query to answer:{{ query }}
Your Response: ";

const EXAMPLES_HEADER: &str = "Below are some examples of the structure of your response:\n";

/// Slots of [`ANSWER_TEMPLATE`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerSlots {
  pub chat_history: String,
  pub query: String,
  pub data: String,
  pub examples: String,
}

/// Slots of [`EXTRACT_QUERY_TEMPLATE`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractSlots {
  pub chat_history: String,
  pub last_message: String,
}

/// Render `template` against `slots`.
pub fn render<S: Serialize>(template: &str, slots: &S) -> Result<String, SupportError> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);

  env
    .render_str(template, Value::from_serialize(slots))
    .map_err(|e| SupportError::Template {
      message: e.to_string(),
    })
}

/// Format the examples scoring above `threshold`; empty when none do.
pub fn format_examples(examples: &[ScoredExample], threshold: f32) -> String {
  let pairs: Vec<String> = examples
    .iter()
    .filter(|e| e.score > threshold)
    .map(|e| format!("Query: {}\nResponse: {}", e.query, e.response))
    .collect();

  if pairs.is_empty() {
    String::new()
  } else {
    format!("{}{}", EXAMPLES_HEADER, pairs.join("\n---\n"))
  }
}

/// Wrap an order record for the answer prompt.
pub fn format_order(order_id: i64, record: Option<&serde_json::Value>) -> String {
  let body = match record {
    Some(record) => record.to_string(),
    None => format!("No order was found with id {}.", order_id),
  };
  format!(
    "Order details for order id {}:\n<data>\n{}\n</data>",
    order_id, body
  )
}
