use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
  System,
  User,
  Assistant,
}

impl MessageRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      MessageRole::System => "system",
      MessageRole::User => "user",
      MessageRole::Assistant => "assistant",
    }
  }
}

/// One chat message as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub role: MessageRole,
  pub content: String,
}

impl Message {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::System,
      content: content.into(),
    }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::User,
      content: content.into(),
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: MessageRole::Assistant,
      content: content.into(),
    }
  }
}
