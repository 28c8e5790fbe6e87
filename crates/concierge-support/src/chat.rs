//! Chat request payload.

use concierge_llm::{Message, MessageRole};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatDataError {
  #[error("Messages must not be empty")]
  EmptyMessages,
}

/// Body of a chat request: the whole conversation, newest message last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatData {
  pub messages: Vec<Message>,
  /// Opaque client data, accepted and ignored.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<serde_json::Value>,
}

impl ChatData {
  pub fn new(messages: Vec<Message>) -> Self {
    Self {
      messages,
      data: None,
    }
  }

  pub fn validate(&self) -> Result<(), ChatDataError> {
    if self.messages.is_empty() {
      return Err(ChatDataError::EmptyMessages);
    }
    Ok(())
  }

  pub fn last_message_content(&self) -> Result<&str, ChatDataError> {
    self
      .messages
      .last()
      .map(|m| m.content.as_str())
      .ok_or(ChatDataError::EmptyMessages)
  }

  /// Every message except the last.
  pub fn history(&self) -> &[Message] {
    match self.messages.split_last() {
      Some((_, history)) => history,
      None => &[],
    }
  }

  pub fn is_last_message_from_user(&self) -> bool {
    self
      .messages
      .last()
      .is_some_and(|m| m.role == MessageRole::User)
  }
}

/// Render messages as `role: content` lines.
pub fn render_history(messages: &[Message]) -> String {
  messages
    .iter()
    .map(|m| format!("{}: {}", m.role.as_str(), m.content))
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  fn conversation() -> ChatData {
    ChatData::new(vec![
      Message::user("Hi, I placed an order last week."),
      Message::assistant("Happy to help. What's the order number?"),
      Message::user("It's 123."),
    ])
  }

  #[test]
  fn test_last_message_and_history() {
    let chat = conversation();

    assert!(chat.validate().is_ok());
    assert_eq!(chat.last_message_content().unwrap(), "It's 123.");
    assert_eq!(chat.history().len(), 2);
    assert!(chat.is_last_message_from_user());
  }

  #[test]
  fn test_empty_messages_are_rejected() {
    let chat = ChatData::new(vec![]);

    assert_eq!(chat.validate(), Err(ChatDataError::EmptyMessages));
    assert_eq!(chat.last_message_content(), Err(ChatDataError::EmptyMessages));
    assert!(chat.history().is_empty());
    assert!(!chat.is_last_message_from_user());
  }

  #[test]
  fn test_render_history() {
    let chat = conversation();

    assert_eq!(
      render_history(chat.history()),
      "user: Hi, I placed an order last week.\nassistant: Happy to help. What's the order number?"
    );
    assert_eq!(render_history(&[]), "");
  }

  #[test]
  fn test_deserialize_request_body() {
    let chat: ChatData = serde_json::from_str(
      r#"{"messages": [{"role": "user", "content": "What standards for letters exist?"}]}"#,
    )
    .unwrap();

    assert_eq!(chat.messages[0].role, MessageRole::User);
    assert!(chat.data.is_none());
  }
}
