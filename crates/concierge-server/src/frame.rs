//! Data stream frames: `<type>:<json>\n`.

use serde_json::Value;

/// A text token frame.
pub fn text_frame(token: &str) -> String {
  format!("0:{}\n", Value::from(token))
}

/// An error frame, sent when a run fails after streaming began.
pub fn error_frame(message: &str) -> String {
  format!("3:{}\n", Value::from(message))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_text_frame_is_json_encoded() {
    assert_eq!(text_frame("Hello"), "0:\"Hello\"\n");
    assert_eq!(text_frame("say \"hi\"\n"), "0:\"say \\\"hi\\\"\\n\"\n");
  }

  #[test]
  fn test_error_frame() {
    assert_eq!(error_frame("boom"), "3:\"boom\"\n");
  }
}
