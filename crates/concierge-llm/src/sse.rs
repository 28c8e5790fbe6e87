//! Incremental decoder for `text/event-stream` bodies.
//!
//! Chunks from the network may split lines (and UTF-8 sequences) anywhere,
//! so bytes are buffered until a full line is available.

/// A decoded `data:` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
  Payload(String),
  /// The `[DONE]` sentinel that ends a completion stream.
  Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
  buffer: Vec<u8>,
}

impl SseDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Feed a chunk and return every complete `data:` field it finished.
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseData> {
    self.buffer.extend_from_slice(chunk);

    let mut out = Vec::new();
    while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
      let line: Vec<u8> = self.buffer.drain(..=pos).collect();
      if let Some(data) = parse_line(&line) {
        out.push(data);
      }
    }
    out
  }

  /// Flush a trailing line that was not newline-terminated.
  pub fn finish(&mut self) -> Option<SseData> {
    let line = std::mem::take(&mut self.buffer);
    parse_line(&line)
  }
}

fn parse_line(line: &[u8]) -> Option<SseData> {
  let line = String::from_utf8_lossy(line);
  let line = line.trim_end_matches(['\r', '\n']);

  // Comments, event names, ids and blank separators carry no payload.
  let data = line.strip_prefix("data:")?;
  let data = data.strip_prefix(' ').unwrap_or(data);

  if data == "[DONE]" {
    Some(SseData::Done)
  } else if data.is_empty() {
    None
  } else {
    Some(SseData::Payload(data.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decodes_split_chunks() {
    let mut decoder = SseDecoder::new();

    assert!(decoder.push(b"data: {\"a\"").is_empty());
    let events = decoder.push(b":1}\n\ndata: [DONE]\n\n");

    assert_eq!(
      events,
      vec![SseData::Payload("{\"a\":1}".to_string()), SseData::Done]
    );
  }

  #[test]
  fn test_ignores_comments_and_crlf() {
    let mut decoder = SseDecoder::new();
    let events = decoder.push(b": keep-alive\r\nevent: message\r\ndata: hi\r\n\r\n");

    assert_eq!(events, vec![SseData::Payload("hi".to_string())]);
  }

  #[test]
  fn test_multibyte_character_split_across_chunks() {
    let mut decoder = SseDecoder::new();
    let bytes = "data: café\n".as_bytes();
    let split = bytes.len() - 2;

    assert!(decoder.push(&bytes[..split]).is_empty());
    assert_eq!(
      decoder.push(&bytes[split..]),
      vec![SseData::Payload("café".to_string())]
    );
  }

  #[test]
  fn test_finish_flushes_unterminated_line() {
    let mut decoder = SseDecoder::new();
    assert!(decoder.push(b"data: tail").is_empty());
    assert_eq!(decoder.finish(), Some(SseData::Payload("tail".to_string())));
    assert_eq!(decoder.finish(), None);
  }
}
