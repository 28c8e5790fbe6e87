//! Tests for loading ServiceConfig from disk.

use std::io::Write;

use concierge_config::{ConfigError, ServiceConfig};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
  let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
  file
    .write_all(contents.as_bytes())
    .expect("failed to write config");
  file
}

#[test]
fn test_load_reads_and_validates() {
  let file = write_config(
    r#"{
      "model": { "chat_model": "gpt-4o", "base_url": "http://localhost:11434/v1" },
      "few_shot": { "top_k": 4, "score_threshold": 0.7 }
    }"#,
  );

  let config = ServiceConfig::load(file.path()).unwrap();

  assert_eq!(config.model.chat_model, "gpt-4o");
  assert_eq!(
    config.model.base_url.as_deref(),
    Some("http://localhost:11434/v1")
  );
  assert_eq!(config.few_shot.top_k, 4);
  assert_eq!(config.workflow.timeout_secs, 360);
}

#[test]
fn test_load_empty_object_yields_defaults() {
  let file = write_config("{}");

  let config = ServiceConfig::load(file.path()).unwrap();
  assert_eq!(config, ServiceConfig::default());
}

#[test]
fn test_load_missing_file_is_io_error() {
  let dir = tempfile::tempdir().unwrap();
  let err = ServiceConfig::load(dir.path().join("missing.json")).unwrap_err();

  assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_load_malformed_json_is_parse_error() {
  let file = write_config("{ not json");
  let err = ServiceConfig::load(file.path()).unwrap_err();

  assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_load_invalid_values_fail_validation() {
  let file = write_config(r#"{"workflow": {"timeout_secs": 0}}"#);
  let err = ServiceConfig::load(file.path()).unwrap_err();

  assert!(err.to_string().contains("workflow.timeout_secs"));
}

#[test]
fn test_load_or_default_without_path() {
  let config = ServiceConfig::load_or_default(None).unwrap();
  assert_eq!(config.server.port, 8000);
}
