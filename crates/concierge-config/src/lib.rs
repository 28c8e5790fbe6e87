//! Concierge Config
//!
//! Serializable service settings. Every field has a default, so an empty JSON
//! object (or no file at all) yields a runnable configuration. Secrets such as
//! the model API key are not part of this file; they come from the
//! environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid config value for '{field}': {message}")]
  Invalid { field: &'static str, message: String },
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
  pub server: ServerConfig,
  pub workflow: WorkflowConfig,
  pub model: ModelConfig,
  pub few_shot: FewShotConfig,
  pub orders: OrdersConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host: "0.0.0.0".to_string(),
      port: 8000,
    }
  }
}

/// Per-run limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
  /// Deadline for one chat run, in seconds.
  pub timeout_secs: u64,
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    Self { timeout_secs: 360 }
  }
}

/// Language model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
  pub chat_model: String,
  pub embedding_model: String,
  /// Override for OpenAI-compatible endpoints.
  pub base_url: Option<String>,
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      chat_model: "gpt-4o-mini".to_string(),
      embedding_model: "text-embedding-3-small".to_string(),
      base_url: None,
    }
  }
}

/// Few-shot example retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FewShotConfig {
  /// JSON object mapping example queries to example responses.
  pub dataset_path: PathBuf,
  /// Directory holding the cached example embeddings.
  pub index_dir: PathBuf,
  pub top_k: usize,
  /// Examples must score strictly above this to be used.
  pub score_threshold: f32,
}

impl Default for FewShotConfig {
  fn default() -> Self {
    Self {
      dataset_path: PathBuf::from("dataset.json"),
      index_dir: PathBuf::from(".data"),
      top_k: 2,
      score_threshold: 0.5,
    }
  }
}

/// Order database settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersConfig {
  pub database_path: PathBuf,
}

impl Default for OrdersConfig {
  fn default() -> Self {
    Self {
      database_path: PathBuf::from("sample_database.json"),
    }
  }
}

impl ServiceConfig {
  /// Read, parse and validate a JSON config file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  /// Load `path` if given, otherwise validate and return the defaults.
  pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
    match path {
      Some(path) => Self::load(path),
      None => {
        let config = Self::default();
        config.validate()?;
        Ok(config)
      }
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.server.port == 0 {
      return Err(ConfigError::Invalid {
        field: "server.port",
        message: "must be non-zero".to_string(),
      });
    }
    if self.workflow.timeout_secs == 0 {
      return Err(ConfigError::Invalid {
        field: "workflow.timeout_secs",
        message: "must be greater than zero".to_string(),
      });
    }
    if self.few_shot.top_k == 0 {
      return Err(ConfigError::Invalid {
        field: "few_shot.top_k",
        message: "must be at least 1".to_string(),
      });
    }
    if !(0.0..=1.0).contains(&self.few_shot.score_threshold) {
      return Err(ConfigError::Invalid {
        field: "few_shot.score_threshold",
        message: format!("{} is outside [0, 1]", self.few_shot.score_threshold),
      });
    }
    if self.model.chat_model.trim().is_empty() {
      return Err(ConfigError::Invalid {
        field: "model.chat_model",
        message: "must not be empty".to_string(),
      });
    }
    Ok(())
  }

  /// `host:port` for the HTTP listener.
  pub fn bind_address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_match_service_behaviour() {
    let config = ServiceConfig::default();

    assert_eq!(config.workflow.timeout_secs, 360);
    assert_eq!(config.model.chat_model, "gpt-4o-mini");
    assert_eq!(config.model.embedding_model, "text-embedding-3-small");
    assert_eq!(config.few_shot.top_k, 2);
    assert_eq!(config.few_shot.score_threshold, 0.5);
    assert_eq!(config.bind_address(), "0.0.0.0:8000");
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_json_keeps_other_defaults() {
    let config: ServiceConfig =
      serde_json::from_str(r#"{"server": {"port": 9000}, "workflow": {"timeout_secs": 30}}"#)
        .unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.workflow.timeout_secs, 30);
    assert_eq!(config.orders, OrdersConfig::default());
  }

  #[test]
  fn test_threshold_out_of_range_is_rejected() {
    let mut config = ServiceConfig::default();
    config.few_shot.score_threshold = 1.5;

    let err = config.validate().unwrap_err();
    assert!(matches!(
      err,
      ConfigError::Invalid {
        field: "few_shot.score_threshold",
        ..
      }
    ));
  }

  #[test]
  fn test_zero_limits_are_rejected() {
    let mut config = ServiceConfig::default();
    config.workflow.timeout_secs = 0;
    assert!(config.validate().is_err());

    let mut config = ServiceConfig::default();
    config.few_shot.top_k = 0;
    assert!(config.validate().is_err());

    let mut config = ServiceConfig::default();
    config.server.port = 0;
    assert!(config.validate().is_err());
  }
}
