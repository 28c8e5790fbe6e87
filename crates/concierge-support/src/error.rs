use std::path::PathBuf;

/// Errors from the support pipeline's local resources.
#[derive(Debug, thiserror::Error)]
pub enum SupportError {
  /// A prompt template failed to render.
  #[error("failed to render prompt: {message}")]
  Template { message: String },

  /// A data file could not be read.
  #[error("failed to read '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// A data file has the wrong shape.
  #[error("invalid data in '{path}': {message}")]
  InvalidData { path: PathBuf, message: String },

  /// The few-shot index could not be built or queried.
  #[error("few-shot index error: {message}")]
  Index { message: String },
}

impl SupportError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn invalid(path: impl Into<PathBuf>, message: impl ToString) -> Self {
    Self::InvalidData {
      path: path.into(),
      message: message.to_string(),
    }
  }
}
