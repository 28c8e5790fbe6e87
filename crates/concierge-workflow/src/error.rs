//! Workflow error types.

use crate::event::EventKind;

/// Boxed cause of a failed step.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building a dispatcher or driving a run.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
  /// The registered steps do not form a routable graph.
  #[error("invalid step graph: {message}")]
  InvalidGraph { message: String },

  /// The run was started with an event of the wrong kind.
  #[error("run must start with a '{expected}' event, got '{actual}'")]
  UnexpectedStart {
    expected: EventKind,
    actual: EventKind,
  },

  /// A step emitted an event kind no step consumes.
  #[error("no step accepts '{kind}' events (emitted by '{source_step}')")]
  Unroutable {
    kind: EventKind,
    source_step: String,
  },

  /// A join step declared inputs it cannot receive.
  #[error("join misuse in step '{step}': {message}")]
  JoinMisuse { step: String, message: String },

  /// A step invocation failed.
  #[error("step '{step}' failed: {source}")]
  StepFailed {
    step: String,
    #[source]
    source: BoxError,
  },

  /// A step invocation panicked.
  #[error("step '{step}' panicked: {message}")]
  StepPanicked { step: String, message: String },

  /// The run ended while a step was waiting on a context key.
  #[error("run ended while waiting for context key '{key}'")]
  ContextClosed { key: String },

  /// A context value could not be converted to or from the requested type.
  #[error("invalid value for context key '{key}': {message}")]
  ContextValue { key: String, message: String },

  /// The stream channel was closed or its consumer disconnected.
  #[error("stream channel closed")]
  StreamClosed,

  /// The run did not reach a stop event before its deadline.
  #[error("run timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// The run was cancelled by its caller.
  #[error("run cancelled")]
  Cancelled,

  /// The run driver stopped without reporting a result.
  #[error("run driver stopped without a result")]
  DriverLost,
}

impl WorkflowError {
  pub(crate) fn invalid_graph(message: impl Into<String>) -> Self {
    Self::InvalidGraph {
      message: message.into(),
    }
  }

  pub(crate) fn step_failed(step: impl Into<String>, source: anyhow::Error) -> Self {
    Self::StepFailed {
      step: step.into(),
      source: source.into(),
    }
  }

  /// Whether the run ended because its deadline elapsed.
  pub fn is_timeout(&self) -> bool {
    matches!(self, Self::Timeout { .. })
  }
}
