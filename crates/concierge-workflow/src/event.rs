//! Event primitives shared by every workflow.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Routing discriminant of an event.
///
/// Steps declare the kinds they accept and emit; the dispatcher routes on
/// kinds only, never on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(&'static str);

impl EventKind {
  pub const fn new(name: &'static str) -> Self {
    Self(name)
  }

  pub fn as_str(&self) -> &'static str {
    self.0
  }
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.0)
  }
}

/// Result carried by the event that terminates a run.
pub type StopResult = serde_json::Map<String, serde_json::Value>;

/// An immutable message routed between steps.
///
/// Implemented by the workflow's event enum. Each consumer receives its own
/// clone of the event.
pub trait WorkflowEvent: Clone + fmt::Debug + Send + Sync + 'static {
  /// The kind used for routing.
  fn kind(&self) -> EventKind;

  /// Returns the run result when this event terminates the run.
  fn stop_result(&self) -> Option<StopResult> {
    None
  }
}

/// A token written to a run's stream channel.
///
/// Tokens are a side channel: they are never routed to steps or joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToken {
  pub token: String,
}

impl StreamToken {
  pub fn new(token: impl Into<String>) -> Self {
    Self {
      token: token.into(),
    }
  }
}

impl From<String> for StreamToken {
  fn from(token: String) -> Self {
    Self { token }
  }
}

impl From<&str> for StreamToken {
  fn from(token: &str) -> Self {
    Self::new(token)
  }
}
