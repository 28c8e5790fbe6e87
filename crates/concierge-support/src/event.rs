use std::fmt;
use std::sync::Arc;

use concierge_llm::Message;
use concierge_workflow::{EventKind, StopResult, WorkflowEvent};

use crate::capability::{ExampleRetriever, ExtractedQuery};
use crate::prompt::format_examples;

pub const START: EventKind = EventKind::new("Start");
pub const EXTRACTED_QUERY: EventKind = EventKind::new("ExtractedQuery");
pub const ORDER_FETCH_REQUESTED: EventKind = EventKind::new("OrderFetchRequested");
pub const ORDER_DATA_FETCHED: EventKind = EventKind::new("OrderDataFetched");
pub const PROMPT_READY: EventKind = EventKind::new("PromptReady");
pub const STOP: EventKind = EventKind::new("Stop");

/// Events of the customer-support pipeline.
#[derive(Debug, Clone)]
pub enum SupportEvent {
  Start {
    last_message: String,
    chat_history: Vec<Message>,
  },
  ExtractedQuery(ExtractedQuery),
  OrderFetchRequested {
    query: ExtractedQuery,
  },
  OrderDataFetched {
    text: String,
  },
  PromptReady {
    template: String,
    examples: ExampleSlot,
  },
  Stop {
    result: StopResult,
  },
}

impl SupportEvent {
  pub fn stop(response: &str) -> Self {
    let mut result = StopResult::new();
    result.insert("response".to_string(), serde_json::Value::from(response));
    SupportEvent::Stop { result }
  }
}

impl WorkflowEvent for SupportEvent {
  fn kind(&self) -> EventKind {
    match self {
      SupportEvent::Start { .. } => START,
      SupportEvent::ExtractedQuery(_) => EXTRACTED_QUERY,
      SupportEvent::OrderFetchRequested { .. } => ORDER_FETCH_REQUESTED,
      SupportEvent::OrderDataFetched { .. } => ORDER_DATA_FETCHED,
      SupportEvent::PromptReady { .. } => PROMPT_READY,
      SupportEvent::Stop { .. } => STOP,
    }
  }

  fn stop_result(&self) -> Option<StopResult> {
    match self {
      SupportEvent::Stop { result } => Some(result.clone()),
      _ => None,
    }
  }
}

/// Fills the prompt's examples slot for a given query.
///
/// Carried by `PromptReady` so the answer step resolves examples against the
/// final standalone query.
#[derive(Clone)]
pub struct ExampleSlot {
  retriever: Arc<dyn ExampleRetriever>,
  threshold: f32,
}

impl ExampleSlot {
  /// Only examples scoring strictly above `threshold` are used.
  pub fn new(retriever: Arc<dyn ExampleRetriever>, threshold: f32) -> Self {
    Self {
      retriever,
      threshold,
    }
  }

  /// Retrieve, filter and format examples. Empty when none qualify.
  pub async fn resolve(&self, query: &str) -> anyhow::Result<String> {
    let examples = self.retriever.retrieve(query).await?;
    Ok(format_examples(&examples, self.threshold))
  }
}

impl fmt::Debug for ExampleSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExampleSlot")
      .field("threshold", &self.threshold)
      .finish_non_exhaustive()
  }
}
