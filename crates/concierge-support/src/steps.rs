//! Pipeline steps.
//!
//! ```text
//! Start ──▶ extract_query ──┬──▶ ExtractedQuery ──▶ create_prompt ──▶ PromptReady ─┐
//!                           │                                                      ├──▶ answer_query ──▶ Stop
//!                           └──▶ OrderFetchRequested ──▶ fetch_order ──▶ OrderDataFetched ┘
//!                                (only with an order id)
//! ```

use std::sync::Arc;

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use concierge_workflow::{EventKind, Step, StepContext, WorkflowError};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::capability::{CompletionModel, ExtractedQuery, OrderLookup, QueryExtractor};
use crate::chat::render_history;
use crate::event::{
  EXTRACTED_QUERY, ExampleSlot, ORDER_DATA_FETCHED, ORDER_FETCH_REQUESTED, PROMPT_READY, START, STOP,
  SupportEvent,
};
use crate::prompt::{ANSWER_TEMPLATE, AnswerSlots, format_order, render};

/// Context store keys shared by the steps.
pub mod keys {
  /// The [`ExtractedQuery`](crate::ExtractedQuery) for this run.
  pub const STRUCTURED_QUERY: &str = "structuredQuery";
  /// Set to `true` only when an order id was extracted.
  pub const WAIT_FOR_DATA: &str = "waitForData";
  /// Formatted order record.
  pub const ORDER_TEXT: &str = "orderText";
  /// Rendered chat history, without the last message.
  pub const CHAT_HISTORY: &str = "chatHistory";
}

fn unexpected(step: &str, event: Option<&SupportEvent>) -> anyhow::Error {
  anyhow!("{} received unexpected input {:?}", step, event)
}

/// Rewrites the last message into a standalone query and decides whether an
/// order must be fetched.
pub struct ExtractQuery {
  extractor: Arc<dyn QueryExtractor>,
}

impl ExtractQuery {
  pub fn new(extractor: Arc<dyn QueryExtractor>) -> Self {
    Self { extractor }
  }
}

#[async_trait]
impl Step<SupportEvent> for ExtractQuery {
  fn name(&self) -> &str {
    "extract_query"
  }

  fn accepts(&self) -> Vec<EventKind> {
    vec![START]
  }

  fn emits(&self) -> Vec<EventKind> {
    vec![ORDER_FETCH_REQUESTED, EXTRACTED_QUERY]
  }

  async fn run(
    &self,
    ctx: StepContext<SupportEvent>,
    inputs: Vec<SupportEvent>,
  ) -> anyhow::Result<Vec<SupportEvent>> {
    let (last_message, chat_history) = match inputs.first() {
      Some(SupportEvent::Start {
        last_message,
        chat_history,
      }) => (last_message, render_history(chat_history)),
      other => return Err(unexpected(self.name(), other)),
    };

    let query = self
      .extractor
      .extract(&chat_history, last_message)
      .await
      .context("query extraction failed")?;

    info!(
      run_id = %ctx.run_id(),
      standalone_query = %query.standalone_query,
      order_id = ?query.order_id,
      "query_extracted"
    );

    let store = ctx.store();
    store.set(keys::CHAT_HISTORY, chat_history);
    store.set_json(keys::STRUCTURED_QUERY, &query)?;

    if query.order_id.is_some() {
      store.set(keys::WAIT_FOR_DATA, true);
      ctx.send_event(SupportEvent::OrderFetchRequested {
        query: query.clone(),
      });
    }

    Ok(vec![SupportEvent::ExtractedQuery(query)])
  }
}

/// Looks up the requested order and formats it for the prompt.
pub struct FetchOrder {
  orders: Arc<dyn OrderLookup>,
}

impl FetchOrder {
  pub fn new(orders: Arc<dyn OrderLookup>) -> Self {
    Self { orders }
  }
}

#[async_trait]
impl Step<SupportEvent> for FetchOrder {
  fn name(&self) -> &str {
    "fetch_order"
  }

  fn accepts(&self) -> Vec<EventKind> {
    vec![ORDER_FETCH_REQUESTED]
  }

  fn emits(&self) -> Vec<EventKind> {
    vec![ORDER_DATA_FETCHED]
  }

  async fn run(
    &self,
    ctx: StepContext<SupportEvent>,
    inputs: Vec<SupportEvent>,
  ) -> anyhow::Result<Vec<SupportEvent>> {
    let order_id = match inputs.first() {
      Some(SupportEvent::OrderFetchRequested {
        query: ExtractedQuery {
          order_id: Some(order_id),
          ..
        },
      }) => *order_id,
      other => return Err(unexpected(self.name(), other)),
    };

    let record = self
      .orders
      .lookup(order_id)
      .with_context(|| format!("order lookup failed for {}", order_id))?;
    if record.is_none() {
      warn!(run_id = %ctx.run_id(), order_id, "order_not_found");
    }

    let text = format_order(order_id, record.as_ref());
    ctx.store().set(keys::ORDER_TEXT, text.clone());

    Ok(vec![SupportEvent::OrderDataFetched { text }])
  }
}

/// Hands the answer template and the examples slot to the answer step.
pub struct CreatePrompt {
  examples: ExampleSlot,
}

impl CreatePrompt {
  pub fn new(examples: ExampleSlot) -> Self {
    Self { examples }
  }
}

#[async_trait]
impl Step<SupportEvent> for CreatePrompt {
  fn name(&self) -> &str {
    "create_prompt"
  }

  fn accepts(&self) -> Vec<EventKind> {
    vec![EXTRACTED_QUERY]
  }

  fn emits(&self) -> Vec<EventKind> {
    vec![PROMPT_READY]
  }

  async fn run(
    &self,
    _ctx: StepContext<SupportEvent>,
    inputs: Vec<SupportEvent>,
  ) -> anyhow::Result<Vec<SupportEvent>> {
    match inputs.first() {
      Some(SupportEvent::ExtractedQuery(_)) => Ok(vec![SupportEvent::PromptReady {
        template: ANSWER_TEMPLATE.to_string(),
        examples: self.examples.clone(),
      }]),
      other => Err(unexpected(self.name(), other)),
    }
  }
}

/// Joins the prompt with the order data (when an order was requested) and
/// streams the model's answer.
pub struct AnswerQuery {
  model: Arc<dyn CompletionModel>,
}

impl AnswerQuery {
  pub fn new(model: Arc<dyn CompletionModel>) -> Self {
    Self { model }
  }
}

#[async_trait]
impl Step<SupportEvent> for AnswerQuery {
  fn name(&self) -> &str {
    "answer_query"
  }

  fn accepts(&self) -> Vec<EventKind> {
    vec![PROMPT_READY, ORDER_DATA_FETCHED]
  }

  fn emits(&self) -> Vec<EventKind> {
    vec![STOP]
  }

  async fn required_inputs(&self, ctx: &StepContext<SupportEvent>) -> anyhow::Result<Vec<EventKind>> {
    let wait_for_data: bool = ctx.store().get_as_or(keys::WAIT_FOR_DATA, false)?;
    Ok(if wait_for_data {
      vec![PROMPT_READY, ORDER_DATA_FETCHED]
    } else {
      vec![PROMPT_READY]
    })
  }

  async fn run(
    &self,
    ctx: StepContext<SupportEvent>,
    inputs: Vec<SupportEvent>,
  ) -> anyhow::Result<Vec<SupportEvent>> {
    let (template, examples) = match inputs.first() {
      Some(SupportEvent::PromptReady { template, examples }) => (template, examples),
      other => return Err(unexpected(self.name(), other)),
    };
    let data = match inputs.get(1) {
      Some(SupportEvent::OrderDataFetched { text }) => text.clone(),
      Some(other) => return Err(unexpected(self.name(), Some(other))),
      None => String::new(),
    };

    let store = ctx.store();
    let query: ExtractedQuery = store.get_as(keys::STRUCTURED_QUERY).await?;
    let chat_history: String = store.get_as_or(keys::CHAT_HISTORY, String::new())?;

    let examples = examples
      .resolve(&query.standalone_query)
      .await
      .context("few-shot retrieval failed")?;
    debug!(run_id = %ctx.run_id(), has_examples = !examples.is_empty(), "examples_resolved");

    let prompt = render(
      template,
      &AnswerSlots {
        chat_history,
        query: query.standalone_query.clone(),
        data,
        examples,
      },
    )?;

    let mut tokens = self.model.stream(&prompt).await?;
    let mut written = 0usize;

    loop {
      let next = tokio::select! {
        _ = ctx.cancelled() => None,
        next = tokens.next() => Some(next),
      };

      let token = match next {
        // Consumer gone or run over.
        None => break,
        Some(None) => {
          info!(run_id = %ctx.run_id(), tokens = written, "answer_streamed");
          return Ok(vec![SupportEvent::stop("done")]);
        }
        Some(Some(token)) => token.context("completion stream failed")?,
      };

      match ctx.write_to_stream(token) {
        Ok(()) => written += 1,
        Err(WorkflowError::StreamClosed) => break,
        Err(e) => return Err(e.into()),
      }
    }

    warn!(run_id = %ctx.run_id(), tokens = written, "answer_cancelled");
    Ok(vec![SupportEvent::stop("cancelled")])
  }
}
