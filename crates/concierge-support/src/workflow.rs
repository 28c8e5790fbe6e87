//! Pipeline assembly.

use std::sync::Arc;

use anyhow::Context as _;
use concierge_config::ServiceConfig;
use concierge_llm::OpenAi;
use concierge_workflow::{Dispatcher, WorkflowError};
use tracing::info;

use crate::capability::{CompletionModel, Embedder, ExampleRetriever, OrderLookup, QueryExtractor};
use crate::chat::{ChatData, ChatDataError};
use crate::event::{ExampleSlot, START, STOP, SupportEvent};
use crate::few_shot::{EmbeddingRetriever, FewShotIndex};
use crate::orders::JsonOrderBook;
use crate::steps::{AnswerQuery, CreatePrompt, ExtractQuery, FetchOrder};

/// Score an example must exceed to be spliced into the prompt.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Everything the pipeline steps call out to.
#[derive(Clone)]
pub struct Capabilities {
  pub extractor: Arc<dyn QueryExtractor>,
  pub orders: Arc<dyn OrderLookup>,
  pub examples: Arc<dyn ExampleRetriever>,
  pub model: Arc<dyn CompletionModel>,
  pub score_threshold: f32,
}

impl Capabilities {
  /// Wire the OpenAI client, the order book and the few-shot index from
  /// configuration. Builds the example index if no valid cache exists.
  pub async fn from_config(config: &ServiceConfig, client: OpenAi) -> anyhow::Result<Self> {
    let orders = JsonOrderBook::load(&config.orders.database_path)?;

    let client = Arc::new(client);
    let embedder: Arc<dyn Embedder> = client.clone();
    let index = FewShotIndex::load_or_build(
      &config.few_shot.dataset_path,
      &config.few_shot.index_dir,
      embedder.as_ref(),
    )
    .await
    .context("failed to prepare few-shot index")?;

    info!(
      orders = orders.len(),
      examples = index.len(),
      model = %client.model(),
      "capabilities_ready"
    );

    Ok(Self {
      extractor: client.clone(),
      orders: Arc::new(orders),
      examples: Arc::new(EmbeddingRetriever::new(
        Arc::new(index),
        embedder,
        config.few_shot.top_k,
      )),
      model: client,
      score_threshold: config.few_shot.score_threshold,
    })
  }
}

/// Build and validate the customer-support dispatcher.
pub fn support_workflow(capabilities: Capabilities) -> Result<Dispatcher<SupportEvent>, WorkflowError> {
  let Capabilities {
    extractor,
    orders,
    examples,
    model,
    score_threshold,
  } = capabilities;

  Dispatcher::builder(START, STOP)
    .register(ExtractQuery::new(extractor))
    .register(FetchOrder::new(orders))
    .register(CreatePrompt::new(ExampleSlot::new(examples, score_threshold)))
    .register(AnswerQuery::new(model))
    .build()
}

/// The `Start` event for a chat request.
pub fn start_event(chat: &ChatData) -> Result<SupportEvent, ChatDataError> {
  chat.validate()?;
  Ok(SupportEvent::Start {
    last_message: chat.last_message_content()?.to_string(),
    chat_history: chat.history().to_vec(),
  })
}
