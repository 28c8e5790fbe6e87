//! End-to-end runs of the support pipeline against fake capabilities.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use concierge_llm::Message;
use concierge_support::{
  Capabilities, ChatData, ChatDataError, CompletionModel, DEFAULT_SCORE_THRESHOLD, ExampleRetriever,
  ExtractedQuery, OrderLookup, QueryExtractor, ScoredExample, SupportEvent, TokenStream, start_event,
  support_workflow,
};
use concierge_workflow::{StopResult, WorkflowError};
use futures::StreamExt;
use serde_json::{Value, json};

const TIMEOUT: Duration = Duration::from_secs(10);

struct FakeExtractor {
  order_id: Option<i64>,
  seen: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl QueryExtractor for FakeExtractor {
  async fn extract(&self, chat_history: &str, last_message: &str) -> anyhow::Result<ExtractedQuery> {
    self
      .seen
      .lock()
      .unwrap()
      .push((chat_history.to_string(), last_message.to_string()));
    Ok(ExtractedQuery {
      standalone_query: last_message.to_string(),
      order_id: self.order_id,
    })
  }
}

#[derive(Default)]
struct FakeOrders {
  records: HashMap<i64, Value>,
  lookups: AtomicUsize,
}

impl OrderLookup for FakeOrders {
  fn lookup(&self, order_id: i64) -> anyhow::Result<Option<Value>> {
    self.lookups.fetch_add(1, Ordering::SeqCst);
    Ok(self.records.get(&order_id).cloned())
  }
}

struct FixedExamples(Vec<ScoredExample>);

#[async_trait]
impl ExampleRetriever for FixedExamples {
  async fn retrieve(&self, _query: &str) -> anyhow::Result<Vec<ScoredExample>> {
    Ok(self.0.clone())
  }
}

enum Reply {
  Tokens(Vec<&'static str>),
  FailAfter(Vec<&'static str>),
  Hang(Vec<&'static str>),
}

struct RecordingModel {
  reply: Reply,
  prompts: Mutex<Vec<String>>,
}

impl RecordingModel {
  fn new(reply: Reply) -> Self {
    Self {
      reply,
      prompts: Mutex::new(Vec::new()),
    }
  }

  fn prompt(&self) -> String {
    self.prompts.lock().unwrap().first().cloned().unwrap()
  }
}

fn oks(tokens: &[&'static str]) -> Vec<anyhow::Result<String>> {
  tokens.iter().map(|t| Ok(t.to_string())).collect()
}

#[async_trait]
impl CompletionModel for RecordingModel {
  async fn stream(&self, prompt: &str) -> anyhow::Result<TokenStream> {
    self.prompts.lock().unwrap().push(prompt.to_string());
    let stream: TokenStream = match &self.reply {
      Reply::Tokens(tokens) => Box::pin(futures::stream::iter(oks(tokens))),
      Reply::FailAfter(tokens) => Box::pin(
        futures::stream::iter(oks(tokens))
          .chain(futures::stream::iter(vec![Err(anyhow!("model went away"))])),
      ),
      Reply::Hang(tokens) => {
        Box::pin(futures::stream::iter(oks(tokens)).chain(futures::stream::pending()))
      }
    };
    Ok(stream)
  }
}

struct Fixture {
  extractor: Arc<FakeExtractor>,
  orders: Arc<FakeOrders>,
  model: Arc<RecordingModel>,
  examples: Vec<ScoredExample>,
}

impl Fixture {
  fn new(order_id: Option<i64>, reply: Reply) -> Self {
    let mut records = HashMap::new();
    records.insert(123, json!({"order_number": 123, "status": "shipped"}));

    Self {
      extractor: Arc::new(FakeExtractor {
        order_id,
        seen: Mutex::new(Vec::new()),
      }),
      orders: Arc::new(FakeOrders {
        records,
        ..Default::default()
      }),
      model: Arc::new(RecordingModel::new(reply)),
      examples: Vec::new(),
    }
  }

  fn with_examples(mut self, examples: Vec<ScoredExample>) -> Self {
    self.examples = examples;
    self
  }

  fn capabilities(&self) -> Capabilities {
    Capabilities {
      extractor: self.extractor.clone(),
      orders: self.orders.clone(),
      examples: Arc::new(FixedExamples(self.examples.clone())),
      model: self.model.clone(),
      score_threshold: DEFAULT_SCORE_THRESHOLD,
    }
  }
}

fn chat(messages: Vec<Message>) -> SupportEvent {
  start_event(&ChatData::new(messages)).unwrap()
}

fn response(result: &StopResult) -> &str {
  result["response"].as_str().unwrap()
}

async fn collect_tokens(handle: &mut concierge_workflow::RunHandle) -> Vec<String> {
  let stream = handle.take_stream().unwrap();
  stream.map(|t| t.token).collect().await
}

#[tokio::test]
async fn test_order_question_streams_answer_with_order_data() {
  let fixture = Fixture::new(Some(123), Reply::Tokens(vec!["Your ", "order ", "shipped."]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let mut handle = dispatcher
    .start(
      chat(vec![Message::user("What's the status of order 123?")]),
      TIMEOUT,
    )
    .unwrap();

  let tokens = collect_tokens(&mut handle).await;
  let result = handle.wait().await.unwrap();

  assert_eq!(tokens, vec!["Your ", "order ", "shipped."]);
  assert_eq!(response(&result), "done");
  assert_eq!(fixture.orders.lookups.load(Ordering::SeqCst), 1);

  let prompt = fixture.model.prompt();
  assert!(prompt.contains("Order details for order id 123:\n<data>\n"));
  assert!(prompt.contains("\"status\":\"shipped\""));
  assert!(prompt.contains("<query>\nWhat's the status of order 123?\n</query>"));
}

#[tokio::test]
async fn test_question_without_order_skips_fetch() {
  let fixture = Fixture::new(None, Reply::Tokens(vec!["We ship ", "worldwide."]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let mut handle = dispatcher
    .start(chat(vec![Message::user("Do you ship abroad?")]), TIMEOUT)
    .unwrap();

  let tokens = collect_tokens(&mut handle).await;
  let result = handle.wait().await.unwrap();

  assert_eq!(tokens.concat(), "We ship worldwide.");
  assert_eq!(response(&result), "done");
  assert_eq!(fixture.orders.lookups.load(Ordering::SeqCst), 0);
  assert!(!fixture.model.prompt().contains("Order details"));
}

#[tokio::test]
async fn test_unknown_order_is_reported_in_prompt() {
  let fixture = Fixture::new(Some(999), Reply::Tokens(vec!["Sorry."]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let handle = dispatcher
    .start(chat(vec![Message::user("Where is order 999?")]), TIMEOUT)
    .unwrap();
  let result = handle.wait().await.unwrap();

  assert_eq!(response(&result), "done");
  assert!(
    fixture
      .model
      .prompt()
      .contains("No order was found with id 999.")
  );
}

#[tokio::test]
async fn test_only_examples_above_threshold_reach_prompt() {
  let fixture = Fixture::new(None, Reply::Tokens(vec!["ok"])).with_examples(vec![
    ScoredExample {
      query: "How do I return a lamp?".to_string(),
      response: "Use the returns portal.".to_string(),
      score: 0.9,
    },
    ScoredExample {
      query: "What is your phone number?".to_string(),
      response: "We only offer chat support.".to_string(),
      score: 0.3,
    },
  ]);
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let handle = dispatcher
    .start(chat(vec![Message::user("How can I return a chair?")]), TIMEOUT)
    .unwrap();
  handle.wait().await.unwrap();

  let prompt = fixture.model.prompt();
  assert!(prompt.contains("Below are some examples of the structure of your response:\n"));
  assert!(prompt.contains("Query: How do I return a lamp?\nResponse: Use the returns portal."));
  assert!(!prompt.contains("What is your phone number?"));
}

#[tokio::test]
async fn test_history_excludes_last_message() {
  let fixture = Fixture::new(None, Reply::Tokens(vec!["ok"]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let handle = dispatcher
    .start(
      chat(vec![
        Message::user("Hi"),
        Message::assistant("Hello! How can I help?"),
        Message::user("Is order 5 late?"),
      ]),
      TIMEOUT,
    )
    .unwrap();
  handle.wait().await.unwrap();

  let seen = fixture.extractor.seen.lock().unwrap().clone();
  assert_eq!(
    seen,
    vec![(
      "user: Hi\nassistant: Hello! How can I help?".to_string(),
      "Is order 5 late?".to_string()
    )]
  );
  assert!(
    fixture
      .model
      .prompt()
      .contains("---\nuser: Hi\nassistant: Hello! How can I help?\n---")
  );
}

#[tokio::test]
async fn test_model_failure_fails_run_after_partial_stream() {
  let fixture = Fixture::new(None, Reply::FailAfter(vec!["Partial"]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let mut handle = dispatcher
    .start(chat(vec![Message::user("Hello")]), TIMEOUT)
    .unwrap();

  let tokens = collect_tokens(&mut handle).await;
  let err = handle.wait().await.unwrap_err();

  assert_eq!(tokens, vec!["Partial"]);
  match err {
    WorkflowError::StepFailed { step, source } => {
      assert_eq!(step, "answer_query");
      assert!(source.to_string().contains("completion stream failed"));
    }
    other => panic!("expected StepFailed, got {:?}", other),
  }
}

#[tokio::test]
async fn test_consumer_disconnect_stops_with_cancelled() {
  let fixture = Fixture::new(None, Reply::Hang(vec!["first"]));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();

  let mut handle = dispatcher
    .start(chat(vec![Message::user("Tell me a story")]), TIMEOUT)
    .unwrap();
  let mut tokens = handle.take_stream().unwrap();

  assert_eq!(tokens.next().await.unwrap().token, "first");
  drop(tokens);

  let result = handle.wait().await.unwrap();
  assert_eq!(response(&result), "cancelled");
}

#[test]
fn test_start_event_rejects_empty_messages() {
  let err = start_event(&ChatData::new(Vec::new())).unwrap_err();
  assert_eq!(err, ChatDataError::EmptyMessages);
}

#[test]
fn test_graph_shows_both_flows() {
  let fixture = Fixture::new(None, Reply::Tokens(Vec::new()));
  let dispatcher = support_workflow(fixture.capabilities()).unwrap();
  let graph = dispatcher.graph();

  assert_eq!(graph.consumers(concierge_support::PROMPT_READY), vec!["answer_query"]);
  assert_eq!(
    graph.consumers(concierge_support::ORDER_DATA_FETCHED),
    vec!["answer_query"]
  );
  assert!(graph.node("answer_query").unwrap().is_join());

  let mermaid = graph.to_mermaid();
  assert!(mermaid.starts_with("flowchart TD"));
  assert!(mermaid.contains("OrderFetchRequested"));
  assert!(mermaid.contains("answer_query"));
}
