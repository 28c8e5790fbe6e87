//! Steps and the per-invocation context handed to them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::ContextStore;
use crate::dispatcher::Dispatch;
use crate::error::WorkflowError;
use crate::event::{EventKind, StreamToken, WorkflowEvent};
use crate::stream::StreamWriter;

/// A unit of work bound to the event kinds it accepts.
///
/// A step accepting one kind runs once per routed event. A step accepting
/// several kinds is a join step: it runs once per run, after one event of
/// each kind in [`Step::required_inputs`] has arrived.
#[async_trait]
pub trait Step<E: WorkflowEvent>: Send + Sync {
  /// Unique name within a dispatcher.
  fn name(&self) -> &str;

  /// Kinds routed to this step.
  fn accepts(&self) -> Vec<EventKind>;

  /// Kinds this step may produce, used to validate and draw the graph.
  fn emits(&self) -> Vec<EventKind>;

  /// The inputs a join step needs in this run.
  ///
  /// Evaluated on the first event routed to the step; must be a subset of
  /// [`Step::accepts`].
  async fn required_inputs(&self, _ctx: &StepContext<E>) -> anyhow::Result<Vec<EventKind>> {
    Ok(self.accepts())
  }

  /// Execute the step. `inputs` holds the routed event, or the joined events
  /// in required order. Returned events are routed in order.
  async fn run(&self, ctx: StepContext<E>, inputs: Vec<E>) -> anyhow::Result<Vec<E>>;
}

/// Handle given to a step invocation.
#[derive(Clone)]
pub struct StepContext<E: WorkflowEvent> {
  run_id: String,
  step: String,
  store: Arc<ContextStore>,
  queue: mpsc::UnboundedSender<Dispatch<E>>,
  stream: StreamWriter,
  cancel: CancellationToken,
}

impl<E: WorkflowEvent> StepContext<E> {
  pub(crate) fn new(
    run_id: String,
    step: String,
    store: Arc<ContextStore>,
    queue: mpsc::UnboundedSender<Dispatch<E>>,
    stream: StreamWriter,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      run_id,
      step,
      store,
      queue,
      stream,
      cancel,
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn step_name(&self) -> &str {
    &self.step
  }

  /// The run's shared key/value store.
  pub fn store(&self) -> &ContextStore {
    &self.store
  }

  /// Emit an event before the step returns.
  ///
  /// Events sent this way are routed ahead of the step's returned events.
  /// After the run has ended they are discarded.
  pub fn send_event(&self, event: E) {
    let _ = self.queue.send(Dispatch::Event {
      event,
      source: Some(self.step.clone()),
    });
  }

  /// Push a token to the caller.
  pub fn write_to_stream(&self, token: impl Into<StreamToken>) -> Result<(), WorkflowError> {
    self.stream.write(token)
  }

  /// Whether the run ended or the stream consumer went away.
  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled() || self.stream.is_disconnected()
  }

  /// Resolves once [`StepContext::is_cancelled`] would return true.
  pub async fn cancelled(&self) {
    tokio::select! {
      _ = self.cancel.cancelled() => {}
      _ = self.stream.disconnected() => {}
    }
  }
}
