//! Event dispatcher.
//!
//! The [`Dispatcher`] owns the registered steps and their validated
//! [`StepGraph`]. `start(event, timeout)` spawns one driver task per run that
//! pops events off the run's queue and spawns one task per matching step.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::context::ContextStore;
use crate::error::WorkflowError;
use crate::event::{EventKind, StopResult, WorkflowEvent};
use crate::graph::{StepGraph, StepNode};
use crate::handle::{RunHandle, RunResult};
use crate::join::JoinBuffer;
use crate::step::{Step, StepContext};
use crate::stream::{self, StreamWriter};

/// Item on a run's pending queue.
pub(crate) enum Dispatch<E> {
  /// An event to route. `source` is the emitting step, `None` for the start event.
  Event { event: E, source: Option<String> },
  /// A step invocation failed; the run fails with `error`.
  Failed { step: String, error: WorkflowError },
}

/// Collects step registrations before validation.
pub struct DispatcherBuilder<E: WorkflowEvent> {
  start: EventKind,
  stop: EventKind,
  steps: Vec<Arc<dyn Step<E>>>,
}

impl<E: WorkflowEvent> DispatcherBuilder<E> {
  /// Register a step under the kinds it accepts.
  pub fn register<S: Step<E> + 'static>(self, step: S) -> Self {
    self.register_arc(Arc::new(step))
  }

  pub fn register_arc(mut self, step: Arc<dyn Step<E>>) -> Self {
    self.steps.push(step);
    self
  }

  /// Validate the registrations and build the dispatcher.
  pub fn build(self) -> Result<Dispatcher<E>, WorkflowError> {
    let nodes = self
      .steps
      .iter()
      .map(|step| StepNode {
        name: step.name().to_string(),
        accepts: step.accepts(),
        emits: step.emits(),
      })
      .collect();
    let graph = StepGraph::new(self.start, self.stop, nodes);
    graph.validate()?;

    Ok(Dispatcher {
      inner: Arc::new(Inner {
        steps: self.steps,
        graph,
      }),
    })
  }
}

struct Inner<E: WorkflowEvent> {
  /// Same order as `graph.nodes()`.
  steps: Vec<Arc<dyn Step<E>>>,
  graph: StepGraph,
}

/// Routes events between registered steps. Cheap to clone.
pub struct Dispatcher<E: WorkflowEvent> {
  inner: Arc<Inner<E>>,
}

impl<E: WorkflowEvent> Clone for Dispatcher<E> {
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<E: WorkflowEvent> Dispatcher<E> {
  /// Start registering steps for a workflow bounded by `start` and `stop` kinds.
  pub fn builder(start: EventKind, stop: EventKind) -> DispatcherBuilder<E> {
    DispatcherBuilder {
      start,
      stop,
      steps: Vec::new(),
    }
  }

  pub fn graph(&self) -> &StepGraph {
    &self.inner.graph
  }

  /// Begin a run seeded with `event`.
  ///
  /// Each run gets a fresh context store, join buffer and stream channel.
  /// The run fails with [`WorkflowError::Timeout`] if no stop event is
  /// processed within `timeout`. Must be called within a Tokio runtime.
  pub fn start(&self, event: E, timeout: Duration) -> Result<RunHandle, WorkflowError> {
    let start = self.inner.graph.start_kind();
    if event.kind() != start {
      return Err(WorkflowError::UnexpectedStart {
        expected: start,
        actual: event.kind(),
      });
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let cancel = CancellationToken::new();
    let (writer, tokens) = stream::channel();
    let (queue, pending) = mpsc::unbounded_channel();
    let (outcome_tx, outcome_rx) = oneshot::channel();

    let run = Arc::new(RunState {
      run_id: run_id.clone(),
      inner: self.inner.clone(),
      store: Arc::new(ContextStore::new(cancel.clone())),
      joins: JoinBuffer::new(),
      stream: writer,
      cancel: cancel.clone(),
      queue,
    });

    info!(
      run_id = %run_id,
      start_kind = %start,
      timeout_ms = millis(timeout),
      "run_started"
    );

    let _ = run.queue.send(Dispatch::Event {
      event,
      source: None,
    });

    let span = info_span!("workflow_run", run_id = %run_id);
    tokio::spawn(
      async move {
        let result = run.drive(pending, timeout).await;
        let _ = outcome_tx.send(result);
      }
      .instrument(span),
    );

    Ok(RunHandle::new(run_id, tokens, outcome_rx, cancel))
  }
}

/// State shared by a run's driver and its step invocations.
struct RunState<E: WorkflowEvent> {
  run_id: String,
  inner: Arc<Inner<E>>,
  store: Arc<ContextStore>,
  joins: JoinBuffer<E>,
  stream: StreamWriter,
  cancel: CancellationToken,
  queue: mpsc::UnboundedSender<Dispatch<E>>,
}

impl<E: WorkflowEvent> RunState<E> {
  async fn drive(
    self: &Arc<Self>,
    mut pending: mpsc::UnboundedReceiver<Dispatch<E>>,
    timeout: Duration,
  ) -> RunResult {
    // Too far out to represent means no deadline.
    let deadline = Instant::now().checked_add(timeout);
    let stop = self.inner.graph.stop_kind();

    let result = loop {
      let next = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => break Err(WorkflowError::Cancelled),
        _ = sleep_until(deadline) => {
          break Err(WorkflowError::Timeout {
            timeout_ms: millis(timeout),
          });
        }
        next = pending.recv() => next,
      };

      match next {
        Some(Dispatch::Event { event, source }) => {
          if let Some(result) = event.stop_result() {
            break Ok(result);
          }
          if event.kind() == stop {
            break Ok(StopResult::new());
          }
          if let Err(e) = self.route(event, source) {
            break Err(e);
          }
        }
        Some(Dispatch::Failed { step, error }) => {
          debug!(run_id = %self.run_id, step = %step, "step failure received");
          break Err(error);
        }
        None => break Err(WorkflowError::DriverLost),
      }
    };

    // Closing first lets the reader drain buffered tokens; cancelling wakes
    // blocked context reads and tells in-flight steps the run is over.
    self.stream.close();
    self.cancel.cancel();

    match &result {
      Ok(stop_result) => {
        info!(
          run_id = %self.run_id,
          result = %serde_json::Value::Object(stop_result.clone()),
          "run_completed"
        );
      }
      Err(WorkflowError::Timeout { timeout_ms }) => {
        warn!(run_id = %self.run_id, timeout_ms = *timeout_ms, "run_timed_out");
      }
      Err(WorkflowError::Cancelled) => {
        warn!(run_id = %self.run_id, "run_cancelled");
      }
      Err(e) => {
        error!(run_id = %self.run_id, error = %e, "run_failed");
      }
    }

    result
  }

  /// Spawn one invocation per step accepting `event`.
  fn route(self: &Arc<Self>, event: E, source: Option<String>) -> Result<(), WorkflowError> {
    let kind = event.kind();
    let consumers = self.inner.graph.consumer_indices(kind);
    if consumers.is_empty() {
      return Err(WorkflowError::Unroutable {
        kind,
        source_step: source.unwrap_or_else(|| "<start>".to_string()),
      });
    }

    debug!(
      run_id = %self.run_id,
      kind = %kind,
      source = ?source,
      consumers = ?self.inner.graph.consumers(kind),
      "event_routed"
    );

    for &index in consumers {
      let run = self.clone();
      let event = event.clone();
      tokio::spawn(async move {
        let invocation = AssertUnwindSafe(run.clone().invoke(index, event));
        if let Err(panic) = invocation.catch_unwind().await {
          let step = run.inner.graph.nodes()[index].name.clone();
          let message = panic_message(panic.as_ref());
          error!(run_id = %run.run_id, step = %step, panic = %message, "step_panicked");
          run.fail(step.clone(), WorkflowError::StepPanicked { step, message });
        }
      });
    }

    Ok(())
  }

  #[instrument(
    name = "step_invoke",
    skip(self, event),
    fields(
      run_id = %self.run_id,
      step = %self.inner.graph.nodes()[index].name,
    )
  )]
  async fn invoke(self: Arc<Self>, index: usize, event: E) {
    if self.cancel.is_cancelled() {
      return;
    }

    let step = self.inner.steps[index].clone();
    let node = &self.inner.graph.nodes()[index];
    let name = node.name.clone();
    let ctx = StepContext::new(
      self.run_id.clone(),
      name.clone(),
      self.store.clone(),
      self.queue.clone(),
      self.stream.clone(),
      self.cancel.clone(),
    );

    let inputs = if node.is_join() {
      match self.join(step.as_ref(), node, &ctx, event).await {
        Ok(Some(inputs)) => inputs,
        Ok(None) => return,
        Err(error) => {
          self.fail(name, error);
          return;
        }
      }
    } else {
      vec![event]
    };

    let kinds: Vec<&str> = inputs.iter().map(|e| e.kind().as_str()).collect();
    info!(run_id = %self.run_id, step = %name, inputs = ?kinds, "step_started");

    match step.run(ctx, inputs).await {
      Ok(events) => {
        info!(
          run_id = %self.run_id,
          step = %name,
          emitted = events.len(),
          "step_completed"
        );
        for event in events {
          let _ = self.queue.send(Dispatch::Event {
            event,
            source: Some(name.clone()),
          });
        }
      }
      Err(e) => {
        let error = WorkflowError::step_failed(name.clone(), e);
        error!(run_id = %self.run_id, step = %name, error = %error, "step_failed");
        self.fail(name, error);
      }
    }
  }

  /// Offer `event` to the step's join; returns the input set once complete.
  async fn join(
    &self,
    step: &dyn Step<E>,
    node: &StepNode,
    ctx: &StepContext<E>,
    event: E,
  ) -> Result<Option<Vec<E>>, WorkflowError> {
    if !self.joins.is_declared(&node.name) {
      let required = step
        .required_inputs(ctx)
        .await
        .map_err(|e| WorkflowError::step_failed(node.name.clone(), e))?;

      if required.is_empty() {
        return Err(WorkflowError::JoinMisuse {
          step: node.name.clone(),
          message: "required input set is empty".to_string(),
        });
      }
      if let Some(kind) = required.iter().find(|k| !node.accepts.contains(k)) {
        return Err(WorkflowError::JoinMisuse {
          step: node.name.clone(),
          message: format!("requires '{}' which the step does not accept", kind),
        });
      }

      debug!(run_id = %self.run_id, step = %node.name, required = ?required, "join_declared");
      self.joins.require(&node.name, required);
    }

    let kind = event.kind();
    let inputs = self.joins.offer(&node.name, event)?;
    if inputs.is_none() {
      debug!(run_id = %self.run_id, step = %node.name, kind = %kind, "join_waiting");
    }
    Ok(inputs)
  }

  fn fail(&self, step: String, error: WorkflowError) {
    let _ = self.queue.send(Dispatch::Failed { step, error });
  }
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}

fn millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
  if let Some(message) = panic.downcast_ref::<&str>() {
    message.to_string()
  } else if let Some(message) = panic.downcast_ref::<String>() {
    message.clone()
  } else {
    "unknown panic payload".to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_millis_saturates() {
    assert_eq!(millis(Duration::from_millis(1500)), 1500);
    assert_eq!(millis(Duration::from_secs(u64::MAX)), u64::MAX);
  }

  #[test]
  fn test_panic_message() {
    let text: Box<dyn Any + Send> = Box::new("boom");
    let owned: Box<dyn Any + Send> = Box::new(String::from("index out of bounds"));
    let other: Box<dyn Any + Send> = Box::new(7u8);

    assert_eq!(panic_message(text.as_ref()), "boom");
    assert_eq!(panic_message(owned.as_ref()), "index out of bounds");
    assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
  }
}
