//! Caller-side handle for a running workflow.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::event::StopResult;
use crate::stream::TokenStream;

/// Final result of a run.
pub type RunResult = Result<StopResult, WorkflowError>;

/// A started run: its token stream and its deferred result.
///
/// Dropping the handle does not cancel the run; use [`RunHandle::cancel`].
pub struct RunHandle {
  run_id: String,
  tokens: Option<TokenStream>,
  outcome: RunOutcome,
  cancel: CancellationToken,
}

impl RunHandle {
  pub(crate) fn new(
    run_id: String,
    tokens: TokenStream,
    outcome: oneshot::Receiver<RunResult>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      run_id,
      tokens: Some(tokens),
      outcome: RunOutcome { receiver: outcome },
      cancel,
    }
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  /// Take the token stream. Returns `None` after the first call.
  ///
  /// Dropping the returned stream before it ends tells the run that its
  /// consumer disconnected.
  pub fn take_stream(&mut self) -> Option<TokenStream> {
    self.tokens.take()
  }

  /// Request cancellation. The run resolves with [`WorkflowError::Cancelled`]
  /// unless it already finished.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// A token that cancels this run when cancelled.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// Split into the token stream and the deferred result.
  ///
  /// Returns `None` for the stream if it was already taken.
  pub fn into_parts(self) -> (Option<TokenStream>, RunOutcome) {
    (self.tokens, self.outcome)
  }

  /// Wait for the run to finish without consuming its tokens.
  ///
  /// The stream stays connected until the result arrives, so steps do not
  /// observe a disconnect.
  pub async fn wait(self) -> RunResult {
    let RunHandle {
      tokens, outcome, ..
    } = self;
    let result = outcome.await;
    drop(tokens);
    result
  }
}

/// Deferred result of a run.
pub struct RunOutcome {
  receiver: oneshot::Receiver<RunResult>,
}

impl Future for RunOutcome {
  type Output = RunResult;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    Pin::new(&mut self.receiver)
      .poll(cx)
      .map(|received| received.unwrap_or(Err(WorkflowError::DriverLost)))
  }
}
