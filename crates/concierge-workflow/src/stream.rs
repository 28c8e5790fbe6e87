//! Stream channel from steps to the caller.
//!
//! ```text
//!   step ──write──┐
//!   step ──write──┼──▶ StreamWriter ──unbounded mpsc──▶ TokenStream ──▶ caller
//!   step ──write──┘          ▲                              │
//!                            └──── disconnected token ◀─────┘ (on drop)
//! ```
//!
//! The writer is shared by every step of a run. Closing it lets the reader
//! drain what is buffered and then end. Dropping the reader marks the run's
//! consumer as gone so producing steps can stop early.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::event::StreamToken;

/// Create a connected writer/reader pair.
pub fn channel() -> (StreamWriter, TokenStream) {
  let (sender, receiver) = mpsc::unbounded_channel();
  let disconnected = CancellationToken::new();
  let writer = StreamWriter {
    sender: Arc::new(Mutex::new(Some(sender))),
    disconnected: disconnected.clone(),
  };
  let reader = TokenStream {
    receiver,
    disconnected,
  };
  (writer, reader)
}

/// Write half of a run's stream channel.
#[derive(Clone)]
pub struct StreamWriter {
  sender: Arc<Mutex<Option<mpsc::UnboundedSender<StreamToken>>>>,
  disconnected: CancellationToken,
}

impl StreamWriter {
  /// Push a token. Fails once the channel is closed or the reader is gone.
  pub fn write(&self, token: impl Into<StreamToken>) -> Result<(), WorkflowError> {
    let guard = self.sender.lock().unwrap();
    let sender = guard.as_ref().ok_or(WorkflowError::StreamClosed)?;
    sender
      .send(token.into())
      .map_err(|_| WorkflowError::StreamClosed)
  }

  /// Close the channel. Buffered tokens remain readable.
  pub fn close(&self) {
    self.sender.lock().unwrap().take();
  }

  /// Whether the reader has been dropped.
  pub fn is_disconnected(&self) -> bool {
    self.disconnected.is_cancelled()
  }

  /// Resolves when the reader is dropped.
  pub async fn disconnected(&self) {
    self.disconnected.cancelled().await
  }
}

/// Read half of a run's stream channel.
///
/// Yields tokens in push order and ends once the run terminates and the
/// buffer is drained. Not restartable.
pub struct TokenStream {
  receiver: mpsc::UnboundedReceiver<StreamToken>,
  disconnected: CancellationToken,
}

impl Stream for TokenStream {
  type Item = StreamToken;

  fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    self.receiver.poll_recv(cx)
  }
}

impl Drop for TokenStream {
  fn drop(&mut self) {
    self.disconnected.cancel();
  }
}
