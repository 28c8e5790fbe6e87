//! Concierge Workflow
//!
//! Event-driven step orchestration. Steps declare the event kinds they accept
//! and emit; the dispatcher routes every emitted event to all accepting steps,
//! runs them concurrently, joins multi-input steps and streams tokens back to
//! the caller while the run is in progress.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                           │
//! │  - builder().register(step).build() validates the graph     │
//! │  - start(event, timeout) → RunHandle                        │
//! └─────────────────────────────────────────────────────────────┘
//!                               │ one driver task per run
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Run driver                           │
//! │  - pending queue, routing by EventKind                      │
//! │  - stop event / step failure / cancel / deadline end a run  │
//! └─────────────────────────────────────────────────────────────┘
//!           │ one task per invocation          │
//!           ▼                                  ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │   Step (+ JoinBuffer)    │   │ ContextStore / StreamWriter  │
//! │   run(ctx, inputs)       │──▶│ run-scoped state and tokens  │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let dispatcher = Dispatcher::builder(START, STOP)
//!   .register(Extract)
//!   .register(Answer)
//!   .build()?;
//!
//! let mut handle = dispatcher.start(Event::Start(payload), Duration::from_secs(360))?;
//! let mut tokens = handle.take_stream().unwrap();
//! while let Some(token) = tokens.next().await {
//!   print!("{}", token.token);
//! }
//! let result = handle.wait().await?;
//! ```

mod context;
mod dispatcher;
mod error;
mod event;
mod graph;
mod handle;
mod join;
mod step;
mod stream;

pub use context::ContextStore;
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{BoxError, WorkflowError};
pub use event::{EventKind, StopResult, StreamToken, WorkflowEvent};
pub use graph::{StepGraph, StepNode};
pub use handle::{RunHandle, RunOutcome, RunResult};
pub use join::JoinBuffer;
pub use step::{Step, StepContext};
pub use stream::{StreamWriter, TokenStream};
