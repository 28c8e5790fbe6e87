//! Concierge Support
//!
//! The customer-support chat pipeline, built on `concierge-workflow`:
//!
//! 1. `extract_query` rewrites the last message into a standalone query and
//!    pulls out an order id, if the customer mentioned one.
//! 2. `fetch_order` runs only for an order id and formats the order record.
//! 3. `create_prompt` hands over the answer template and the few-shot slot.
//! 4. `answer_query` waits for the prompt (and the order data when one was
//!    requested), renders the prompt and streams the answer.
//!
//! External collaborators sit behind the traits in [`capability`]. The
//! OpenAI-backed implementations are wired by [`Capabilities::from_config`].
//!
//! ```ignore
//! let dispatcher = support_workflow(capabilities)?;
//! let mut handle = dispatcher.start(start_event(&chat)?, Duration::from_secs(360))?;
//! let tokens = handle.take_stream();
//! ```

pub mod capability;
mod chat;
mod error;
mod event;
mod few_shot;
mod openai;
mod orders;
pub mod prompt;
pub mod steps;
mod workflow;

pub use capability::{
  CompletionModel, Embedder, ExampleRetriever, ExtractedQuery, OrderLookup, QueryExtractor,
  ScoredExample, TokenStream,
};
pub use chat::{ChatData, ChatDataError, render_history};
pub use error::SupportError;
pub use event::{
  EXTRACTED_QUERY, ExampleSlot, ORDER_DATA_FETCHED, ORDER_FETCH_REQUESTED, PROMPT_READY, START, STOP,
  SupportEvent,
};
pub use few_shot::{EmbeddingRetriever, FewShotIndex, IndexEntry, cosine_similarity};
pub use orders::JsonOrderBook;
pub use workflow::{Capabilities, DEFAULT_SCORE_THRESHOLD, start_event, support_workflow};
