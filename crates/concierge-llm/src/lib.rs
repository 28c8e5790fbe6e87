//! Concierge LLM
//!
//! A small client for OpenAI-compatible APIs: plain chat completions, strict
//! structured output derived from `schemars` types, server-sent-event token
//! streaming and embeddings. Transient failures (rate limits, 5xx, connect
//! errors) are retried with bounded exponential backoff.

mod client;
mod message;
mod retry;
mod schema;
mod sse;
mod types;

pub use client::{CompletionStream, OpenAi};
pub use message::{Message, MessageRole};
pub use retry::RetryPolicy;
pub use schema::StructuredOutput;
pub use sse::{SseData, SseDecoder};
