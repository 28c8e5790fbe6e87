use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{self, HeaderName};
use axum::response::{IntoResponse, Response};
use concierge_support::{ChatData, start_event};
use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::frame::{error_frame, text_frame};

const STREAM_DATA_HEADER: HeaderName = HeaderName::from_static("x-experimental-stream-data");

/// `POST /chat`: run the support pipeline and stream its answer.
///
/// The response is committed only once the first token (or the run's end)
/// is known, so a run that fails before producing output gets a 500.
#[instrument(name = "chat_request", skip_all)]
pub async fn chat(
  State(state): State<AppState>,
  Json(chat): Json<ChatData>,
) -> Result<Response, ApiError> {
  let event = start_event(&chat)?;
  debug!(messages = chat.messages.len(), "chat_request_validated");
  let handle = state.dispatcher.start(event, state.timeout)?;
  let run_id = handle.run_id().to_string();
  info!(run_id = %run_id, "chat_run_started");

  let (tokens, outcome) = handle.into_parts();
  let Some(mut tokens) = tokens else {
    return Err(ApiError::from(concierge_workflow::WorkflowError::StreamClosed));
  };

  let first = match tokens.next().await {
    Some(token) => token,
    None => {
      // The run ended without writing anything.
      let result = outcome.await?;
      info!(run_id = %run_id, result = ?result, "chat_run_finished_empty");
      return Ok(stream_response(Body::empty()));
    }
  };

  let frames = async_stream::stream! {
    yield Ok::<_, Infallible>(text_frame(&first.token));
    while let Some(token) = tokens.next().await {
      yield Ok(text_frame(&token.token));
    }
    match outcome.await {
      Ok(_) => info!(run_id = %run_id, "chat_run_finished"),
      Err(e) => {
        warn!(run_id = %run_id, error = %e, "chat_run_failed_mid_stream");
        yield Ok(error_frame(&e.to_string()));
      }
    }
  };

  Ok(stream_response(Body::from_stream(frames)))
}

fn stream_response(body: Body) -> Response {
  (
    [
      (header::CONTENT_TYPE, "text/event-stream"),
      (STREAM_DATA_HEADER, "true"),
    ],
    body,
  )
    .into_response()
}

pub async fn health() -> &'static str {
  "ok"
}
