use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use concierge_support::ChatDataError;
use concierge_workflow::WorkflowError;
use serde_json::json;

/// Failures reported to the client before any token was streamed.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// The request body failed validation.
  #[error("{source}")]
  Validation {
    #[from]
    source: ChatDataError,
  },

  /// The run could not start or failed before producing output.
  #[error("Error in workflow: {source}")]
  Workflow {
    #[from]
    source: WorkflowError,
  },
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Workflow { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
  }
}
