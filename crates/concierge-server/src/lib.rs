//! Concierge Server
//!
//! HTTP transport for the support pipeline. One `POST /chat` request starts
//! one run; its tokens are forwarded as data stream frames.

mod chat;
mod error;
mod frame;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use concierge_support::SupportEvent;
use concierge_workflow::Dispatcher;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::ApiError;
pub use frame::{error_frame, text_frame};

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
  pub dispatcher: Dispatcher<SupportEvent>,
  /// Deadline for each run.
  pub timeout: Duration,
}

impl AppState {
  pub fn new(dispatcher: Dispatcher<SupportEvent>, timeout: Duration) -> Self {
    Self {
      dispatcher,
      timeout,
    }
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/chat", post(chat::chat))
    .route("/health", get(chat::health))
    .with_state(state)
    .layer(
      CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any),
    )
    .layer(
      TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
        tracing::info_span!(
          "http_request",
          method = %request.method(),
          path = %request.uri().path(),
        )
      }),
    )
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
  let listener = tokio::net::TcpListener::bind(addr).await?;
  info!(addr = %listener.local_addr()?, "server_listening");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("server_stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}
