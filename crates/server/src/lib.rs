//! Voicebot Server
//!
//! Serves the conversation pipeline over WebSocket, plus health, metrics and
//! session listing endpoints.

pub mod bot;
pub mod http;
pub mod metrics;
pub mod session;
pub mod state;
pub mod websocket;

pub use bot::{build_pipeline, run_bot};
pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use session::{SessionGuard, SessionInfo, SessionRegistry};
pub use state::AppState;
pub use websocket::{transport_pair, ClientMessage, ServerEvent, WebSocketInput, WebSocketOutput};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session limit reached ({0} active)")]
    SessionLimit(usize),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::WebSocket(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        (StatusCode::from(self), message).into_response()
    }
}
