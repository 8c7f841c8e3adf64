use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use matchme_types::events::FrameError;

/// Failures of the realtime core. Every variant is local to one connection
/// or one request; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing or invalid credential.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated, but not a participant of the requested channel.
    #[error("user {user_id} may not join {channel}")]
    Forbidden { user_id: i64, channel: String },

    /// WebSocket handshake or transport failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Parse(#[from] FrameError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    /// Durable write failed; the frame is dropped and never broadcast.
    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),

    /// Send to one connection failed or timed out.
    #[error("delivery to connection {conn_id} failed: {reason}")]
    Delivery { conn_id: uuid::Uuid, reason: &'static str },

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Protocol(_) | Self::Parse(_) => StatusCode::BAD_REQUEST,
            Self::Encode(_) | Self::Persistence(_) | Self::Delivery { .. } | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        // Bodies stay generic; details only go to the log.
        let body = match status {
            StatusCode::UNAUTHORIZED => "Unauthorized",
            StatusCode::FORBIDDEN => "Forbidden",
            StatusCode::BAD_REQUEST => "Bad request",
            _ => "Internal server error",
        };
        (status, body).into_response()
    }
}
