use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use matchme_types::api::AckResponse;

use crate::AppState;
use crate::middleware::AuthUser;

pub async fn get_counts(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let counts = state.gateway.notifications.counts(user_id).await.map_err(|e| {
        error!("Notification counts for user {} failed: {}", user_id, e);
        e.status_code()
    })?;
    Ok(Json(counts))
}

/// Moves the message checkpoint to now. Also mounted per conversation; the
/// checkpoint is per user either way.
pub async fn mark_messages_read(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .gateway
        .notifications
        .acknowledge_messages(user_id)
        .await
        .map_err(|e| e.status_code())?;

    Ok(Json(AckResponse {
        message: "Messages marked as read".into(),
    }))
}

pub async fn mark_matches_read(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .gateway
        .notifications
        .acknowledge_matches(user_id)
        .await
        .map_err(|e| e.status_code())?;

    Ok(Json(AckResponse {
        message: "Matches marked as read".into(),
    }))
}
