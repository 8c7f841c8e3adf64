use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use matchme_types::api::{AckResponse, StatusUpdateRequest};
use matchme_types::models::UserId;

use crate::AppState;
use crate::middleware::AuthUser;

pub async fn update_status(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .gateway
        .presence
        .set_status(user_id, req.status)
        .await
        .map_err(|e| e.status_code())?;

    debug!("User {} set status {}", user_id, req.status);
    Ok(Json(AckResponse {
        message: "Status updated".into(),
    }))
}

/// Anyone authenticated may look up anyone's presence.
pub async fn get_status(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<impl IntoResponse, StatusCode> {
    let record = state
        .gateway
        .presence
        .query(user_id)
        .await
        .map_err(|e| e.status_code())?;
    Ok(Json(record))
}
