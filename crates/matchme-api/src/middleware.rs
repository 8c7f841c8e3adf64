use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use matchme_types::models::UserId;

use crate::AppState;

/// Caller identity, inserted as a request extension by [`require_auth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

/// Resolve the bearer token, then record the request as activity for
/// presence. Presence failures never fail the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = state.gateway.identity.resolve_user(token).map_err(|e| {
        debug!("Rejected REST credential: {}", e);
        e.status_code()
    })?;

    if let Err(e) = state.gateway.presence.touch(user_id).await {
        warn!("Presence touch failed for user {}: {}", user_id, e);
    }

    req.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(req).await)
}
