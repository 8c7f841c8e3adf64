pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod status;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use matchme_gateway::Gateway;

use crate::middleware::require_auth;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub gateway: Gateway,
}

/// Authenticated REST surface. Every route passes through [`require_auth`].
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/notifications", get(notifications::get_counts))
        .route("/api/notifications/mark-read", post(notifications::mark_messages_read))
        .route("/api/notifications/mark-matches-read", post(notifications::mark_matches_read))
        .route("/api/matches/chats", get(messages::list_chats))
        .route("/api/matches/{match_id}/messages", get(messages::get_messages))
        .route("/api/matches/{match_id}/messages/read", post(notifications::mark_messages_read))
        .route("/api/status/update", post(status::update_status))
        .route("/api/status/{user_id}", get(status::get_status))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}
