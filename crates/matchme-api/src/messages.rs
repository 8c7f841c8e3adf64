use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{error, warn};

use matchme_gateway::store::run_blocking;
use matchme_types::api::MessagePage;
use matchme_types::models::MatchId;

use crate::AppState;
use crate::middleware::AuthUser;

pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// The caller's connected conversations, most recently active first.
pub async fn list_chats(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let chats = run_blocking(&state.gateway.store, move |s| s.chat_list(user_id))
        .await
        .map_err(|e| {
            error!("Loading chats for user {} failed: {}", user_id, e);
            e.status_code()
        })?;
    Ok(Json(chats))
}

/// History of one conversation, oldest first. Reading a page marks the
/// peer's messages as read; the page itself reflects the state before that.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(match_id): Path<MatchId>,
    Query(query): Query<PageQuery>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, StatusCode> {
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let offset = (page - 1).saturating_mul(PAGE_SIZE);
    let store = &state.gateway.store;

    let participant = run_blocking(store, move |s| s.is_participant(match_id, user_id))
        .await
        .map_err(|e| e.status_code())?;
    if !participant {
        return Err(StatusCode::FORBIDDEN);
    }

    let (messages, total) = run_blocking(store, move |s| s.messages_page(match_id, PAGE_SIZE, offset))
        .await
        .map_err(|e| {
            error!("Loading messages for match {} failed: {}", match_id, e);
            e.status_code()
        })?;

    if let Err(e) = run_blocking(store, move |s| s.mark_read(match_id, user_id)).await {
        warn!("Marking match {} read for user {} failed: {}", match_id, user_id, e);
    }

    Ok(Json(MessagePage {
        messages,
        total,
        page,
        pages: total.div_ceil(u64::from(PAGE_SIZE)),
    }))
}
