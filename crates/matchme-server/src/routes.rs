use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderValue, Method, header::{AUTHORIZATION, CONTENT_TYPE}},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use matchme_api::AppStateInner;
use matchme_gateway::Gateway;
use matchme_gateway::connection::{
    authorize_chat, authorize_notifications, handle_chat_socket, handle_notification_socket,
};
use matchme_gateway::error::GatewayError;
use matchme_gateway::identity::extract_credential;
use matchme_types::models::MatchId;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Full HTTP surface: the two WebSocket endpoints plus the REST routes.
pub fn build_router(gateway: Gateway, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let ws_routes = Router::new()
        .route("/ws/chat/{match_id}", get(chat_upgrade))
        .route("/ws/notifications", get(notifications_upgrade))
        .with_state(gateway.clone());

    let api_routes = matchme_api::routes(Arc::new(AppStateInner { gateway }));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .route("/health", get(|| async { "ok" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn credential(query: &TokenQuery, bearer: &Option<TypedHeader<Authorization<Bearer>>>) -> Option<String> {
    let header_token = bearer.as_ref().map(|TypedHeader(Authorization(b))| b.token());
    extract_credential(query.token.as_deref(), header_token)
}

async fn chat_upgrade(
    State(gateway): State<Gateway>,
    Path(match_id): Path<MatchId>,
    Query(query): Query<TokenQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> Response {
    let auth = match authorize_chat(&gateway, credential(&query, &bearer).as_deref(), match_id).await {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };

    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!("Chat upgrade for match {}: {}", match_id, GatewayError::Protocol(e.to_string()))
    })
    .on_upgrade(move |socket| handle_chat_socket(socket, gateway, auth))
}

async fn notifications_upgrade(
    State(gateway): State<Gateway>,
    Query(query): Query<TokenQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match authorize_notifications(&gateway, credential(&query, &bearer).as_deref()) {
        Ok(user_id) => user_id,
        Err(e) => return e.into_response(),
    };

    ws.on_failed_upgrade(move |e: axum::Error| {
        warn!("Notification upgrade for user {}: {}", user_id, GatewayError::Protocol(e.to_string()))
    })
    .on_upgrade(move |socket| handle_notification_socket(socket, gateway, user_id))
}
