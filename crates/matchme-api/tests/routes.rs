use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use matchme_api::{AppStateInner, routes};
use matchme_db::Database;
use matchme_gateway::Gateway;
use matchme_gateway::config::GatewayConfig;
use matchme_gateway::identity::JwtIdentity;
use matchme_gateway::store::ChatStore;
use matchme_types::models::{ChatMessage, PresenceStatus};

struct TestApp {
    db: Arc<Database>,
    identity: Arc<JwtIdentity>,
    router: Router,
}

fn app() -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let identity = Arc::new(JwtIdentity::new("api-secret"));
    let gateway = Gateway::new(db.clone(), identity.clone(), GatewayConfig::default());
    let router = routes(Arc::new(AppStateInner { gateway }));
    TestApp { db, identity, router }
}

impl TestApp {
    async fn call(&self, method: &str, uri: &str, user_id: Option<i64>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            let token = self.identity.issue(user_id, chrono::Duration::hours(1)).unwrap();
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn seed_message(&self, id: &str, match_id: i64, sender_id: i64, age_secs: i64) {
        self.db
            .append_message(&ChatMessage {
                id: id.into(),
                match_id,
                sender_id,
                content: format!("message {}", id),
                timestamp: chrono::Utc::now() - chrono::Duration::seconds(age_secs),
                read: false,
            })
            .unwrap();
    }
}

#[tokio::test]
async fn rejects_missing_or_bad_tokens() {
    let app = app();
    let (status, _) = app.call("GET", "/api/notifications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/api/notifications")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn any_authenticated_request_counts_as_activity() {
    let app = app();
    assert!(app.db.get_presence(7).unwrap().is_none());

    let (status, _) = app.call("GET", "/api/notifications", Some(7), None).await;
    assert_eq!(status, StatusCode::OK);

    let record = app.db.get_presence(7).unwrap().unwrap();
    assert_eq!(record.status, PresenceStatus::Online);
}

#[tokio::test]
async fn notification_counts_and_acknowledgement() {
    let app = app();
    let m = app.db.create_match(1, 2, "connected").unwrap();
    app.seed_message("a", m, 2, 30);
    app.seed_message("b", m, 2, 20);
    app.seed_message("mine", m, 1, 10);

    let (status, body) = app.call("GET", "/api/notifications", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"unreadMessages": 2, "newMatches": 1}));

    let (status, body) = app.call("POST", "/api/notifications/mark-read", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Messages marked as read");

    let (_, body) = app.call("GET", "/api/notifications", Some(1), None).await;
    assert_eq!(body["unreadMessages"], 0);
    assert_eq!(body["newMatches"], 1);

    app.call("POST", "/api/notifications/mark-matches-read", Some(1), None).await;
    let (_, body) = app.call("GET", "/api/notifications", Some(1), None).await;
    assert_eq!(body, json!({"unreadMessages": 0, "newMatches": 0}));
}

#[tokio::test]
async fn per_conversation_read_moves_message_checkpoint() {
    let app = app();
    let m = app.db.create_match(1, 2, "connected").unwrap();
    app.seed_message("a", m, 2, 5);

    let uri = format!("/api/matches/{}/messages/read", m);
    let (status, _) = app.call("POST", &uri, Some(1), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call("GET", "/api/notifications", Some(1), None).await;
    assert_eq!(body["unreadMessages"], 0);
}

#[tokio::test]
async fn status_update_and_lookup() {
    let app = app();

    let (status, _) = app
        .call("POST", "/api/status/update", Some(4), Some(json!({"status": "offline"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.db.get_presence(4).unwrap().unwrap().status, PresenceStatus::Offline);

    let (status, body) = app.call("GET", "/api/status/4", Some(5), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 4);
    assert_eq!(body["status"], "offline");

    let (status, body) = app.call("GET", "/api/status/99", Some(5), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");
    assert!(body["last_active"].is_null());

    let (status, _) = app
        .call("POST", "/api/status/update", Some(4), Some(json!({"status": "away"})))
        .await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn stale_user_reads_as_offline() {
    let app = app();
    let long_ago = chrono::Utc::now() - chrono::Duration::minutes(2);
    app.db.upsert_presence(8, PresenceStatus::Online, long_ago).unwrap();

    let (_, body) = app.call("GET", "/api/status/8", Some(1), None).await;
    assert_eq!(body["status"], "offline");
    assert_eq!(app.db.get_presence(8).unwrap().unwrap().status, PresenceStatus::Offline);
}

#[tokio::test]
async fn message_history_is_paged_and_marks_read() {
    let app = app();
    let m = app.db.create_match(1, 2, "connected").unwrap();
    for i in 0..55 {
        app.seed_message(&format!("m{:02}", i), m, 2, 100 - i);
    }

    let uri = format!("/api/matches/{}/messages", m);
    let (status, body) = app.call("GET", &uri, Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 55);
    assert_eq!(body["page"], 1);
    assert_eq!(body["pages"], 2);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 50);
    assert_eq!(messages[0]["id"], "m00");
    assert_eq!(messages[0]["read"], false);

    let (_, body) = app.call("GET", &format!("{}?page=2", uri), Some(1), None).await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[4]["id"], "m54");
    // the first read marked everything from the peer
    assert_eq!(messages[0]["read"], true);
}

#[tokio::test]
async fn message_history_is_participant_only() {
    let app = app();
    let m = app.db.create_match(1, 2, "connected").unwrap();

    let uri = format!("/api/matches/{}/messages", m);
    let (status, _) = app.call("GET", &uri, Some(3), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.call("GET", "/api/matches/999/messages", Some(1), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn chat_list_shows_latest_message_and_unread() {
    let app = app();
    let quiet = app.db.create_match(1, 2, "connected").unwrap();
    let busy = app.db.create_match(3, 1, "connected").unwrap();
    app.db.create_match(1, 4, "pending").unwrap();
    app.seed_message("x", busy, 3, 20);
    app.seed_message("y", busy, 3, 10);

    let (status, body) = app.call("GET", "/api/matches/chats", Some(1), None).await;
    assert_eq!(status, StatusCode::OK);
    let chats = body.as_array().unwrap();
    assert_eq!(chats.len(), 2);

    assert_eq!(chats[0]["match_id"], busy);
    assert_eq!(chats[0]["other_user_id"], 3);
    assert_eq!(chats[0]["last_message"], "message y");
    assert_eq!(chats[0]["unread_count"], 2);
    assert!(chats[0]["last_message_time"].is_string());

    assert_eq!(chats[1]["match_id"], quiet);
    assert!(chats[1]["last_message"].is_null());
    assert_eq!(chats[1]["unread_count"], 0);

    // opening the conversation clears its unread count
    app.call("GET", &format!("/api/matches/{}/messages", busy), Some(1), None).await;
    let (_, body) = app.call("GET", "/api/matches/chats", Some(1), None).await;
    assert_eq!(body[0]["unread_count"], 0);
}
