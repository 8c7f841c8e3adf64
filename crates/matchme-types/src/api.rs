use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, MatchId, PresenceStatus, UserId};

// -- JWT Claims --

/// Claims carried by tokens from the identity service. Shared by the REST
/// middleware and the WebSocket upgrade path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: UserId,
    pub exp: usize,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCounts {
    pub unread_messages: u64,
    pub new_matches: u64,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub message: String,
}

// -- Status --

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: PresenceStatus,
}

// -- Messages --

#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

/// Conversation list entry. Message fields are `null` until the first message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub match_id: MatchId,
    pub other_user_id: UserId,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: u64,
}
