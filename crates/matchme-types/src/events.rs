use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ChatMessage, MatchId, UserId};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("chat frame has an empty id")]
    EmptyId,
}

/// Frames sent FROM client TO server over a chat socket.
///
/// The variant is decided by which required fields are present: anything
/// carrying a boolean `typing` is a typing signal, anything else must carry
/// `id` and `content`. Extra fields (clients echo `match_id`, `sender_id`,
/// ...) are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Typing(TypingFrame),
    Chat(ChatFrame),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypingFrame {
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatFrame {
    pub id: String,
    pub content: String,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        if let InboundFrame::Chat(chat) = &frame {
            if chat.id.trim().is_empty() {
                return Err(FrameError::EmptyId);
            }
        }
        Ok(frame)
    }
}

/// Typing signal as relayed to the conversation. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub typing: bool,
}

/// Tags carried on a user's private notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Connected,
    NewMessage,
    NewMatch,
    Pong,
}

/// `{"type": "<tag>"}`. Only wakes the client up to re-query its counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

impl From<NotificationKind> for NotificationEvent {
    fn from(kind: NotificationKind) -> Self {
        Self { kind }
    }
}

/// Commands a client may send on its notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationCommand {
    Ping,
}

/// Everything the server pushes to a socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundEvent {
    Message(ChatMessage),
    Typing(TypingEvent),
    Notification(NotificationEvent),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::Notification(_) => "notification",
        }
    }
}
