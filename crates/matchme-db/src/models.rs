/// Row types as read from SQLite, kept separate from the `matchme-types` models.

pub struct MessageRow {
    pub id: String,
    pub match_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub timestamp: String,
    pub read: bool,
}

pub struct StatusRow {
    pub user_id: i64,
    pub status: String,
    pub last_active: Option<String>,
}

pub struct CheckpointRow {
    pub last_message_check: Option<String>,
    pub last_match_check: Option<String>,
}

pub struct MatchRow {
    pub id: i64,
    pub user_id_1: i64,
    pub user_id_2: i64,
    pub status: String,
}

/// One connected conversation as seen by one of its members.
pub struct ChatSummaryRow {
    pub match_id: i64,
    pub other_user_id: i64,
    pub last_message: Option<String>,
    pub last_message_time: Option<String>,
    pub unread_count: i64,
}
