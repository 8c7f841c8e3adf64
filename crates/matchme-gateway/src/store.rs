use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use matchme_db::{Database, format_timestamp, parse_timestamp};
use matchme_types::api::ChatSummary;
use matchme_types::models::{
    ChatMessage, Checkpoints, MatchId, PresenceRecord, PresenceStatus, UserId,
};

use crate::error::GatewayError;

/// Everything the realtime core needs from the relational store.
///
/// Calls are synchronous and may block; async callers go through
/// [`run_blocking`]. Implementations must tolerate concurrent calls from
/// many connection tasks.
pub trait ChatStore: Send + Sync + 'static {
    /// The other participant of a conversation, or `None` if `user_id` is
    /// not one of its two members.
    fn conversation_peer(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>>;

    fn is_participant(&self, match_id: MatchId, user_id: UserId) -> Result<bool> {
        Ok(self.conversation_peer(match_id, user_id)?.is_some())
    }

    fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// Flag as read every message in the conversation not sent by `reader_id`.
    fn mark_read(&self, match_id: MatchId, reader_id: UserId) -> Result<usize>;

    fn count_unread(&self, user_id: UserId, since: Option<DateTime<Utc>>) -> Result<u64>;

    fn count_new_matches(&self, user_id: UserId, since: Option<DateTime<Utc>>) -> Result<u64>;

    fn checkpoints(&self, user_id: UserId) -> Result<Checkpoints>;

    fn advance_message_checkpoint(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()>;

    fn advance_match_checkpoint(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()>;

    fn upsert_presence(&self, user_id: UserId, status: PresenceStatus, at: DateTime<Utc>) -> Result<()>;

    fn get_presence(&self, user_id: UserId) -> Result<Option<PresenceRecord>>;

    /// Downgrade `user_id` to offline if online and last active before `cutoff`.
    fn mark_offline_if_stale(&self, user_id: UserId, cutoff: DateTime<Utc>) -> Result<bool>;

    /// Bulk form of [`ChatStore::mark_offline_if_stale`]. Returns the number of users changed.
    fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// One page of a conversation, oldest first, plus the conversation's total size.
    fn messages_page(&self, match_id: MatchId, limit: u32, offset: u32) -> Result<(Vec<ChatMessage>, u64)>;

    /// Connected conversations of `user_id` with their latest message and
    /// unread count, most recently active first.
    fn chat_list(&self, user_id: UserId) -> Result<Vec<ChatSummary>>;
}

/// Run a store call on the blocking pool.
pub async fn run_blocking<T, F>(store: &Arc<dyn ChatStore>, f: F) -> Result<T, GatewayError>
where
    F: FnOnce(&dyn ChatStore) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            GatewayError::Store(anyhow!("store task failed: {}", e))
        })?
        .map_err(GatewayError::Store)
}

impl ChatStore for Database {
    fn conversation_peer(&self, match_id: MatchId, user_id: UserId) -> Result<Option<UserId>> {
        self.match_peer(match_id, user_id)
    }

    fn append_message(&self, message: &ChatMessage) -> Result<()> {
        self.insert_message(
            &message.id,
            message.match_id,
            message.sender_id,
            &message.content,
            &format_timestamp(&message.timestamp),
        )
    }

    fn mark_read(&self, match_id: MatchId, reader_id: UserId) -> Result<usize> {
        self.mark_messages_read(match_id, reader_id)
    }

    fn count_unread(&self, user_id: UserId, since: Option<DateTime<Utc>>) -> Result<u64> {
        let since = since.map(|ts| format_timestamp(&ts));
        Database::count_unread(self, user_id, since.as_deref())
    }

    fn count_new_matches(&self, user_id: UserId, since: Option<DateTime<Utc>>) -> Result<u64> {
        let since = since.map(|ts| format_timestamp(&ts));
        Database::count_new_matches(self, user_id, since.as_deref())
    }

    fn checkpoints(&self, user_id: UserId) -> Result<Checkpoints> {
        let row = self.get_checkpoints(user_id)?;
        Ok(Checkpoints {
            last_message_check: row.last_message_check.as_deref().map(parse_timestamp).transpose()?,
            last_match_check: row.last_match_check.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn advance_message_checkpoint(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        self.advance_message_check(user_id, &format_timestamp(&at))
    }

    fn advance_match_checkpoint(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        self.advance_match_check(user_id, &format_timestamp(&at))
    }

    fn upsert_presence(&self, user_id: UserId, status: PresenceStatus, at: DateTime<Utc>) -> Result<()> {
        self.upsert_status(user_id, status.as_str(), &format_timestamp(&at))
    }

    fn get_presence(&self, user_id: UserId) -> Result<Option<PresenceRecord>> {
        let Some(row) = self.get_status(user_id)? else {
            return Ok(None);
        };

        let status = row.status.parse().unwrap_or_else(|e| {
            warn!("{} for user {}, treating as offline", e, row.user_id);
            PresenceStatus::Offline
        });

        Ok(Some(PresenceRecord {
            user_id: row.user_id,
            status,
            last_active: row.last_active.as_deref().map(parse_timestamp).transpose()?,
        }))
    }

    fn mark_offline_if_stale(&self, user_id: UserId, cutoff: DateTime<Utc>) -> Result<bool> {
        Database::mark_offline_if_stale(self, user_id, &format_timestamp(&cutoff))
    }

    fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        Database::mark_stale_offline(self, &format_timestamp(&cutoff))
    }

    fn messages_page(&self, match_id: MatchId, limit: u32, offset: u32) -> Result<(Vec<ChatMessage>, u64)> {
        let rows = self.get_messages(match_id, limit, offset)?;
        let total = self.count_messages(match_id)?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let timestamp = parse_timestamp(&row.timestamp).unwrap_or_else(|e| {
                    warn!("{} on message '{}'", e, row.id);
                    DateTime::default()
                });
                ChatMessage {
                    id: row.id,
                    match_id: row.match_id,
                    sender_id: row.sender_id,
                    content: row.content,
                    timestamp,
                    read: row.read,
                }
            })
            .collect();

        Ok((messages, total))
    }

    fn chat_list(&self, user_id: UserId) -> Result<Vec<ChatSummary>> {
        let rows = self.list_chats(user_id)?;
        Ok(rows
            .into_iter()
            .map(|row| ChatSummary {
                match_id: row.match_id,
                other_user_id: row.other_user_id,
                last_message: row.last_message,
                last_message_time: row.last_message_time.and_then(|raw| {
                    parse_timestamp(&raw)
                        .inspect_err(|e| warn!("{} on match {}", e, row.match_id))
                        .ok()
                }),
                unread_count: row.unread_count.max(0) as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn database_round_trips_through_trait() {
        let db = Database::open_in_memory().unwrap();
        let m = db.create_match(10, 20, "connected").unwrap();
        let store: &dyn ChatStore = &db;

        assert!(store.is_participant(m, 10).unwrap());
        assert!(!store.is_participant(m, 30).unwrap());

        let ts = Utc.with_ymd_and_hms(2024, 2, 2, 8, 30, 0).unwrap() + Duration::milliseconds(250);
        let message = ChatMessage {
            id: "m1".into(),
            match_id: m,
            sender_id: 10,
            content: "hello".into(),
            timestamp: ts,
            read: false,
        };
        store.append_message(&message).unwrap();

        let (page, total) = store.messages_page(m, 50, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page, vec![message]);
    }

    #[test]
    fn chat_list_carries_parsed_timestamps() {
        let db = Database::open_in_memory().unwrap();
        let m = db.create_match(10, 20, "connected").unwrap();
        let store: &dyn ChatStore = &db;

        let ts = Utc.with_ymd_and_hms(2024, 2, 2, 8, 30, 0).unwrap() + Duration::microseconds(1_500);
        store
            .append_message(&ChatMessage {
                id: "m1".into(),
                match_id: m,
                sender_id: 20,
                content: "hi".into(),
                timestamp: ts,
                read: false,
            })
            .unwrap();

        let chats = store.chat_list(10).unwrap();
        assert_eq!(
            chats,
            vec![ChatSummary {
                match_id: m,
                other_user_id: 20,
                last_message: Some("hi".into()),
                last_message_time: Some(ts),
                unread_count: 1,
            }]
        );
    }

    #[test]
    fn presence_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let store: &dyn ChatStore = &db;
        assert!(store.get_presence(4).unwrap().is_none());

        let at = Utc.with_ymd_and_hms(2024, 2, 2, 8, 30, 0).unwrap();
        store.upsert_presence(4, PresenceStatus::Online, at).unwrap();
        let record = store.get_presence(4).unwrap().unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
        assert_eq!(record.last_active, Some(at));
    }
}
