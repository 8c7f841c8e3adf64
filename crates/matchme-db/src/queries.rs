use crate::models::{ChatSummaryRow, CheckpointRow, MatchRow, MessageRow, StatusRow};
use crate::{Database, format_timestamp};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};

impl Database {
    // -- Matches --

    /// Insert a match row. Matches are produced by the matching service; this
    /// exists for seeding and tests.
    pub fn create_match(&self, user_id_1: i64, user_id_2: i64, status: &str) -> Result<i64> {
        let created_at = format_timestamp(&Utc::now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO matches (user_id_1, user_id_2, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user_id_1, user_id_2, status, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_match(&self, match_id: i64) -> Result<Option<MatchRow>> {
        self.with_conn(|conn| query_match(conn, match_id))
    }

    /// The other participant of `match_id`, or `None` if `user_id` is not in it.
    pub fn match_peer(&self, match_id: i64, user_id: i64) -> Result<Option<i64>> {
        Ok(self.get_match(match_id)?.and_then(|m| {
            if m.user_id_1 == user_id {
                Some(m.user_id_2)
            } else if m.user_id_2 == user_id {
                Some(m.user_id_1)
            } else {
                None
            }
        }))
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        match_id: i64,
        sender_id: i64,
        content: &str,
        timestamp: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, match_id, sender_id, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, match_id, sender_id, content, timestamp],
            )?;
            Ok(())
        })
    }

    /// Mark every message in `match_id` not sent by `reader_id` as read.
    pub fn mark_messages_read(&self, match_id: i64, reader_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chat_messages SET read = 1
                 WHERE match_id = ?1 AND sender_id != ?2 AND read = 0",
                params![match_id, reader_id],
            )?;
            Ok(changed)
        })
    }

    pub fn get_messages(&self, match_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, match_id, limit, offset))
    }

    pub fn count_messages(&self, match_id: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE match_id = ?1",
                [match_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Connected conversations of `user_id`, most recent activity first.
    /// Conversations without messages come last, newest match first.
    pub fn list_chats(&self, user_id: i64) -> Result<Vec<ChatSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id,
                        CASE WHEN m.user_id_1 = ?1 THEN m.user_id_2 ELSE m.user_id_1 END,
                        (SELECT content FROM chat_messages
                          WHERE match_id = m.id
                          ORDER BY timestamp DESC, seq DESC LIMIT 1),
                        (SELECT MAX(timestamp) FROM chat_messages WHERE match_id = m.id) AS last_time,
                        (SELECT COUNT(*) FROM chat_messages
                          WHERE match_id = m.id AND sender_id != ?1 AND read = 0)
                 FROM matches m
                 WHERE (m.user_id_1 = ?1 OR m.user_id_2 = ?1)
                   AND m.status = 'connected'
                 ORDER BY last_time IS NULL, last_time DESC, m.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatSummaryRow {
                        match_id: row.get(0)?,
                        other_user_id: row.get(1)?,
                        last_message: row.get(2)?,
                        last_message_time: row.get(3)?,
                        unread_count: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Notification counts --

    /// Unread messages addressed to `user_id` newer than `since` (all, if `None`).
    pub fn count_unread(&self, user_id: i64, since: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_messages cm
                 JOIN matches m ON cm.match_id = m.id
                 WHERE (m.user_id_1 = ?1 OR m.user_id_2 = ?1)
                   AND cm.sender_id != ?1
                   AND cm.read = 0
                   AND (?2 IS NULL OR cm.timestamp > ?2)",
                params![user_id, since],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn count_new_matches(&self, user_id: i64, since: Option<&str>) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM matches
                 WHERE (user_id_1 = ?1 OR user_id_2 = ?1)
                   AND status = 'connected'
                   AND (?2 IS NULL OR created_at > ?2)",
                params![user_id, since],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    pub fn get_checkpoints(&self, user_id: i64) -> Result<CheckpointRow> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT last_message_check, last_match_check FROM user_status WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(CheckpointRow {
                            last_message_check: row.get(0)?,
                            last_match_check: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row.unwrap_or(CheckpointRow {
                last_message_check: None,
                last_match_check: None,
            }))
        })
    }

    /// Move the message checkpoint forward. Never moves it backwards.
    pub fn advance_message_check(&self, user_id: i64, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_status (user_id, last_message_check) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_message_check =
                    CASE WHEN last_message_check IS NULL OR last_message_check < excluded.last_message_check
                         THEN excluded.last_message_check
                         ELSE last_message_check END",
                params![user_id, at],
            )?;
            Ok(())
        })
    }

    /// Move the match checkpoint forward. Never moves it backwards.
    pub fn advance_match_check(&self, user_id: i64, at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_status (user_id, last_match_check) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET last_match_check =
                    CASE WHEN last_match_check IS NULL OR last_match_check < excluded.last_match_check
                         THEN excluded.last_match_check
                         ELSE last_match_check END",
                params![user_id, at],
            )?;
            Ok(())
        })
    }

    // -- Presence --

    pub fn upsert_status(&self, user_id: i64, status: &str, last_active: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_status (user_id, status, last_active) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET status = ?2, last_active = ?3",
                params![user_id, status, last_active],
            )?;
            Ok(())
        })
    }

    pub fn get_status(&self, user_id: i64) -> Result<Option<StatusRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, status, last_active FROM user_status WHERE user_id = ?1",
                    [user_id],
                    |row| {
                        Ok(StatusRow {
                            user_id: row.get(0)?,
                            status: row.get(1)?,
                            last_active: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Downgrade one user to offline if still online and last seen before `cutoff`.
    pub fn mark_offline_if_stale(&self, user_id: i64, cutoff: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_status SET status = 'offline'
                 WHERE user_id = ?1 AND status = 'online'
                   AND (last_active IS NULL OR last_active < ?2)",
                params![user_id, cutoff],
            )?;
            Ok(changed > 0)
        })
    }

    /// Downgrade every online user last seen before `cutoff`. Returns how many changed.
    pub fn mark_stale_offline(&self, cutoff: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE user_status SET status = 'offline'
                 WHERE status = 'online' AND (last_active IS NULL OR last_active < ?1)",
                [cutoff],
            )?;
            Ok(changed)
        })
    }
}

fn query_match(conn: &Connection, match_id: i64) -> Result<Option<MatchRow>> {
    let mut stmt =
        conn.prepare("SELECT id, user_id_1, user_id_2, status FROM matches WHERE id = ?1")?;

    let row = stmt
        .query_row([match_id], |row| {
            Ok(MatchRow {
                id: row.get(0)?,
                user_id_1: row.get(1)?,
                user_id_2: row.get(2)?,
                status: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, match_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, match_id, sender_id, content, timestamp, read
         FROM chat_messages
         WHERE match_id = ?1
         ORDER BY timestamp ASC, seq ASC
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt
        .query_map(params![match_id, limit, offset], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                match_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
                read: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
