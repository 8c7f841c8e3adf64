use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS matches (
            id          INTEGER PRIMARY KEY,
            user_id_1   INTEGER NOT NULL,
            user_id_2   INTEGER NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%f000Z', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_matches_user_1 ON matches(user_id_1);
        CREATE INDEX IF NOT EXISTS idx_matches_user_2 ON matches(user_id_2);

        -- seq keeps insertion order for messages stamped in the same microsecond
        CREATE TABLE IF NOT EXISTS chat_messages (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            id          TEXT NOT NULL UNIQUE,
            match_id    INTEGER NOT NULL REFERENCES matches(id),
            sender_id   INTEGER NOT NULL,
            content     TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_match
            ON chat_messages(match_id, timestamp);

        CREATE TABLE IF NOT EXISTS user_status (
            user_id             INTEGER PRIMARY KEY,
            status              TEXT NOT NULL DEFAULT 'offline',
            last_active         TEXT,
            last_message_check  TEXT,
            last_match_check    TEXT
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
