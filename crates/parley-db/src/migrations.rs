use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            phone       TEXT NOT NULL UNIQUE,
            avatar      BLOB,
            avatar_mime TEXT,
            created_at  TEXT NOT NULL
        );

        -- One row per direction. A mutual contact pair is two 'contact'
        -- rows; a pending request is an 'outgoing' row on the sender and
        -- an 'incoming' row on the receiver. Both rows are always written
        -- in the same transaction, so the symmetry invariant holds.
        CREATE TABLE IF NOT EXISTS contact_links (
            user_id     TEXT NOT NULL REFERENCES users(id),
            peer_id     TEXT NOT NULL REFERENCES users(id),
            state       TEXT NOT NULL
                        CHECK (state IN ('contact', 'outgoing', 'incoming', 'blocked')),
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, peer_id)
        );

        CREATE INDEX IF NOT EXISTS idx_links_user_state
            ON contact_links(user_id, state);

        CREATE TABLE IF NOT EXISTS chats (
            id                 TEXT PRIMARY KEY,
            is_group           INTEGER NOT NULL,
            chat_name          TEXT NOT NULL,
            group_admin        TEXT REFERENCES users(id),
            -- Denormalized cache; may dangle after bulk deletes, readers
            -- LEFT JOIN and treat a missing row as absent.
            latest_message_id  TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_members (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            position    INTEGER NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_chat_members_user
            ON chat_members(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
