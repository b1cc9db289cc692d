use crate::Database;
use crate::models::{ChatRow, UserAuthRow, now_ts, parse_ts};
use anyhow::Result;
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

use parley_types::models::{Chat, Message, UserProfile, UserSummary};

/// Directional link states. Both directions of a pair are always written in
/// one transaction.
pub const LINK_CONTACT: &str = "contact";
pub const LINK_OUTGOING: &str = "outgoing";
pub const LINK_INCOMING: &str = "incoming";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        phone: &str,
        avatar: Option<(&[u8], &str)>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, phone, avatar, avatar_mime, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    name,
                    email,
                    password_hash,
                    phone,
                    avatar.map(|(data, _)| data),
                    avatar.map(|(_, mime)| mime),
                    now_ts(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_auth_by_email(&self, email: &str) -> Result<Option<UserAuthRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, password FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok(UserAuthRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        password: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                [email],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn phone_taken(&self, phone: &str, exclude: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE phone = ?1 AND id != COALESCE(?2, '')",
                rusqlite::params![phone, exclude],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_user_summary(&self, id: &str) -> Result<Option<UserSummary>> {
        self.with_conn(|conn| query_user_summary(conn, id))
    }

    pub fn get_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, email, phone, created_at FROM users WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((uid, name, email, phone, created_at)) = row else {
                return Ok(None);
            };

            Ok(Some(UserProfile {
                id: parse_uuid(&uid),
                name,
                email,
                phone,
                contacts: links_in_state(conn, id, LINK_CONTACT)?,
                incoming_requests: links_in_state(conn, id, LINK_INCOMING)?,
                outgoing_requests: links_in_state(conn, id, LINK_OUTGOING)?,
                blocked_users: links_in_state(conn, id, "blocked")?,
                created_at: parse_ts(&created_at),
            }))
        })
    }

    /// Case-insensitive substring match on name or email, excluding the caller.
    pub fn search_users(&self, query: &str, exclude: &str) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", query.to_lowercase());
            let mut stmt = conn.prepare(
                "SELECT id, name, email FROM users
                 WHERE (lower(name) LIKE ?1 OR lower(email) LIKE ?1) AND id != ?2
                 ORDER BY name",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, exclude], map_user_summary)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_profile(
        &self,
        id: &str,
        name: Option<&str>,
        phone: Option<&str>,
        avatar: Option<(&[u8], &str)>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            if let Some(name) = name {
                conn.execute("UPDATE users SET name = ?1 WHERE id = ?2", [name, id])?;
            }
            if let Some(phone) = phone {
                conn.execute("UPDATE users SET phone = ?1 WHERE id = ?2", [phone, id])?;
            }
            if let Some((data, mime)) = avatar {
                conn.execute(
                    "UPDATE users SET avatar = ?1, avatar_mime = ?2 WHERE id = ?3",
                    rusqlite::params![data, mime, id],
                )?;
            }
            Ok(())
        })
    }

    // -- Contact links --

    pub fn link_state(&self, user_id: &str, peer_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT state FROM contact_links WHERE user_id = ?1 AND peer_id = ?2",
                [user_id, peer_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Record a pending request: outgoing on the sender, incoming on the
    /// receiver, atomically.
    pub fn create_request(&self, sender: &str, receiver: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_ts();
            tx.execute(
                "INSERT INTO contact_links (user_id, peer_id, state, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender, receiver, LINK_OUTGOING, now],
            )?;
            tx.execute(
                "INSERT INTO contact_links (user_id, peer_id, state, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![receiver, sender, LINK_INCOMING, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Resolve a pending request. Returns false if no incoming request from
    /// `sender` existed on `receiver`. On accept, both contact rows are
    /// written in the same transaction as the request removal.
    pub fn respond_request(&self, receiver: &str, sender: &str, accept: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM contact_links
                 WHERE user_id = ?1 AND peer_id = ?2 AND state = ?3",
                rusqlite::params![receiver, sender, LINK_INCOMING],
            )?;
            if removed == 0 {
                return Ok(false);
            }
            tx.execute(
                "DELETE FROM contact_links
                 WHERE user_id = ?1 AND peer_id = ?2 AND state = ?3",
                rusqlite::params![sender, receiver, LINK_OUTGOING],
            )?;

            if accept {
                let now = now_ts();
                tx.execute(
                    "INSERT INTO contact_links (user_id, peer_id, state, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![receiver, sender, LINK_CONTACT, now],
                )?;
                tx.execute(
                    "INSERT INTO contact_links (user_id, peer_id, state, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![sender, receiver, LINK_CONTACT, now],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    /// Remove both directions of a mutual contact pair.
    pub fn remove_contact(&self, user_id: &str, peer_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let a = tx.execute(
                "DELETE FROM contact_links WHERE user_id = ?1 AND peer_id = ?2 AND state = ?3",
                rusqlite::params![user_id, peer_id, LINK_CONTACT],
            )?;
            tx.execute(
                "DELETE FROM contact_links WHERE user_id = ?1 AND peer_id = ?2 AND state = ?3",
                rusqlite::params![peer_id, user_id, LINK_CONTACT],
            )?;
            tx.commit()?;
            Ok(a > 0)
        })
    }

    pub fn are_contacts(&self, user_id: &str, peer_id: &str) -> Result<bool> {
        Ok(self.link_state(user_id, peer_id)?.as_deref() == Some(LINK_CONTACT))
    }

    // -- Chats --

    pub fn find_direct_chat(&self, a: &str, b: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT c.id FROM chats c
                 JOIN chat_members m1 ON m1.chat_id = c.id AND m1.user_id = ?1
                 JOIN chat_members m2 ON m2.chat_id = c.id AND m2.user_id = ?2
                 WHERE c.is_group = 0",
                [a, b],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Find the direct chat for a pair, or create it with `id_candidate`.
    /// Lookup and insert run in one transaction under the connection lock,
    /// so two concurrent access calls can never both create: at most one
    /// non-group chat exists per unordered pair. Returns the chat id and
    /// whether it was created by this call.
    pub fn get_or_create_direct_chat(
        &self,
        id_candidate: &str,
        a: &str,
        b: &str,
    ) -> Result<(String, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT c.id FROM chats c
                     JOIN chat_members m1 ON m1.chat_id = c.id AND m1.user_id = ?1
                     JOIN chat_members m2 ON m2.chat_id = c.id AND m2.user_id = ?2
                     WHERE c.is_group = 0",
                    [a, b],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok((id, false));
            }

            let now = now_ts();
            tx.execute(
                "INSERT INTO chats (id, is_group, chat_name, created_at, updated_at)
                 VALUES (?1, 0, 'sender', ?2, ?2)",
                rusqlite::params![id_candidate, now],
            )?;
            tx.execute(
                "INSERT INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, 0)",
                [id_candidate, a],
            )?;
            tx.execute(
                "INSERT INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, 1)",
                [id_candidate, b],
            )?;
            tx.commit()?;
            Ok((id_candidate.to_string(), true))
        })
    }

    /// Create a group chat; `members` includes the admin.
    pub fn create_group_chat(
        &self,
        id: &str,
        name: &str,
        admin: &str,
        members: &[String],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_ts();
            tx.execute(
                "INSERT INTO chats (id, is_group, chat_name, group_admin, created_at, updated_at)
                 VALUES (?1, 1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, name, admin, now],
            )?;
            for (pos, member) in members.iter().enumerate() {
                tx.execute(
                    "INSERT INTO chat_members (chat_id, user_id, position) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, member, pos as i64],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        self.with_conn(|conn| {
            let Some(row) = query_chat_row(conn, id)? else {
                return Ok(None);
            };
            Ok(Some(assemble_chat(conn, row)?))
        })
    }

    /// All chats the user participates in, most recent activity first.
    pub fn list_chats_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.is_group, c.chat_name, c.group_admin, c.latest_message_id,
                        c.created_at, c.updated_at
                 FROM chats c
                 JOIN chat_members m ON m.chat_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.updated_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(|row| assemble_chat(conn, row)).collect()
        })
    }

    pub fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.is_group, c.chat_name, c.group_admin, c.latest_message_id,
                        c.created_at, c.updated_at
                 FROM chats c
                 JOIN chat_members m ON m.chat_id = c.id
                 WHERE m.user_id = ?1 AND c.is_group = 1
                 ORDER BY c.updated_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_chat_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(|row| assemble_chat(conn, row)).collect()
        })
    }

    pub fn is_member(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                [chat_id, user_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn rename_chat(&self, chat_id: &str, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE chats SET chat_name = ?1 WHERE id = ?2",
                [name, chat_id],
            )?;
            Ok(())
        })
    }

    pub fn add_member(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_members (chat_id, user_id, position)
                 SELECT ?1, ?2, COALESCE(MAX(position), -1) + 1
                 FROM chat_members WHERE chat_id = ?1",
                [chat_id, user_id],
            )?;
            Ok(())
        })
    }

    /// Remove a member. If the removed member was the admin, admin is
    /// reassigned to the first remaining member (by join position); a group
    /// left empty keeps a NULL admin.
    pub fn remove_member(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                [chat_id, user_id],
            )?;

            let admin: Option<String> = tx
                .query_row(
                    "SELECT group_admin FROM chats WHERE id = ?1",
                    [chat_id],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();

            if admin.as_deref() == Some(user_id) {
                let next: Option<String> = tx
                    .query_row(
                        "SELECT user_id FROM chat_members WHERE chat_id = ?1
                         ORDER BY position LIMIT 1",
                        [chat_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.execute(
                    "UPDATE chats SET group_admin = ?1 WHERE id = ?2",
                    rusqlite::params![next, chat_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete the direct chat between two users along with all its messages.
    /// Returns the deleted chat id, if one existed.
    pub fn delete_direct_chat_between(&self, a: &str, b: &str) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let chat_id: Option<String> = tx
                .query_row(
                    "SELECT c.id FROM chats c
                     JOIN chat_members m1 ON m1.chat_id = c.id AND m1.user_id = ?1
                     JOIN chat_members m2 ON m2.chat_id = c.id AND m2.user_id = ?2
                     WHERE c.is_group = 0",
                    [a, b],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(ref id) = chat_id {
                tx.execute("DELETE FROM messages WHERE chat_id = ?1", [id])?;
                tx.execute("DELETE FROM chat_members WHERE chat_id = ?1", [id])?;
                tx.execute("DELETE FROM chats WHERE id = ?1", [id])?;
            }
            tx.commit()?;
            Ok(chat_id)
        })
    }

    // -- Messages --

    /// Persist a message and refresh the chat's latest-message cache and
    /// activity timestamp in the same transaction.
    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        content: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_ts();
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, chat_id, sender_id, content, now],
            )?;
            tx.execute(
                "UPDATE chats SET latest_message_id = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![id, now, chat_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Full history for a chat in chronological order.
    pub fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.chat_id, m.sender_id, u.name, u.email, m.content, m.created_at
                 FROM messages m
                 LEFT JOIN users u ON m.sender_id = u.id
                 WHERE m.chat_id = ?1
                 ORDER BY m.created_at ASC",
            )?;
            let rows = stmt
                .query_map([chat_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Bulk-delete a chat's messages and clear the latest-message cache.
    pub fn clear_messages(&self, chat_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.execute(
                "UPDATE chats SET latest_message_id = NULL WHERE id = ?1",
                [chat_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Delete one user's messages in a chat (used when leaving a group).
    /// The latest-message cache is left alone; a dangling id reads as absent.
    pub fn delete_user_messages(&self, chat_id: &str, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM messages WHERE chat_id = ?1 AND sender_id = ?2",
                [chat_id, user_id],
            )?;
            Ok(())
        })
    }
}

// -- Row mapping helpers --

fn map_user_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserSummary> {
    let id: String = row.get(0)?;
    Ok(UserSummary {
        id: parse_uuid(&id),
        name: row.get(1)?,
        email: row.get(2)?,
    })
}

fn map_chat_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        is_group: row.get(1)?,
        chat_name: row.get(2)?,
        group_admin: row.get(3)?,
        latest_message_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    Ok(Message {
        id: parse_uuid(&id),
        chat_id: parse_uuid(&chat_id),
        sender: UserSummary {
            id: parse_uuid(&sender_id),
            name: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".into()),
            email: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        },
        content: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

fn query_user_summary(conn: &Connection, id: &str) -> Result<Option<UserSummary>> {
    conn.query_row(
        "SELECT id, name, email FROM users WHERE id = ?1",
        [id],
        map_user_summary,
    )
    .optional()
}

fn query_chat_row(conn: &Connection, id: &str) -> Result<Option<ChatRow>> {
    conn.query_row(
        "SELECT id, is_group, chat_name, group_admin, latest_message_id, created_at, updated_at
         FROM chats WHERE id = ?1",
        [id],
        map_chat_row,
    )
    .optional()
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    conn.query_row(
        "SELECT m.id, m.chat_id, m.sender_id, u.name, u.email, m.content, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.id = ?1",
        [id],
        map_message_row,
    )
    .optional()
}

fn links_in_state(conn: &Connection, user_id: &str, state: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT peer_id FROM contact_links WHERE user_id = ?1 AND state = ?2 ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map([user_id, state], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.iter().map(|s| parse_uuid(s)).collect())
}

/// Build the full wire-model chat: members in join order plus the
/// latest-message cache resolved via LEFT JOIN (a dangling id reads as None).
fn assemble_chat(conn: &Connection, row: ChatRow) -> Result<Chat> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email
         FROM chat_members m
         JOIN users u ON u.id = m.user_id
         WHERE m.chat_id = ?1
         ORDER BY m.position",
    )?;
    let users = stmt
        .query_map([&row.id], map_user_summary)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let latest_message = match &row.latest_message_id {
        Some(mid) => query_message(conn, mid)?,
        None => None,
    };

    Ok(Chat {
        id: parse_uuid(&row.id),
        is_group_chat: row.is_group,
        chat_name: row.chat_name,
        users,
        group_admin: row.group_admin.as_deref().map(parse_uuid),
        latest_message,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    })
}

fn parse_uuid(s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}': {}", s, e);
        Uuid::default()
    })
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
