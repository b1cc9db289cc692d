//! Database row types — these map directly to SQLite rows.
//! Wire models (parley-types) are assembled from them in queries.rs.

use chrono::{DateTime, Utc};

pub struct UserAuthRow {
    pub id: String,
    pub name: String,
    pub password: String,
}

pub struct ChatRow {
    pub id: String,
    pub is_group: bool,
    pub chat_name: String,
    pub group_admin: Option<String>,
    pub latest_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Timestamps are stored as RFC 3339 strings, which also sort correctly as
/// text. A corrupt value falls back to the epoch rather than failing a read.
pub fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            tracing::warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

pub fn now_ts() -> String {
    Utc::now().to_rfc3339()
}
