use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user. Password hashes and avatar bytes never leave the
/// server through this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Full profile returned to the owning user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub contacts: Vec<Uuid>,
    pub incoming_requests: Vec<Uuid>,
    pub outgoing_requests: Vec<Uuid>,
    pub blocked_users: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A conversation, direct or group, with members and the denormalized
/// latest-message cache embedded the way chat-list views consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Uuid,
    pub is_group_chat: bool,
    pub chat_name: String,
    pub users: Vec<UserSummary>,
    pub group_admin: Option<Uuid>,
    /// May be stale or absent; the message list is the source of truth.
    pub latest_message: Option<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn member_ids(&self) -> Vec<Uuid> {
        self.users.iter().map(|u| u.id).collect()
    }

    /// Most recent activity: the latest message if present, otherwise the
    /// chat's own creation time. Drives recency ordering of chat lists.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.latest_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender: UserSummary,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
