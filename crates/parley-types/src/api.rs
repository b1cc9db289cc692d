use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Chat, Message};

// -- JWT Claims --

/// JWT claims shared between parley-api (REST middleware) and the gateway
/// websocket upgrade. Canonical definition lives here to avoid duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    /// Optional avatar, base64-encoded.
    pub avatar: Option<String>,
    pub avatar_mime: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Users / contacts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ContactRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RespondRequest {
    /// The user whose pending request is being answered.
    pub user_id: Uuid,
    pub accept: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar: Option<String>,
    pub avatar_mime: Option<String>,
}

// -- Chats --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AccessChatRequest {
    /// The contact to open (or lazily create) a direct chat with.
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    /// Other members; the caller is added implicitly and becomes admin.
    pub users: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RenameGroupRequest {
    pub chat_id: Uuid,
    pub chat_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct GroupMemberRequest {
    pub chat_id: Uuid,
    pub user_id: Uuid,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MessageQuery {
    pub chat_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DeleteMessagesRequest {
    pub chat_id: Uuid,
}

/// Send response carries both the persisted message and the refreshed chat
/// so the client can republish onto the event channel without a second fetch.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub message: Message,
    pub chat: Chat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bodies_use_camel_case() {
        let req: SendMessageRequest = serde_json::from_value(serde_json::json!({
            "chatId": Uuid::nil(),
            "content": "hi",
        }))
        .unwrap();
        assert_eq!(req.chat_id, Uuid::nil());

        // Snake_case keys are not part of the wire contract.
        let err = serde_json::from_value::<SendMessageRequest>(serde_json::json!({
            "chat_id": Uuid::nil(),
            "content": "hi",
        }));
        assert!(err.is_err());

        let json = serde_json::to_value(&AuthResponse {
            user_id: Uuid::nil(),
            name: "alice".into(),
            token: "t".into(),
        })
        .unwrap();
        assert!(json.get("userId").is_some());
    }
}
