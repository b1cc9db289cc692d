use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{
    AccessChatRequest, Claims, CreateGroupRequest, GroupMemberRequest, RenameGroupRequest,
};
use parley_types::models::Chat;

use crate::AppState;
use crate::error::ApiError;

/// Get-or-create the direct chat with a contact. Chats between
/// non-connected users are refused outright.
pub async fn access(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AccessChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();
    let peer = req.user_id.to_string();

    if !state.db.are_contacts(&me, &peer)? {
        return Err(ApiError::Forbidden(
            "You can only chat with connected users.".into(),
        ));
    }

    // Lookup and create run in one transaction, so concurrent access calls
    // for the same pair always converge on a single chat.
    let (chat_id, _created) = state
        .db
        .get_or_create_direct_chat(&Uuid::new_v4().to_string(), &me, &peer)?;
    Ok(Json(fetch_chat(&state, &chat_id)?))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let chats = state.db.list_chats_for_user(&claims.sub.to_string())?;
    Ok(Json(chats))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.users.is_empty() {
        return Err(ApiError::Validation(
            "Please provide group name and users.".into(),
        ));
    }
    if req.users.contains(&claims.sub) {
        return Err(ApiError::Validation(
            "You are already in the users list".into(),
        ));
    }

    for user in &req.users {
        if state.db.get_user_summary(&user.to_string())?.is_none() {
            return Err(ApiError::NotFound(format!("User not found: {}", user)));
        }
    }

    // The caller joins last and becomes admin.
    let mut members: Vec<String> = req.users.iter().map(|u| u.to_string()).collect();
    members.push(claims.sub.to_string());

    let chat_id = Uuid::new_v4().to_string();
    state
        .db
        .create_group_chat(&chat_id, req.name.trim(), &claims.sub.to_string(), &members)?;

    Ok(Json(fetch_chat(&state, &chat_id)?))
}

pub async fn rename_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RenameGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.chat_name.trim().is_empty() {
        return Err(ApiError::Validation(
            "chatId and new chatName are required".into(),
        ));
    }

    let chat_id = req.chat_id.to_string();
    let chat = require_group(&state, &chat_id)?;
    if !chat.member_ids().contains(&claims.sub) {
        return Err(ApiError::Forbidden("You are not in this group.".into()));
    }

    state.db.rename_chat(&chat_id, req.chat_name.trim())?;
    Ok(Json(fetch_chat(&state, &chat_id)?))
}

pub async fn add_to_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = req.chat_id.to_string();
    let chat = require_group(&state, &chat_id)?;

    if chat.group_admin != Some(claims.sub) {
        return Err(ApiError::Forbidden("Only group admin can add users.".into()));
    }
    if state.db.get_user_summary(&req.user_id.to_string())?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }
    if chat.member_ids().contains(&req.user_id) {
        return Err(ApiError::Validation("User is already in the group.".into()));
    }

    state.db.add_member(&chat_id, &req.user_id.to_string())?;
    Ok(Json(fetch_chat(&state, &chat_id)?))
}

/// Admin may remove anyone; a regular member may only remove themself.
/// Removing the admin promotes the first remaining member.
pub async fn remove_from_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = req.chat_id.to_string();
    let chat = require_group(&state, &chat_id)?;

    if chat.group_admin != Some(claims.sub) && req.user_id != claims.sub {
        return Err(ApiError::Forbidden(
            "Only group admin can remove other users.".into(),
        ));
    }
    if !chat.member_ids().contains(&req.user_id) {
        return Err(ApiError::Validation("User is not in the group.".into()));
    }

    state.db.remove_member(&chat_id, &req.user_id.to_string())?;
    Ok(Json(fetch_chat(&state, &chat_id)?))
}

pub async fn delete_direct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(peer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .db
        .delete_direct_chat_between(&claims.sub.to_string(), &peer_id.to_string())?;

    if deleted.is_none() {
        return Err(ApiError::NotFound("Chat not found".into()));
    }
    Ok(Json(serde_json::json!({
        "message": "Chat and messages deleted successfully"
    })))
}

pub async fn my_groups(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let groups = state.db.list_groups_for_user(&claims.sub.to_string())?;
    Ok(Json(groups))
}

/// Leave a group: own messages are deleted and admin is reassigned when the
/// leaver held it.
pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = group_id.to_string();
    let chat = require_group(&state, &chat_id)?;
    if !chat.member_ids().contains(&claims.sub) {
        return Err(ApiError::Forbidden("You are not in this group.".into()));
    }

    let user_id = claims.sub.to_string();
    state.db.delete_user_messages(&chat_id, &user_id)?;
    state.db.remove_member(&chat_id, &user_id)?;

    Ok(Json(serde_json::json!({
        "message": "Left group and deleted your messages."
    })))
}

fn require_group(state: &AppState, chat_id: &str) -> Result<Chat, ApiError> {
    let chat = state
        .db
        .get_chat(chat_id)?
        .ok_or_else(|| ApiError::NotFound("Chat not found".into()))?;
    if !chat.is_group_chat {
        return Err(ApiError::Validation("Not a group chat".into()));
    }
    Ok(chat)
}

fn fetch_chat(state: &AppState, chat_id: &str) -> Result<Chat, ApiError> {
    state
        .db
        .get_chat(chat_id)?
        .ok_or_else(|| ApiError::NotFound("Chat not found".into()))
}
