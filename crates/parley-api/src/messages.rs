use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{
    Claims, DeleteMessagesRequest, MessageQuery, SendMessageRequest, SendMessageResponse,
};

use crate::AppState;
use crate::error::ApiError;

/// Persist a message and refresh the chat's latest-message cache. The
/// response embeds the refreshed chat so the client can republish the
/// message onto the event channel without a second fetch.
pub async fn send(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::Validation(
            "Chat ID and content are required".into(),
        ));
    }

    let chat_id = req.chat_id.to_string();
    let sender_id = claims.sub.to_string();

    if state.db.get_chat(&chat_id)?.is_none() {
        return Err(ApiError::NotFound("Chat not found".into()));
    }
    if !state.db.is_member(&chat_id, &sender_id)? {
        return Err(ApiError::Forbidden("You are not in this chat.".into()));
    }

    let message_id = Uuid::new_v4().to_string();
    state
        .db
        .insert_message(&message_id, &chat_id, &sender_id, req.content.trim())?;

    let message = state
        .db
        .get_message(&message_id)?
        .ok_or_else(|| anyhow::anyhow!("message vanished after insert"))?;
    let chat = state
        .db
        .get_chat(&chat_id)?
        .ok_or_else(|| anyhow::anyhow!("chat vanished after insert"))?;

    Ok((StatusCode::CREATED, Json(SendMessageResponse { message, chat })))
}

/// Full ordered history for a chat the caller is a member of.
pub async fn fetch(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = query.chat_id.to_string();

    if state.db.get_chat(&chat_id)?.is_none() {
        return Err(ApiError::NotFound("Chat not found".into()));
    }
    if !state.db.is_member(&chat_id, &claims.sub.to_string())? {
        return Err(ApiError::Forbidden("You are not in this chat.".into()));
    }

    let messages = state.db.messages_for_chat(&chat_id)?;
    Ok(Json(messages))
}

/// Bulk-delete a chat's messages and clear the latest-message cache.
pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<DeleteMessagesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = req.chat_id.to_string();

    if state.db.get_chat(&chat_id)?.is_none() {
        return Err(ApiError::NotFound("Chat not found".into()));
    }
    if !state.db.is_member(&chat_id, &claims.sub.to_string())? {
        return Err(ApiError::Forbidden("You are not in this chat.".into()));
    }

    state.db.clear_messages(&chat_id)?;
    Ok(Json(serde_json::json!({
        "message": "All messages deleted successfully."
    })))
}
