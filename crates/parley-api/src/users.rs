use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{
    Claims, ContactRequest, RespondRequest, SearchQuery, UpdateProfileRequest,
};

use crate::AppState;
use crate::error::ApiError;

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .db
        .get_profile(&claims.sub.to_string())?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(profile))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::Validation("Search query required".into()));
    }

    let users = state.db.search_users(query.q.trim(), &claims.sub.to_string())?;
    if users.is_empty() {
        return Err(ApiError::NotFound("No users found".into()));
    }
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_summary(&id.to_string())?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub.to_string();
    let receiver = req.user_id.to_string();

    if sender == receiver {
        return Err(ApiError::Validation(
            "Cannot send a request to yourself".into(),
        ));
    }
    if state.db.get_user_summary(&receiver)?.is_none() {
        return Err(ApiError::NotFound("User not found".into()));
    }

    match state.db.link_state(&sender, &receiver)?.as_deref() {
        Some(parley_db::queries::LINK_CONTACT) => {
            return Err(ApiError::Validation("Already connected".into()));
        }
        Some(parley_db::queries::LINK_OUTGOING) => {
            return Err(ApiError::Validation("Request already sent".into()));
        }
        Some(parley_db::queries::LINK_INCOMING) => {
            return Err(ApiError::Validation(
                "This user already sent you a request".into(),
            ));
        }
        _ => {}
    }

    state.db.create_request(&sender, &receiver)?;
    Ok(Json(serde_json::json!({ "message": "Request sent successfully" })))
}

pub async fn respond_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver = claims.sub.to_string();
    let sender = req.user_id.to_string();

    let resolved = state.db.respond_request(&receiver, &sender, req.accept)?;
    if !resolved {
        return Err(ApiError::NotFound("No pending request from this user".into()));
    }

    let message = if req.accept {
        "Request accepted"
    } else {
        "Request rejected"
    };
    Ok(Json(serde_json::json!({ "message": message })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();

    if let Some(name) = req.name.as_deref() {
        if name.trim().len() < 3 {
            return Err(ApiError::Validation("Enter a valid user name.".into()));
        }
    }
    if let Some(phone) = req.phone.as_deref() {
        if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::Validation(
                "Phone number must be 10 digits long.".into(),
            ));
        }
        if state.db.phone_taken(phone, Some(&user_id))? {
            return Err(ApiError::Conflict("Phone number already in use".into()));
        }
    }

    let avatar = match (req.avatar.as_deref(), req.avatar_mime.as_deref()) {
        (Some(data), Some(mime)) => {
            use base64::Engine;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|_| ApiError::Validation("Avatar must be valid base64.".into()))?;
            Some((bytes, mime.to_string()))
        }
        _ => None,
    };

    state.db.update_profile(
        &user_id,
        req.name.as_deref().map(str::trim),
        req.phone.as_deref(),
        avatar.as_ref().map(|(data, mime)| (data.as_slice(), mime.as_str())),
    )?;

    let profile = state
        .db
        .get_profile(&user_id)?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(profile))
}

/// Removing the relationship also deletes the direct chat and its messages,
/// the same teardown the DELETE /chats/{peerId} route performs.
pub async fn remove_contact(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub.to_string();
    let peer_id = id.to_string();

    let removed = state.db.remove_contact(&user_id, &peer_id)?;
    if !removed {
        return Err(ApiError::NotFound("User not found".into()));
    }
    state.db.delete_direct_chat_between(&user_id, &peer_id)?;

    Ok(Json(serde_json::json!({ "message": "Friend removed successfully" })))
}
