use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use parley_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::AppState;
use crate::error::ApiError;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.name.trim().len() < 3 {
        return Err(ApiError::Validation("Enter a valid user name.".into()));
    }
    if !req.email.contains('@') {
        return Err(ApiError::Validation("Enter a valid user email.".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::Validation("Enter a valid strong password.".into()));
    }
    if req.phone.len() != 10 || !req.phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(
            "Phone number must be 10 digits long.".into(),
        ));
    }

    if state.db.email_taken(&req.email)? {
        return Err(ApiError::Conflict(
            "Sorry, a user with this email already exists".into(),
        ));
    }
    if state.db.phone_taken(&req.phone, None)? {
        return Err(ApiError::Conflict("Phone number already in use".into()));
    }

    let avatar = decode_avatar(req.avatar.as_deref(), req.avatar_mime.as_deref())?;

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    state.db.create_user(
        &user_id.to_string(),
        req.name.trim(),
        &req.email,
        &password_hash,
        &req.phone,
        avatar.as_ref().map(|(data, mime)| (data.as_slice(), mime.as_str())),
    )?;

    let token = create_token(&state.jwt_secret, user_id, req.name.trim())?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user_id,
            name: req.name.trim().to_string(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_auth_by_email(&req.email)?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id: {}", e))?;

    let token = create_token(&state.jwt_secret, user_id, &user.name)?;

    Ok(Json(AuthResponse {
        user_id,
        name: user.name,
        token,
    }))
}

fn decode_avatar(
    avatar: Option<&str>,
    mime: Option<&str>,
) -> Result<Option<(Vec<u8>, String)>, ApiError> {
    match (avatar, mime) {
        (Some(data), Some(mime)) => {
            let bytes = B64
                .decode(data)
                .map_err(|_| ApiError::Validation("Avatar must be valid base64.".into()))?;
            Ok(Some((bytes, mime.to_string())))
        }
        (Some(_), None) => Err(ApiError::Validation(
            "Avatar mime type is required with avatar data.".into(),
        )),
        _ => Ok(None),
    }
}

pub fn create_token(secret: &str, user_id: Uuid, name: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
