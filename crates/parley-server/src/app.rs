use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::middleware::require_auth;
use parley_api::{AppState, auth, chats, messages, users};
use parley_gateway::connection;
use parley_gateway::rooms::Rooms;
use parley_types::api::Claims;

/// Server configuration loaded from environment variables. All settings have
/// defaults so the server starts with zero configuration for local use.
#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `PARLEY_JWT_SECRET`
    pub jwt_secret: String,
    /// Env: `PARLEY_DB_PATH`, default `parley.db`
    pub db_path: String,
    /// Env: `PARLEY_HOST`, default `0.0.0.0`
    pub host: String,
    /// Env: `PARLEY_PORT`, default `5000`
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            jwt_secret: parley_api::middleware::jwt_secret(),
            db_path: std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into()),
            host: std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PARLEY_PORT")
                .unwrap_or_else(|_| "5000".into())
                .parse()?,
        })
    }
}

#[derive(Clone)]
pub struct GatewayState {
    pub rooms: Rooms,
    pub jwt_secret: String,
}

pub fn build_router(app_state: AppState, rooms: Rooms) -> Router {
    let gateway_state = GatewayState {
        rooms,
        jwt_secret: app_state.jwt_secret.clone(),
    };

    let public_routes = Router::new()
        .route("/users", post(auth::register))
        .route("/users/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/users/me", get(users::me))
        .route("/users/search", get(users::search))
        .route("/users/{id}", get(users::get_user))
        .route("/users/contacts/request", post(users::send_request))
        .route("/users/contacts/respond", post(users::respond_request))
        .route("/users/profile", put(users::update_profile))
        .route("/users/contacts/{id}", delete(users::remove_contact))
        .route("/contacts/access", post(chats::access))
        .route("/chats", get(chats::list))
        .route("/chats/group", post(chats::create_group))
        .route("/chats/group/rename", put(chats::rename_group))
        .route("/chats/group/add", put(chats::add_to_group))
        .route("/chats/group/remove", put(chats::remove_from_group))
        .route("/chats/groups", get(chats::my_groups))
        .route("/chats/groups/{id}/leave", post(chats::leave_group))
        .route("/chats/{peer_id}", delete(chats::delete_direct))
        .route(
            "/messages",
            post(messages::send).get(messages::fetch).delete(messages::delete),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway_state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct WsAuth {
    token: String,
}

/// The JWT is validated at the upgrade layer so the socket loop starts
/// pre-authenticated.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(auth): Query<WsAuth>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token_data = match decode::<Claims>(
        &auth.token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    let user_id = token_data.claims.sub;
    let name = token_data.claims.name;
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.rooms, user_id, name))
        .into_response()
}
