//! End-to-end tests through the router: register, contact handshake, direct
//! chat access gating, messaging, and group admin reassignment.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::AppStateInner;
use parley_api::middleware::jwt_secret;
use parley_db::Database;
use parley_gateway::rooms::Rooms;
use parley_server::app::build_router;

fn test_app_with_secret(secret: &str) -> Router {
    let db = Database::open_in_memory().unwrap();
    let state = Arc::new(AppStateInner {
        db,
        jwt_secret: secret.to_string(),
    });
    build_router(state, Rooms::new())
}

fn test_app() -> Router {
    test_app_with_secret(&jwt_secret())
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Returns (user_id, token).
async fn register(app: &Router, name: &str, phone: &str) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/users",
        None,
        Some(json!({
            "name": name,
            "email": format!("{}@example.com", name),
            "password": "correct-horse",
            "phone": phone,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    (
        body["userId"].as_str().unwrap().to_string(),
        body["token"].as_str().unwrap().to_string(),
    )
}

async fn connect(app: &Router, a: (&str, &str), b: (&str, &str)) {
    let (status, _) = send(
        app,
        "POST",
        "/users/contacts/request",
        Some(a.1),
        Some(json!({ "userId": b.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        app,
        "POST",
        "/users/contacts/respond",
        Some(b.1),
        Some(json!({ "userId": a.0, "accept": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_token_is_uniformly_unauthorized() {
    let app = test_app();
    let (status, _) = send(&app, "GET", "/chats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/chats", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_verify_against_the_state_secret() {
    // An embedder may construct the state with a secret that never came
    // from the environment; minting and verification must agree.
    let app = test_app_with_secret("embedder-specific-secret");
    let (_alice_id, token) = register(&app, "alice", "5550000001").await;

    let (status, me) = send(&app, "GET", "/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], json!("alice"));
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let app = test_app();
    register(&app, "alice", "5550000001").await;

    let (status, _) = send(
        &app,
        "POST",
        "/users",
        None,
        Some(json!({
            "name": "alice again",
            "email": "alice@example.com",
            "password": "correct-horse",
            "phone": "5550000002",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn contact_handshake_gates_direct_chat_access() {
    let app = test_app();
    let (alice_id, alice_token) = register(&app, "alice", "5550000001").await;
    let (bob_id, bob_token) = register(&app, "bob", "5550000002").await;

    // Not connected yet: access refused.
    let (status, _) = send(
        &app,
        "POST",
        "/contacts/access",
        Some(&alice_token),
        Some(json!({ "userId": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    connect(&app, (&alice_id, &alice_token), (&bob_id, &bob_token)).await;

    // Both sides now list each other, request lists empty.
    let (_, me) = send(&app, "GET", "/users/me", Some(&alice_token), None).await;
    assert_eq!(me["contacts"], json!([bob_id]));
    assert_eq!(me["outgoingRequests"], json!([]));
    let (_, me) = send(&app, "GET", "/users/me", Some(&bob_token), None).await;
    assert_eq!(me["contacts"], json!([alice_id]));
    assert_eq!(me["incomingRequests"], json!([]));

    // Access now creates the direct chat.
    let (status, chat) = send(
        &app,
        "POST",
        "/contacts/access",
        Some(&alice_token),
        Some(json!({ "userId": bob_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["isGroupChat"], json!(false));
    assert_eq!(chat["users"].as_array().unwrap().len(), 2);

    // Accessing again, from either side, yields the same chat.
    let chat_id = chat["id"].as_str().unwrap().to_string();
    let (status, again) = send(
        &app,
        "POST",
        "/contacts/access",
        Some(&bob_token),
        Some(json!({ "userId": alice_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"].as_str().unwrap(), chat_id);
}

#[tokio::test]
async fn messages_update_latest_cache_and_history_order() {
    let app = test_app();
    let (alice_id, alice_token) = register(&app, "alice", "5550000001").await;
    let (bob_id, bob_token) = register(&app, "bob", "5550000002").await;
    connect(&app, (&alice_id, &alice_token), (&bob_id, &bob_token)).await;

    let (_, chat) = send(
        &app,
        "POST",
        "/contacts/access",
        Some(&alice_token),
        Some(json!({ "userId": bob_id })),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();

    let mut last_message_id = String::new();
    for (i, token) in [&alice_token, &bob_token, &alice_token].into_iter().enumerate() {
        let (status, sent) = send(
            &app,
            "POST",
            "/messages",
            Some(token.as_str()),
            Some(json!({ "chatId": chat_id, "content": format!("msg {}", i) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        last_message_id = sent["message"]["id"].as_str().unwrap().to_string();
        // The response embeds the refreshed chat for event-channel republish.
        assert_eq!(sent["chat"]["latestMessage"]["id"], sent["message"]["id"]);
    }

    let (status, history) = send(
        &app,
        "GET",
        &format!("/messages?chatId={}", chat_id),
        Some(&bob_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap().clone();
    assert_eq!(history.len(), 3);
    for pair in history.windows(2) {
        assert!(
            pair[0]["createdAt"].as_str().unwrap() <= pair[1]["createdAt"].as_str().unwrap()
        );
    }

    // Chat list reflects the latest-message cache.
    let (_, chats) = send(&app, "GET", "/chats", Some(&alice_token), None).await;
    assert_eq!(chats[0]["latestMessage"]["id"].as_str().unwrap(), last_message_id);

    // Outsiders cannot read the history.
    let (_carol_id, carol_token) = register(&app, "carol", "5550000003").await;
    let (status, _) = send(
        &app,
        "GET",
        &format!("/messages?chatId={}", chat_id),
        Some(&carol_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn group_admin_removal_promotes_first_remaining_member() {
    let app = test_app();
    let (_m_id, m_token) = register(&app, "mallory", "5550000001").await;
    let (x_id, _x_token) = register(&app, "xavier", "5550000002").await;
    let (y_id, _y_token) = register(&app, "yvonne", "5550000003").await;

    let (status, group) = send(
        &app,
        "POST",
        "/chats/group",
        Some(&m_token),
        Some(json!({ "name": "team", "users": [x_id, y_id] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["isGroupChat"], json!(true));
    let chat_id = group["id"].as_str().unwrap().to_string();
    let admin = group["groupAdmin"].as_str().unwrap().to_string();

    // Admin removes themself: first remaining member is promoted.
    let (status, updated) = send(
        &app,
        "PUT",
        "/chats/group/remove",
        Some(&m_token),
        Some(json!({ "chatId": chat_id, "userId": admin })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["groupAdmin"].as_str().unwrap(), x_id);
    assert_eq!(updated["users"].as_array().unwrap().len(), 2);
    assert!(
        !updated["users"]
            .as_array()
            .unwrap()
            .iter()
            .any(|u| u["id"].as_str().unwrap() == admin)
    );
}

#[tokio::test]
async fn non_admin_cannot_remove_others() {
    let app = test_app();
    let (_m_id, m_token) = register(&app, "mallory", "5550000001").await;
    let (x_id, x_token) = register(&app, "xavier", "5550000002").await;
    let (y_id, _y_token) = register(&app, "yvonne", "5550000003").await;

    let (_, group) = send(
        &app,
        "POST",
        "/chats/group",
        Some(&m_token),
        Some(json!({ "name": "team", "users": [x_id, y_id] })),
    )
    .await;
    let chat_id = group["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        "/chats/group/remove",
        Some(&x_token),
        Some(json!({ "chatId": chat_id, "userId": y_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // But a member may remove themself.
    let (status, updated) = send(
        &app,
        "PUT",
        "/chats/group/remove",
        Some(&x_token),
        Some(json!({ "chatId": chat_id, "userId": x_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn leaving_group_deletes_own_messages() {
    let app = test_app();
    let (_m_id, m_token) = register(&app, "mallory", "5550000001").await;
    let (x_id, x_token) = register(&app, "xavier", "5550000002").await;
    let (y_id, _y_token) = register(&app, "yvonne", "5550000003").await;

    let (_, group) = send(
        &app,
        "POST",
        "/chats/group",
        Some(&m_token),
        Some(json!({ "name": "team", "users": [x_id, y_id] })),
    )
    .await;
    let chat_id = group["id"].as_str().unwrap().to_string();

    for (token, content) in [(&m_token, "from m"), (&x_token, "from x")] {
        let (status, _) = send(
            &app,
            "POST",
            "/messages",
            Some(token.as_str()),
            Some(json!({ "chatId": chat_id, "content": content })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, _) = send(
        &app,
        "POST",
        &format!("/chats/groups/{}/leave", chat_id),
        Some(&x_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, history) = send(
        &app,
        "GET",
        &format!("/messages?chatId={}", chat_id),
        Some(&m_token),
        None,
    )
    .await;
    let history = history.as_array().unwrap().clone();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["content"], json!("from m"));

    let (_, groups) = send(&app, "GET", "/chats/groups", Some(&m_token), None).await;
    assert_eq!(groups[0]["users"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn removing_contact_tears_down_direct_chat() {
    let app = test_app();
    let (alice_id, alice_token) = register(&app, "alice", "5550000001").await;
    let (bob_id, bob_token) = register(&app, "bob", "5550000002").await;
    connect(&app, (&alice_id, &alice_token), (&bob_id, &bob_token)).await;

    let (_, chat) = send(
        &app,
        "POST",
        "/contacts/access",
        Some(&alice_token),
        Some(json!({ "userId": bob_id })),
    )
    .await;
    let chat_id = chat["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        "/messages",
        Some(&alice_token),
        Some(json!({ "chatId": chat_id, "content": "soon gone" })),
    )
    .await;

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/users/contacts/{}", bob_id),
        Some(&alice_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Relationship and conversation are both gone, from both sides.
    let (_, me) = send(&app, "GET", "/users/me", Some(&bob_token), None).await;
    assert_eq!(me["contacts"], json!([]));
    let (_, chats) = send(&app, "GET", "/chats", Some(&bob_token), None).await;
    assert_eq!(chats, json!([]));
}
