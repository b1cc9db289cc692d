use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::events::{ClientCommand, ServerEvent};

use crate::rooms::{ConnId, Rooms};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so the loop starts immediately.
pub async fn handle_connection(socket: WebSocket, rooms: Rooms, user_id: Uuid, name: String) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", name, user_id);

    let (conn_id, mut event_rx) = rooms.register().await;

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = event_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let rooms_recv = rooms.clone();
    let name_recv = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&rooms_recv, conn_id, user_id, &name_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            truncate_for_log(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    rooms.unregister(conn_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

/// Truncate a frame for logging without splitting a UTF-8 character.
fn truncate_for_log(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn handle_command(
    rooms: &Rooms,
    conn_id: ConnId,
    user_id: Uuid,
    name: &str,
    cmd: ClientCommand,
) {
    match cmd {
        // Identity room: direct-to-user delivery regardless of which chat
        // the client currently has open.
        ClientCommand::Setup => {
            rooms.join(conn_id, user_id).await;
            rooms
                .send_to_conn(conn_id, ServerEvent::Connected { user_id })
                .await;
        }

        ClientCommand::JoinChat { chat_id } => {
            debug!("{} ({}) joined chat room {}", name, user_id, chat_id);
            rooms.join(conn_id, chat_id).await;
        }

        // Republish a persisted message to every other member's identity
        // room. Members learn about brand-new chats this way without having
        // joined the chat room first.
        ClientCommand::NewMessage { message, chat } => {
            if message.chat_id != chat.id {
                warn!(
                    "{} ({}) message {} does not belong to chat {}",
                    name, user_id, message.id, chat.id
                );
                return;
            }
            for member in chat.member_ids() {
                if member == user_id {
                    continue;
                }
                rooms
                    .publish(
                        member,
                        Some(conn_id),
                        ServerEvent::MessageReceived {
                            message: message.clone(),
                            chat: chat.clone(),
                        },
                    )
                    .await;
            }
        }

        // Typing signals are unbuffered and scoped to the chat room.
        ClientCommand::Typing { chat_id } => {
            rooms
                .publish(chat_id, Some(conn_id), ServerEvent::Typing { chat_id })
                .await;
        }

        ClientCommand::StopTyping { chat_id } => {
            rooms
                .publish(chat_id, Some(conn_id), ServerEvent::StopTyping { chat_id })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::models::{Chat, Message as ChatMessage, UserSummary};

    fn summary(id: Uuid, name: &str) -> UserSummary {
        UserSummary {
            id,
            name: name.into(),
            email: format!("{}@example.com", name),
        }
    }

    fn direct_chat(a: Uuid, b: Uuid) -> Chat {
        Chat {
            id: Uuid::new_v4(),
            is_group_chat: false,
            chat_name: "sender".into(),
            users: vec![summary(a, "a"), summary(b, "b")],
            group_admin: None,
            latest_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn message_in(chat: &Chat, sender: Uuid) -> ChatMessage {
        ChatMessage {
            id: Uuid::new_v4(),
            chat_id: chat.id,
            sender: summary(sender, "a"),
            content: "hello".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn log_truncation_respects_char_boundaries() {
        let frame = format!("{}é and more", "x".repeat(199));
        // Byte 200 falls inside the two-byte 'é'; the cut must back off.
        let cut = truncate_for_log(&frame, 200);
        assert_eq!(cut.len(), 199);
        assert!(cut.chars().all(|c| c == 'x'));

        assert_eq!(truncate_for_log("short", 200), "short");
    }

    #[tokio::test]
    async fn new_message_fans_out_to_member_identity_rooms() {
        let rooms = Rooms::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_conn, mut alice_rx) = rooms.register().await;
        let (bob_conn, mut bob_rx) = rooms.register().await;
        handle_command(&rooms, alice_conn, alice, "alice", ClientCommand::Setup).await;
        handle_command(&rooms, bob_conn, bob, "bob", ClientCommand::Setup).await;
        // Drain Connected acks.
        alice_rx.try_recv().unwrap();
        bob_rx.try_recv().unwrap();

        let chat = direct_chat(alice, bob);
        let message = message_in(&chat, alice);
        handle_command(
            &rooms,
            alice_conn,
            alice,
            "alice",
            ClientCommand::NewMessage {
                message: message.clone(),
                chat: chat.clone(),
            },
        )
        .await;

        match bob_rx.try_recv().unwrap() {
            ServerEvent::MessageReceived { message: m, chat: c } => {
                assert_eq!(m.id, message.id);
                assert_eq!(c.id, chat.id);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // Sender gets no echo.
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mismatched_chat_id_is_dropped() {
        let rooms = Rooms::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_conn, _alice_rx) = rooms.register().await;
        let (bob_conn, mut bob_rx) = rooms.register().await;
        handle_command(&rooms, bob_conn, bob, "bob", ClientCommand::Setup).await;
        bob_rx.try_recv().unwrap();

        let chat = direct_chat(alice, bob);
        let mut message = message_in(&chat, alice);
        message.chat_id = Uuid::new_v4();

        handle_command(
            &rooms,
            alice_conn,
            alice,
            "alice",
            ClientCommand::NewMessage { message, chat },
        )
        .await;
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_scoped_to_chat_room_excluding_sender() {
        let rooms = Rooms::new();
        let chat_id = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_conn, mut alice_rx) = rooms.register().await;
        let (bob_conn, mut bob_rx) = rooms.register().await;
        handle_command(
            &rooms,
            alice_conn,
            alice,
            "alice",
            ClientCommand::JoinChat { chat_id },
        )
        .await;
        handle_command(&rooms, bob_conn, bob, "bob", ClientCommand::JoinChat { chat_id }).await;

        handle_command(&rooms, alice_conn, alice, "alice", ClientCommand::Typing { chat_id }).await;

        assert!(matches!(
            bob_rx.try_recv().unwrap(),
            ServerEvent::Typing { chat_id: c } if c == chat_id
        ));
        assert!(alice_rx.try_recv().is_err());
    }
}
