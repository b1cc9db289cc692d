use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Chat, Message};

/// Commands sent FROM client TO server over the websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    /// Join the caller's own identity room. Sent once after connect.
    Setup,

    /// Join a chat room for in-conversation fan-out (typing indicators).
    JoinChat { chat_id: Uuid },

    /// Republish a freshly persisted message to the other chat members.
    /// The embedded chat lets receivers insert a brand-new conversation
    /// into their list without a fetch.
    NewMessage { message: Message, chat: Chat },

    /// Fire-and-forget typing signals, scoped to a chat room.
    Typing { chat_id: Uuid },
    StopTyping { chat_id: Uuid },
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Acknowledges `Setup`; the identity room is now joined.
    Connected { user_id: Uuid },

    /// A message for a chat the receiver is a member of.
    MessageReceived { message: Message, chat: Chat },

    /// Someone else in the room is typing (or stopped).
    Typing { chat_id: Uuid },
    StopTyping { chat_id: Uuid },
}
