use serde::{Deserialize, Serialize};

use crate::types::MessageData;

/// Messages sent from client to the live room feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present the identity provider's token
    Authenticate { token: String },

    /// Subscribe to a room's message collection
    Subscribe {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Stop receiving a room's updates
    Unsubscribe {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Ping to keep connection alive
    Ping,
}

/// Messages pushed by the live room feed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication successful
    Authenticated,

    /// Error message
    Error { message: String },

    /// Pong response to ping
    Pong,

    /// Full ordered contents of a room, sent right after subscribing
    Snapshot {
        #[serde(rename = "roomId")]
        room_id: String,
        messages: Vec<MessageData>,
    },

    /// New message document created
    MessageCreated { message: MessageData },

    /// Message document updated
    MessageUpdated { message: MessageData },

    /// Message document deleted
    MessageDeleted {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "messageId")]
        message_id: String,
    },
}
