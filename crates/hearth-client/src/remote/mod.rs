//! Remote collaborators: the message store and the media host
//!
//! The sync engine only sees the two traits below; the HTTP and
//! WebSocket adapters live in the submodules.

pub(crate) mod api;
mod http;
mod live;

pub use http::{HttpMessageStore, SignedMediaHost};
pub use live::LiveFeed;

use crate::error::Result;
use async_trait::async_trait;
use hearth_protocol::{ImageData, MessageData, OutgoingMessage};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a new document in the room's message collection. The store
    /// assigns the document id and timestamp.
    async fn create_message(&self, room_id: &str, message: &OutgoingMessage) -> Result<MessageData>;

    /// Confirmed messages of a room, oldest first
    async fn list_messages(&self, room_id: &str) -> Result<Vec<MessageData>>;
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Upload an image and return its public URL
    async fn upload_image(&self, image: &ImageData) -> Result<String>;
}
