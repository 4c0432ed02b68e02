use crate::error::{ClientError, Result};
use crate::network_status::NetworkStatus;
use crate::queue::PendingQueue;
use crate::remote::{MediaHost, MessageStore};
use crate::state::AppState;
use crate::sync::SyncHandle;
use hearth_protocol::{ImageData, MessageData, NewPendingMessage, OutgoingMessage, PendingMessage};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Written to the remote store straight away
    Sent(MessageData),
    /// Parked in the pending queue for the reconciler
    Queued(PendingMessage),
}

/// Entry point for new outbound messages.
///
/// Sends directly while online and falls back to the pending queue
/// whenever that is not possible.
pub struct Composer {
    queue: Arc<PendingQueue>,
    store: Arc<dyn MessageStore>,
    media: Arc<dyn MediaHost>,
    network: NetworkStatus,
    state: AppState,
    sync: Option<SyncHandle>,
}

impl Composer {
    pub fn new(
        queue: Arc<PendingQueue>,
        store: Arc<dyn MessageStore>,
        media: Arc<dyn MediaHost>,
        network: NetworkStatus,
        state: AppState,
    ) -> Self {
        Self {
            queue,
            store,
            media,
            network,
            state,
            sync: None,
        }
    }

    /// Nudge this driver whenever something gets queued while online.
    pub fn with_sync(mut self, handle: SyncHandle) -> Self {
        self.sync = Some(handle);
        self
    }

    pub async fn send(&self, room_id: &str, text: &str, image: Option<ImageData>) -> Result<SendOutcome> {
        if text.trim().is_empty() && image.is_none() {
            return Err(ClientError::EmptyMessage);
        }
        let sender = self.state.current_user().await.ok_or(ClientError::NotSignedIn)?;

        let mut draft = NewPendingMessage {
            room_id: room_id.to_string(),
            message: text.to_string(),
            sender,
            image_data: image,
            uploaded_image_url: None,
        };

        if !self.network.is_online() {
            return self.enqueue(draft, "offline").await;
        }

        // Anything sent now would overtake what is already waiting
        if !self.queue.get_for_room(room_id).await.is_empty() {
            return self.enqueue(draft, "earlier messages still pending").await;
        }

        if let Some(image) = &draft.image_data {
            match self.media.upload_image(image).await {
                Ok(url) => {
                    draft.uploaded_image_url = Some(url);
                    draft.image_data = None;
                }
                Err(e) => {
                    tracing::warn!("Image upload failed, queueing message: {}", e);
                    return self.enqueue(draft, "image upload failed").await;
                }
            }
        }

        let payload = OutgoingMessage {
            message: draft.message.clone(),
            users: draft.sender.display_name.clone(),
            user_image: draft.sender.avatar_url.clone(),
            user_id: draft.sender.user_id.clone(),
            image: draft.uploaded_image_url.clone(),
            client_id: Uuid::new_v4(),
        };

        match self.store.create_message(room_id, &payload).await {
            Ok(created) => {
                tracing::debug!(room = %room_id, document = %created.id, "Message sent");
                self.state.upsert_message(created.clone()).await;
                Ok(SendOutcome::Sent(created))
            }
            Err(e) => {
                tracing::warn!("Send failed, queueing message: {}", e);
                self.enqueue(draft, "send failed").await
            }
        }
    }

    async fn enqueue(&self, draft: NewPendingMessage, reason: &str) -> Result<SendOutcome> {
        let record = self.queue.add(draft).await?;
        tracing::info!(id = %record.id, room = %record.room_id, reason, "Message queued");

        if self.network.is_online() {
            if let Some(sync) = &self.sync {
                sync.trigger();
            }
        }

        Ok(SendOutcome::Queued(record))
    }
}
