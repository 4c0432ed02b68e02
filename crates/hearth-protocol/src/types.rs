use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender identity as handed to us by the identity provider.
///
/// Copied onto every queued message so it can be rendered without a
/// network round-trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Delivery state of a queued message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    #[default]
    Pending,
    Uploading,
    Failed,
}

/// Raw image waiting to be uploaded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    /// Base64 encoded file contents
    pub base64: String,
    pub mime_type: String,
    pub file_name: String,
}

/// A message that has not been confirmed by the remote store yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessage {
    pub id: Uuid,
    pub room_id: String,
    pub message: String,
    /// Sender display name at composition time
    #[serde(rename = "users")]
    pub sender_name: String,
    /// Sender avatar at composition time
    #[serde(rename = "userImage")]
    pub sender_image: Option<String>,
    pub user_id: String,
    pub image_data: Option<ImageData>,
    pub uploaded_image_url: Option<String>,
    pub client_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: PendingStatus,
    pub retry_count: u32,
}

impl PendingMessage {
    pub fn has_image(&self) -> bool {
        self.image_data.is_some() || self.uploaded_image_url.is_some()
    }

    /// True while the raw image still has to go to the media host.
    pub fn needs_upload(&self) -> bool {
        self.image_data.is_some() && self.uploaded_image_url.is_none()
    }
}

/// Input for queueing a new message.
///
/// `uploaded_image_url` is set when a direct send already uploaded the
/// image before the message write failed.
#[derive(Debug, Clone)]
pub struct NewPendingMessage {
    pub room_id: String,
    pub message: String,
    pub sender: SenderProfile,
    pub image_data: Option<ImageData>,
    pub uploaded_image_url: Option<String>,
}

/// Message document as written to the remote store.
///
/// Carries no timestamp; the store assigns one on write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub message: String,
    pub users: String,
    pub user_image: Option<String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub client_id: Uuid,
}

impl OutgoingMessage {
    pub fn from_pending(pending: &PendingMessage) -> Self {
        Self {
            message: pending.message.clone(),
            users: pending.sender_name.clone(),
            user_image: pending.sender_image.clone(),
            user_id: pending.user_id.clone(),
            image: pending.uploaded_image_url.clone(),
            client_id: pending.id,
        }
    }
}

/// Confirmed message as read back from the remote store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub id: String,
    pub room_id: String,
    pub message: String,
    pub users: String,
    pub user_image: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    /// Server-assigned write time
    pub timestamp: DateTime<Utc>,
}

/// Upload signature issued by the signing service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSignature {
    pub signature: String,
    pub timestamp: i64,
    pub folder: String,
    pub api_key: String,
}

/// Response of the media host after a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub secure_url: String,
}
