//! Room timeline: confirmed messages followed by this device's outbox
//!
//! Nothing is de-duplicated by content. A pending record disappears from
//! the view only when the queue drops it, which happens after the remote
//! write is confirmed, so the confirmed copy may briefly show up next to
//! it and then the pending copy goes away.

use crate::queue::PendingQueue;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use hearth_protocol::{MessageData, PendingMessage, PendingStatus};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    Sent,
    Pending,
    Uploading,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Confirmed(MessageData),
    Pending(PendingMessage),
}

impl TimelineEntry {
    pub fn delivery(&self) -> Delivery {
        match self {
            Self::Confirmed(_) => Delivery::Sent,
            Self::Pending(p) => match p.status {
                PendingStatus::Pending => Delivery::Pending,
                PendingStatus::Uploading => Delivery::Uploading,
                PendingStatus::Failed => Delivery::Failed,
            },
        }
    }

    /// Document id for confirmed entries, queue id for pending ones
    pub fn key(&self) -> String {
        match self {
            Self::Confirmed(m) => m.id.clone(),
            Self::Pending(p) => p.id.to_string(),
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.message,
            Self::Pending(p) => &p.message,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            Self::Confirmed(m) => &m.users,
            Self::Pending(p) => &p.sender_name,
        }
    }

    /// Remote image URL, if there is one yet
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::Confirmed(m) => m.image.as_deref(),
            Self::Pending(p) => p.uploaded_image_url.as_deref(),
        }
    }

    pub fn has_image(&self) -> bool {
        match self {
            Self::Confirmed(m) => m.image.is_some(),
            Self::Pending(p) => p.has_image(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Confirmed(m) => m.timestamp,
            Self::Pending(p) => p.client_timestamp,
        }
    }
}

impl fmt::Display for TimelineEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp().format("%H:%M"),
            self.sender_name(),
            self.body()
        )?;

        if self.has_image() {
            match self.image_url() {
                Some(url) => write!(f, " <{}>", url)?,
                None => write!(f, " <image>")?,
            }
        }

        match self {
            Self::Confirmed(_) => Ok(()),
            Self::Pending(p) => match p.status {
                PendingStatus::Pending => write!(f, " (sending)"),
                PendingStatus::Uploading => write!(f, " (uploading)"),
                PendingStatus::Failed => write!(f, " (failed, retry #{})", p.retry_count),
            },
        }
    }
}

/// Confirmed messages of `room_id` by server timestamp, then pending
/// records of `room_id` by client timestamp. Inputs from other rooms are
/// ignored.
pub fn merge_room_view(
    confirmed: &[MessageData],
    pending: &[PendingMessage],
    room_id: &str,
) -> Vec<TimelineEntry> {
    let mut sent: Vec<&MessageData> = confirmed.iter().filter(|m| m.room_id == room_id).collect();
    sent.sort_by_key(|m| m.timestamp);

    let mut queued: Vec<&PendingMessage> = pending.iter().filter(|p| p.room_id == room_id).collect();
    queued.sort_by_key(|p| p.client_timestamp);

    sent.into_iter()
        .cloned()
        .map(TimelineEntry::Confirmed)
        .chain(queued.into_iter().cloned().map(TimelineEntry::Pending))
        .collect()
}

pub async fn room_view(state: &AppState, queue: &PendingQueue, room_id: &str) -> Vec<TimelineEntry> {
    let confirmed = state.room_messages(room_id).await;
    let pending = queue.get_for_room(room_id).await;
    merge_room_view(&confirmed, &pending, room_id)
}
