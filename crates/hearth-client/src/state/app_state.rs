use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use hearth_protocol::{MessageData, SenderProfile};

use crate::sync::SyncReport;

/// UI-facing client state shared between the live feed, the sync driver
/// and whatever renders the timeline.
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<RwLock<AppStateInner>>,
}

#[derive(Debug, Default)]
pub struct AppStateInner {
    // Current user
    pub current_user: Option<SenderProfile>,

    // Confirmed messages (room_id -> messages ordered by server timestamp)
    pub rooms: HashMap<String, Vec<MessageData>>,

    // Connectivity
    pub is_online: bool,
    pub is_connected: bool,
    pub connection_error: Option<String>,

    // Outbox
    pub pending_count: usize,
    pub last_sync: Option<SyncReport>,

    // Bumped on every change that affects what a timeline shows
    pub version: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppStateInner::default())),
        }
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppStateInner> {
        self.inner.read().await
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppStateInner> {
        self.inner.write().await
    }

    pub async fn set_identity(&self, user: SenderProfile) {
        let mut state = self.inner.write().await;
        state.current_user = Some(user);
    }

    pub async fn current_user(&self) -> Option<SenderProfile> {
        self.inner.read().await.current_user.clone()
    }

    pub async fn clear_identity(&self) {
        let mut state = self.inner.write().await;
        state.current_user = None;
        state.rooms.clear();
        state.version += 1;
    }

    /// Replace a room's confirmed messages, e.g. from a snapshot.
    pub async fn set_room_messages(&self, room_id: &str, mut messages: Vec<MessageData>) {
        messages.sort_by_key(|m| m.timestamp);
        let mut state = self.inner.write().await;
        state.rooms.insert(room_id.to_string(), messages);
        state.version += 1;
    }

    /// Insert a confirmed message, or replace the one with the same id.
    pub async fn upsert_message(&self, message: MessageData) {
        let mut state = self.inner.write().await;
        let messages = state.rooms.entry(message.room_id.clone()).or_default();

        if let Some(pos) = messages.iter().position(|m| m.id == message.id) {
            messages.remove(pos);
        }

        // Equal timestamps keep arrival order
        let index = messages.partition_point(|m| m.timestamp <= message.timestamp);
        messages.insert(index, message);
        state.version += 1;
    }

    pub async fn remove_message(&self, room_id: &str, message_id: &str) {
        let mut state = self.inner.write().await;
        if let Some(messages) = state.rooms.get_mut(room_id) {
            messages.retain(|m| m.id != message_id);
        }
        state.version += 1;
    }

    pub async fn room_messages(&self, room_id: &str) -> Vec<MessageData> {
        self.inner
            .read()
            .await
            .rooms
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_online(&self, online: bool) {
        let mut state = self.inner.write().await;
        state.is_online = online;
    }

    pub async fn set_connected(&self, connected: bool, error: Option<String>) {
        let mut state = self.inner.write().await;
        state.is_connected = connected;
        state.connection_error = error;
    }

    pub async fn set_pending_count(&self, count: usize) {
        let mut state = self.inner.write().await;
        if state.pending_count != count {
            state.pending_count = count;
            state.version += 1;
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.read().await.pending_count
    }

    pub async fn record_sync(&self, report: SyncReport) {
        let mut state = self.inner.write().await;
        state.last_sync = Some(report);
        state.version += 1;
    }

    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn message(id: &str, room: &str, offset_secs: i64) -> MessageData {
        MessageData {
            id: id.to_string(),
            room_id: room.to_string(),
            message: format!("body {}", id),
            users: "Ada".to_string(),
            user_image: None,
            user_id: "uid-1".to_string(),
            image: None,
            client_id: None,
            timestamp: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_timestamp_order() {
        let state = AppState::new();
        state.upsert_message(message("b", "r1", 10)).await;
        state.upsert_message(message("a", "r1", 0)).await;
        state.upsert_message(message("c", "r1", 20)).await;

        let ids: Vec<String> = state.room_messages("r1").await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_id() {
        let state = AppState::new();
        state.upsert_message(message("a", "r1", 0)).await;

        let mut edited = message("a", "r1", 0);
        edited.message = "edited".to_string();
        state.upsert_message(edited).await;

        let messages = state.room_messages("r1").await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message, "edited");
    }

    #[tokio::test]
    async fn test_remove_and_version() {
        let state = AppState::new();
        let before = state.version().await;
        state.set_room_messages("r1", vec![message("b", "r1", 5), message("a", "r1", 1)]).await;
        state.remove_message("r1", "a").await;

        let ids: Vec<String> = state.room_messages("r1").await.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(state.version().await > before);
    }

    #[tokio::test]
    async fn test_pending_count_only_bumps_on_change() {
        let state = AppState::new();
        state.set_pending_count(2).await;
        let version = state.version().await;
        state.set_pending_count(2).await;
        assert_eq!(state.version().await, version);
        assert_eq!(state.pending_count().await, 2);
    }
}
