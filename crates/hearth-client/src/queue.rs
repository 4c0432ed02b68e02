//! Durable queue of outbound messages not yet confirmed by the remote store
//!
//! The whole list lives under one storage key. Each mutation clones the
//! in-memory mirror, applies the change, writes the full list back and
//! only then commits the mirror, so a failed write never leaves memory
//! ahead of disk. Two processes sharing one store namespace race at list
//! granularity (last write wins); call [`PendingQueue::reload`] to pick up
//! writes made elsewhere.

use crate::error::Result;
use crate::storage::KeyValueStore;
use chrono::Utc;
use hearth_protocol::{NewPendingMessage, PendingMessage, PendingStatus};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

const QUEUE_KEY: &str = "pending_messages";

pub struct PendingQueue {
    store: Arc<dyn KeyValueStore>,
    // None until the first successful load
    records: Mutex<Option<Vec<PendingMessage>>>,
    len_tx: watch::Sender<usize>,
}

impl PendingQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (len_tx, _) = watch::channel(0);
        Self {
            store,
            records: Mutex::new(None),
            len_tx,
        }
    }

    /// All records, oldest first.
    ///
    /// Never fails: an unreadable store is logged and reported as an empty
    /// queue. The data stays on disk and the next call tries again.
    pub async fn get_all(&self) -> Vec<PendingMessage> {
        let mut guard = self.records.lock().await;
        match self.loaded(&mut guard).await {
            Ok(records) => records.clone(),
            Err(e) => {
                tracing::warn!("Failed to read pending messages, treating queue as empty: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn get_for_room(&self, room_id: &str) -> Vec<PendingMessage> {
        self.get_all()
            .await
            .into_iter()
            .filter(|m| m.room_id == room_id)
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.get_all().await.len()
    }

    /// Queue a new message with a fresh id and `pending` status.
    pub async fn add(&self, input: NewPendingMessage) -> Result<PendingMessage> {
        let now = Utc::now();

        // An already uploaded image never needs its raw bytes again
        let image_data = match input.uploaded_image_url {
            Some(_) => None,
            None => input.image_data,
        };

        let record = PendingMessage {
            id: Uuid::new_v4(),
            room_id: input.room_id,
            message: input.message,
            sender_name: input.sender.display_name,
            sender_image: input.sender.avatar_url,
            user_id: input.sender.user_id,
            image_data,
            uploaded_image_url: input.uploaded_image_url,
            client_timestamp: now,
            created_at: now,
            status: PendingStatus::Pending,
            retry_count: 0,
        };

        let queued = record.clone();
        self.mutate(move |records| {
            records.push(queued);
            true
        })
        .await?;

        tracing::debug!(id = %record.id, room = %record.room_id, "Queued pending message");
        Ok(record)
    }

    /// Set status and retry count. Unknown ids are ignored, and the retry
    /// count never moves backwards.
    pub async fn update_status(&self, id: Uuid, status: PendingStatus, retry_count: u32) -> Result<()> {
        self.mutate(|records| match records.iter_mut().find(|m| m.id == id) {
            Some(record) => {
                record.status = status;
                record.retry_count = record.retry_count.max(retry_count);
                true
            }
            None => false,
        })
        .await?;
        Ok(())
    }

    /// Record a finished upload and drop the raw image in the same write.
    pub async fn update_uploaded_image_url(&self, id: Uuid, url: &str) -> Result<()> {
        self.mutate(|records| match records.iter_mut().find(|m| m.id == id) {
            Some(record) => {
                record.uploaded_image_url = Some(url.to_string());
                record.image_data = None;
                true
            }
            None => false,
        })
        .await?;
        Ok(())
    }

    /// Drop a record. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let removed = self
            .mutate(|records| {
                let before = records.len();
                records.retain(|m| m.id != id);
                records.len() != before
            })
            .await?;

        if removed {
            tracing::debug!(id = %id, "Removed pending message");
        }
        Ok(())
    }

    /// Empty the queue. Administrative use only; works even when the stored
    /// list cannot be parsed.
    pub async fn clear_all(&self) -> Result<()> {
        let mut guard = self.records.lock().await;
        self.store.set(QUEUE_KEY, serde_json::Value::Array(Vec::new())).await?;
        *guard = Some(Vec::new());
        self.len_tx.send_replace(0);
        tracing::info!("Cleared pending message queue");
        Ok(())
    }

    /// Discard the in-memory mirror and read the store again.
    pub async fn reload(&self) -> Result<()> {
        let mut guard = self.records.lock().await;
        *guard = None;
        self.loaded(&mut guard).await?;
        Ok(())
    }

    /// Queue length after every committed change.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }

    async fn loaded<'a>(
        &self,
        slot: &'a mut Option<Vec<PendingMessage>>,
    ) -> Result<&'a mut Vec<PendingMessage>> {
        let records = match slot.take() {
            Some(records) => records,
            None => {
                let records = self.read_store().await?;
                self.len_tx.send_replace(records.len());
                records
            }
        };
        Ok(slot.insert(records))
    }

    async fn read_store(&self) -> Result<Vec<PendingMessage>> {
        match self.store.get(QUEUE_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Apply `change` to a copy of the list; persist and commit when it
    /// reports a modification.
    async fn mutate<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Vec<PendingMessage>) -> bool,
    {
        let mut guard = self.records.lock().await;
        let records = self.loaded(&mut guard).await?;

        let mut next = records.clone();
        if !change(&mut next) {
            return Ok(false);
        }

        let value = serde_json::to_value(&next)?;
        if let Err(e) = self.store.set(QUEUE_KEY, value).await {
            tracing::error!("Failed to persist pending messages: {}", e);
            return Err(e);
        }

        *records = next;
        self.len_tx.send_replace(records.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::storage::{FileStore, MemoryStore};
    use async_trait::async_trait;
    use hearth_protocol::{ImageData, SenderProfile};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose reads and writes can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(ClientError::Storage("read refused".to_string()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ClientError::Storage("disk full".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    fn input(room: &str, text: &str) -> NewPendingMessage {
        NewPendingMessage {
            room_id: room.to_string(),
            message: text.to_string(),
            sender: SenderProfile {
                user_id: "uid-1".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: Some("https://img.example/ada.png".to_string()),
            },
            image_data: None,
            uploaded_image_url: None,
        }
    }

    fn image() -> ImageData {
        ImageData {
            base64: "iVBORw0KGgo=".to_string(),
            mime_type: "image/png".to_string(),
            file_name: "cat.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_assigns_defaults_and_keeps_order() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));

        let a = queue.add(input("r1", "a")).await.unwrap();
        let b = queue.add(input("r1", "b")).await.unwrap();

        assert_eq!(a.status, PendingStatus::Pending);
        assert_eq!(a.retry_count, 0);
        assert_eq!(a.sender_name, "Ada");
        assert_ne!(a.id, b.id);

        let ids: Vec<Uuid> = queue.get_all().await.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let queue = PendingQueue::new(store.clone());

        let mut with_image = input("r2", "look");
        with_image.image_data = Some(image());
        queue.add(input("r1", "one")).await.unwrap();
        queue.add(with_image).await.unwrap();
        queue.add(input("r1", "three")).await.unwrap();

        let original = queue.get_all().await;
        let reopened = PendingQueue::new(store);
        assert_eq!(reopened.get_all().await, original);
    }

    #[tokio::test]
    async fn test_survives_restart_on_disk() {
        let root = std::env::temp_dir().join(format!("hearth-queue-{}", Uuid::new_v4()));

        let queue = PendingQueue::new(Arc::new(FileStore::new(&root, "default")));
        let mut with_image = input("r2", "look");
        with_image.image_data = Some(image());
        let first = queue.add(input("r1", "one")).await.unwrap();
        queue.add(with_image).await.unwrap();
        queue.update_status(first.id, PendingStatus::Failed, 2).await.unwrap();
        let before = queue.get_all().await;
        drop(queue);

        let reopened = PendingQueue::new(Arc::new(FileStore::new(&root, "default")));
        let after = reopened.get_all().await;
        assert_eq!(after, before);
        assert_eq!(after[0].retry_count, 2);
        assert!(after[1].image_data.is_some());

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_get_for_room_filters_in_order() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        queue.add(input("r1", "a")).await.unwrap();
        queue.add(input("r2", "x")).await.unwrap();
        queue.add(input("r1", "b")).await.unwrap();

        let texts: Vec<String> = queue
            .get_for_room("r1")
            .await
            .into_iter()
            .map(|m| m.message)
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(queue.count().await, 3);
    }

    #[tokio::test]
    async fn test_updates_on_missing_id_are_noops() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        queue.add(input("r1", "a")).await.unwrap();

        let ghost = Uuid::new_v4();
        queue.update_status(ghost, PendingStatus::Failed, 3).await.unwrap();
        queue.update_uploaded_image_url(ghost, "https://cdn/x.png").await.unwrap();
        queue.remove(ghost).await.unwrap();

        let all = queue.get_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, PendingStatus::Pending);
    }

    #[tokio::test]
    async fn test_retry_count_never_decreases() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let record = queue.add(input("r1", "a")).await.unwrap();

        queue.update_status(record.id, PendingStatus::Failed, 2).await.unwrap();
        queue.update_status(record.id, PendingStatus::Uploading, 1).await.unwrap();

        let stored = &queue.get_all().await[0];
        assert_eq!(stored.status, PendingStatus::Uploading);
        assert_eq!(stored.retry_count, 2);
    }

    #[tokio::test]
    async fn test_uploaded_url_replaces_image_data() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let mut with_image = input("r1", "");
        with_image.image_data = Some(image());
        let record = queue.add(with_image).await.unwrap();
        assert!(record.needs_upload());

        queue
            .update_uploaded_image_url(record.id, "https://cdn.example/cat.png")
            .await
            .unwrap();

        let stored = &queue.get_all().await[0];
        assert!(stored.image_data.is_none());
        assert_eq!(stored.uploaded_image_url.as_deref(), Some("https://cdn.example/cat.png"));
    }

    #[tokio::test]
    async fn test_add_with_uploaded_url_drops_raw_image() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let mut uploaded = input("r1", "");
        uploaded.image_data = Some(image());
        uploaded.uploaded_image_url = Some("https://cdn.example/cat.png".to_string());

        let record = queue.add(uploaded).await.unwrap();
        assert!(record.image_data.is_none());
        assert!(!record.needs_upload());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let record = queue.add(input("r1", "a")).await.unwrap();

        queue.remove(record.id).await.unwrap();
        queue.remove(record.id).await.unwrap();
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_read_failure_is_fail_open() {
        let store = Arc::new(FlakyStore::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        let queue = PendingQueue::new(store.clone());

        assert!(queue.get_all().await.is_empty());
        assert_eq!(queue.count().await, 0);
    }

    #[tokio::test]
    async fn test_unreadable_store_is_not_overwritten() {
        let store = Arc::new(FlakyStore::default());
        let seeded = PendingQueue::new(store.clone());
        seeded.add(input("r1", "keep me")).await.unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        let queue = PendingQueue::new(store.clone());
        assert!(queue.add(input("r1", "new")).await.is_err());

        store.fail_reads.store(false, Ordering::SeqCst);
        let texts: Vec<String> = queue.get_all().await.into_iter().map(|m| m.message).collect();
        assert_eq!(texts, vec!["keep me"]);
    }

    #[tokio::test]
    async fn test_write_failure_is_surfaced_and_not_committed() {
        let store = Arc::new(FlakyStore::default());
        let queue = PendingQueue::new(store.clone());
        let record = queue.add(input("r1", "a")).await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(queue.add(input("r1", "b")).await.is_err());
        assert!(queue.remove(record.id).await.is_err());

        let ids: Vec<Uuid> = queue.get_all().await.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![record.id]);
    }

    #[tokio::test]
    async fn test_concurrent_adds_lose_nothing() {
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new())));

        let mut handles = Vec::new();
        for i in 0..25 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.add(input("r1", &format!("msg {}", i))).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.count().await, 25);
    }

    #[tokio::test]
    async fn test_reload_sees_external_writes() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = PendingQueue::new(store.clone());
        let second = PendingQueue::new(store.clone());

        assert_eq!(first.count().await, 0);
        second.add(input("r1", "from elsewhere")).await.unwrap();
        assert_eq!(first.count().await, 0);

        first.reload().await.unwrap();
        assert_eq!(first.count().await, 1);
    }

    #[tokio::test]
    async fn test_clear_all_recovers_corrupt_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(QUEUE_KEY, Value::String("garbage".to_string())).await.unwrap();

        let queue = PendingQueue::new(store);
        assert!(queue.get_all().await.is_empty());
        queue.clear_all().await.unwrap();
        queue.add(input("r1", "fresh")).await.unwrap();
        assert_eq!(queue.count().await, 1);
    }

    #[tokio::test]
    async fn test_subscribe_tracks_length() {
        let queue = PendingQueue::new(Arc::new(MemoryStore::new()));
        let rx = queue.subscribe();

        let record = queue.add(input("r1", "a")).await.unwrap();
        queue.add(input("r1", "b")).await.unwrap();
        assert_eq!(*rx.borrow(), 2);

        queue.remove(record.id).await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
