//! In-process fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use hearth_client::error::{ClientError, Result};
use hearth_client::remote::{MediaHost, MessageStore};
use hearth_client::storage::{KeyValueStore, MemoryStore};
use hearth_client::ClientConfig;
use hearth_protocol::{ImageData, MessageData, NewPendingMessage, OutgoingMessage, SenderProfile};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Message store that keeps writes in memory and fails on request
#[derive(Default)]
pub struct FakeStore {
    created: Mutex<Vec<MessageData>>,
    fail_next: AtomicUsize,
    failing_bodies: Mutex<HashSet<String>>,
    latency_ms: AtomicUsize,
}

impl FakeStore {
    /// Fail the next `n` writes with a 503
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Always fail writes whose body is `body`
    pub fn fail_body(&self, body: &str) {
        self.failing_bodies.lock().unwrap().insert(body.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<MessageData> {
        self.created.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.created().into_iter().map(|m| m.message).collect()
    }
}

#[async_trait]
impl MessageStore for FakeStore {
    async fn create_message(&self, room_id: &str, message: &OutgoingMessage) -> Result<MessageData> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }

        let scheduled_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_failure || self.failing_bodies.lock().unwrap().contains(&message.message) {
            return Err(ClientError::Remote {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let mut created = self.created.lock().unwrap();
        let document = MessageData {
            id: format!("doc-{}", created.len() + 1),
            room_id: room_id.to_string(),
            message: message.message.clone(),
            users: message.users.clone(),
            user_image: message.user_image.clone(),
            user_id: message.user_id.clone(),
            image: message.image.clone(),
            client_id: Some(message.client_id),
            timestamp: Utc::now(),
        };
        created.push(document.clone());
        Ok(document)
    }

    async fn list_messages(&self, room_id: &str) -> Result<Vec<MessageData>> {
        Ok(self
            .created()
            .into_iter()
            .filter(|m| m.room_id == room_id)
            .collect())
    }
}

/// Media host counting uploads
#[derive(Default)]
pub struct FakeMedia {
    uploads: AtomicUsize,
    fail_next: AtomicUsize,
}

impl FakeMedia {
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaHost for FakeMedia {
    async fn upload_image(&self, image: &ImageData) -> Result<String> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ClientError::Upload("media host unavailable".to_string()));
        }

        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://media.example/{}/{}", n, image.file_name))
    }
}

/// Key-value store whose writes can be switched off
#[derive(Default)]
pub struct FlakyKv {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyKv {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
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

pub fn sender() -> SenderProfile {
    SenderProfile {
        user_id: "uid-ada".to_string(),
        display_name: "Ada".to_string(),
        avatar_url: Some("https://img.example/ada.png".to_string()),
    }
}

pub fn text(room: &str, body: &str) -> NewPendingMessage {
    NewPendingMessage {
        room_id: room.to_string(),
        message: body.to_string(),
        sender: sender(),
        image_data: None,
        uploaded_image_url: None,
    }
}

pub fn with_image(room: &str, body: &str) -> NewPendingMessage {
    NewPendingMessage {
        image_data: Some(png()),
        ..text(room, body)
    }
}

pub fn png() -> ImageData {
    // 1x1 transparent PNG
    ImageData {
        base64: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII="
            .to_string(),
        mime_type: "image/png".to_string(),
        file_name: "pixel.png".to_string(),
    }
}

/// Config pointing at `store_url`, signed in as [`sender`], with short
/// retry delays.
pub fn config(store_url: &str) -> ClientConfig {
    let profile = sender();
    ClientConfig {
        store_url: store_url.to_string(),
        signing_url: format!("{}/api/media/signature", store_url),
        upload_url: format!("{}/api/media/upload", store_url),
        upload_folder: "hearth-test".to_string(),
        auth_token: Some("test-token".to_string()),
        data_dir: None,
        namespace: "test".to_string(),
        health_interval_secs: 1,
        request_timeout_secs: 5,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 50,
        user_id: Some(profile.user_id),
        display_name: Some(profile.display_name),
        avatar_url: profile.avatar_url,
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
