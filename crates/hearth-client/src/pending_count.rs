use crate::queue::PendingQueue;
use crate::state::AppState;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Keeps `AppState::pending_count` equal to the queue length.
#[derive(Clone)]
pub struct PendingCountProjector {
    queue: Arc<PendingQueue>,
    state: AppState,
}

impl PendingCountProjector {
    pub fn new(queue: Arc<PendingQueue>, state: AppState) -> Self {
        Self { queue, state }
    }

    /// Re-read the queue and publish its length.
    pub async fn refresh(&self) -> usize {
        let count = self.queue.count().await;
        self.state.set_pending_count(count).await;
        count
    }

    /// Follow queue changes until the handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        let mut rx = self.queue.subscribe();
        tokio::spawn(async move {
            self.refresh().await;
            while rx.changed().await.is_ok() {
                let count = *rx.borrow_and_update();
                self.state.set_pending_count(count).await;
            }
        })
    }
}

/// Status line for a non-empty outbox
pub fn banner(count: usize) -> Option<String> {
    match count {
        0 => None,
        1 => Some("1 message pending sync".to_string()),
        n => Some(format!("{} messages pending sync", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use hearth_protocol::{NewPendingMessage, SenderProfile};
    use std::time::Duration;

    fn draft(room: &str) -> NewPendingMessage {
        NewPendingMessage {
            room_id: room.to_string(),
            message: "hi".to_string(),
            sender: SenderProfile {
                user_id: "uid-1".to_string(),
                display_name: "Ada".to_string(),
                avatar_url: None,
            },
            image_data: None,
            uploaded_image_url: None,
        }
    }

    #[test]
    fn test_banner() {
        assert_eq!(banner(0), None);
        assert_eq!(banner(1).as_deref(), Some("1 message pending sync"));
        assert_eq!(banner(3).as_deref(), Some("3 messages pending sync"));
    }

    #[tokio::test]
    async fn test_refresh_publishes_queue_length() {
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new())));
        let state = AppState::new();
        let projector = PendingCountProjector::new(queue.clone(), state.clone());

        queue.add(draft("room-a")).await.unwrap();
        queue.add(draft("room-b")).await.unwrap();

        assert_eq!(projector.refresh().await, 2);
        assert_eq!(state.pending_count().await, 2);
    }

    #[tokio::test]
    async fn test_spawned_projector_follows_queue() {
        let queue = Arc::new(PendingQueue::new(Arc::new(MemoryStore::new())));
        let state = AppState::new();
        let task = PendingCountProjector::new(queue.clone(), state.clone()).spawn();

        let record = queue.add(draft("room-a")).await.unwrap();
        wait_for_count(&state, 1).await;

        queue.remove(record.id).await.unwrap();
        wait_for_count(&state, 0).await;

        task.abort();
    }

    async fn wait_for_count(state: &AppState, expected: usize) {
        for _ in 0..100 {
            if state.pending_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("pending count never reached {}", expected);
    }
}
