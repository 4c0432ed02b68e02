use crate::compose::Composer;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::network_status::{HealthCheck, NetworkStatus};
use crate::pending_count::PendingCountProjector;
use crate::queue::PendingQueue;
use crate::remote::{HttpMessageStore, LiveFeed, MediaHost, MessageStore, SignedMediaHost};
use crate::state::AppState;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::sync::{Reconciler, SyncDriver, SyncHandle};
use crate::timeline::{self, TimelineEntry};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One wired-up client: queue, network status, reconciler and the state
/// they all report into. Build one at startup and hand out clones of the
/// pieces you need.
pub struct HearthClient {
    pub config: ClientConfig,
    pub state: AppState,
    pub queue: Arc<PendingQueue>,
    pub network: NetworkStatus,
    pub reconciler: Arc<Reconciler>,
    pub projector: PendingCountProjector,
    http: reqwest::Client,
    store: Arc<dyn MessageStore>,
    media: Arc<dyn MediaHost>,
}

impl HearthClient {
    /// Client backed by the HTTP adapters. `ephemeral` keeps the queue in
    /// memory instead of under the data directory.
    pub async fn from_config(config: ClientConfig, ephemeral: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let kv: Arc<dyn KeyValueStore> = if ephemeral {
            Arc::new(MemoryStore::new())
        } else {
            let store = FileStore::new(config.storage_root(), &config.namespace);
            tracing::info!("Pending queue stored in {:?}", store.dir());
            Arc::new(store)
        };

        let store = Arc::new(HttpMessageStore::new(
            http.clone(),
            &config.store_url,
            config.auth_token.clone(),
        ));
        let media = Arc::new(SignedMediaHost::new(
            http.clone(),
            &config.signing_url,
            &config.upload_url,
            &config.upload_folder,
            config.auth_token.clone(),
        ));

        Ok(Self::assemble(config, http, kv, store, media).await)
    }

    /// Client over caller-supplied storage and remote collaborators
    pub async fn with_collaborators(
        config: ClientConfig,
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn MessageStore>,
        media: Arc<dyn MediaHost>,
    ) -> Self {
        Self::assemble(config, reqwest::Client::new(), kv, store, media).await
    }

    async fn assemble(
        config: ClientConfig,
        http: reqwest::Client,
        kv: Arc<dyn KeyValueStore>,
        store: Arc<dyn MessageStore>,
        media: Arc<dyn MediaHost>,
    ) -> Self {
        let state = AppState::new();
        if let Some(profile) = config.sender_profile() {
            state.set_identity(profile).await;
        }

        let queue = Arc::new(PendingQueue::new(kv));
        let reconciler = Arc::new(Reconciler::new(queue.clone(), store.clone(), media.clone()));
        let projector = PendingCountProjector::new(queue.clone(), state.clone());

        Self {
            config,
            state,
            queue,
            network: NetworkStatus::new(false),
            reconciler,
            projector,
            http,
            store,
            media,
        }
    }

    pub fn health_check(&self) -> HealthCheck {
        HealthCheck::new(
            self.http.clone(),
            &self.config.store_url,
            self.config.request_timeout(),
            self.network.clone(),
        )
    }

    pub fn start_sync(&self) -> (SyncHandle, JoinHandle<()>) {
        SyncDriver::new(
            self.reconciler.clone(),
            self.network.clone(),
            self.projector.clone(),
            self.state.clone(),
            self.config.retry_policy(),
        )
        .spawn()
    }

    pub fn composer(&self, sync: Option<SyncHandle>) -> Composer {
        let composer = Composer::new(
            self.queue.clone(),
            self.store.clone(),
            self.media.clone(),
            self.network.clone(),
            self.state.clone(),
        );
        match sync {
            Some(handle) => composer.with_sync(handle),
            None => composer,
        }
    }

    /// Fetch a room's confirmed messages into the state.
    pub async fn load_room(&self, room_id: &str) -> Result<()> {
        let messages = self.store.list_messages(room_id).await?;
        tracing::debug!("Loaded {} messages for {}", messages.len(), room_id);
        self.state.set_room_messages(room_id, messages).await;
        Ok(())
    }

    pub async fn connect_live(&self) -> Result<LiveFeed> {
        LiveFeed::connect(
            &self.config.ws_url(),
            self.config.auth_token.as_deref(),
            self.state.clone(),
        )
        .await
    }

    pub async fn room_view(&self, room_id: &str) -> Vec<TimelineEntry> {
        timeline::room_view(&self.state, &self.queue, room_id).await
    }
}
