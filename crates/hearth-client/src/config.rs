//! Client configuration
//!
//! Sources, lowest priority first: built-in defaults, a TOML file
//! (`~/.config/hearth/config.toml` unless a path is given), then
//! `HEARTH__*` environment variables. A `.env` file in the working
//! directory is loaded into the environment first.

use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::storage::FileStore;
use config::{Config, Environment, File};
use hearth_protocol::SenderProfile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the remote message store
    pub store_url: String,
    /// Endpoint issuing upload signatures
    pub signing_url: String,
    /// Media host upload endpoint
    pub upload_url: String,
    pub upload_folder: String,
    /// Bearer token from the identity provider
    pub auth_token: Option<String>,

    pub data_dir: Option<PathBuf>,
    pub namespace: String,

    pub health_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    // Sender profile
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ClientConfig {
    /// Get the default config file path
    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hearth").join("config.toml"))
    }

    /// Load configuration. An explicit `path` must exist; the default file
    /// is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", env_file);
        }

        let mut builder = Config::builder()
            .set_default("store_url", "http://localhost:8080")?
            .set_default("signing_url", "http://localhost:8080/api/media/signature")?
            .set_default("upload_url", "http://localhost:8080/api/media/upload")?
            .set_default("upload_folder", "hearth")?
            .set_default("namespace", "default")?
            .set_default("health_interval_secs", 15_i64)?
            .set_default("request_timeout_secs", 20_i64)?
            .set_default("retry_base_delay_ms", 1_000_i64)?
            .set_default("retry_max_delay_ms", 60_000_i64)?;

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder.add_source(File::from(default).required(false));
                }
            }
        }

        let config: ClientConfig = builder
            .add_source(Environment::with_prefix("HEARTH").separator("__"))
            .build()?
            .try_deserialize()?;

        if config.auth_token.is_none() {
            tracing::warn!("No auth token configured, remote requests will be anonymous");
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_base_delay_ms, self.retry_max_delay_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Root directory for the local queue
    pub fn storage_root(&self) -> PathBuf {
        self.data_dir
            .clone()
            .or_else(FileStore::default_root)
            .unwrap_or_else(|| PathBuf::from(".hearth"))
    }

    /// Live feed endpoint derived from the store URL
    pub fn ws_url(&self) -> String {
        let base = self
            .store_url
            .trim_end_matches('/')
            .replace("http://", "ws://")
            .replace("https://", "wss://");
        format!("{}/ws", base)
    }

    /// Sender profile, when both id and display name are configured
    pub fn sender_profile(&self) -> Option<SenderProfile> {
        match (&self.user_id, &self.display_name) {
            (Some(user_id), Some(display_name)) => Some(SenderProfile {
                user_id: user_id.clone(),
                display_name: display_name.clone(),
                avatar_url: self.avatar_url.clone(),
            }),
            _ => None,
        }
    }
}
