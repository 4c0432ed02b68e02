//! Online/offline tracking
//!
//! [`NetworkStatus`] is the single source of "are we online". The platform
//! signal feeding it is [`HealthCheck`], which polls `GET /health` on the
//! message store.

use crate::remote::api;
use reqwest::Client;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    WentOnline,
    WentOffline,
}

#[derive(Debug, Clone)]
pub struct NetworkStatus {
    tx: watch::Sender<bool>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the latest connectivity reading. Subscribers are only woken
    /// when the value actually changes.
    pub fn set_online(&self, online: bool) -> Transition {
        let mut previous = online;
        self.tx.send_if_modified(|current| {
            previous = *current;
            *current = online;
            previous != online
        });

        match (previous, online) {
            (false, true) => {
                tracing::info!("Network is back online");
                Transition::WentOnline
            }
            (true, false) => {
                tracing::warn!("Network went offline");
                Transition::WentOffline
            }
            _ => Transition::None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Health check loop feeding [`NetworkStatus`]
#[derive(Clone)]
pub struct HealthCheck {
    client: Client,
    health_url: String,
    timeout: Duration,
    status: NetworkStatus,
}

impl HealthCheck {
    pub fn new(client: Client, store_url: &str, timeout: Duration, status: NetworkStatus) -> Self {
        Self {
            client,
            health_url: format!("{}/health", store_url.trim_end_matches('/')),
            timeout,
            status,
        }
    }

    /// Run one health check and publish the result.
    pub async fn check(&self) -> bool {
        let online = matches!(
            tokio::time::timeout(self.timeout, api::check_health(&self.client, &self.health_url)).await,
            Ok(Ok(()))
        );
        self.status.set_online(online);
        online
    }

    /// Repeat [`check`](Self::check) every `interval` until the handle is
    /// aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = self.check().await;
                tracing::trace!(online, "Health check");
            }
        })
    }
}
