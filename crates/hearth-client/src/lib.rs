//! Hearth client library
//!
//! Offline-first delivery for chat messages: a durable pending queue, a
//! reconciler that replays it against the remote store once connectivity
//! returns, and the views that show queued messages next to confirmed
//! ones.

pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod image;
pub mod network_status;
pub mod pending_count;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod state;
pub mod storage;
pub mod sync;
pub mod timeline;

pub use client::HearthClient;
pub use compose::{Composer, SendOutcome};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use network_status::{HealthCheck, NetworkStatus};
pub use pending_count::PendingCountProjector;
pub use queue::PendingQueue;
pub use sync::{Reconciler, SyncHandle, SyncOutcome, SyncReport};
pub use timeline::{merge_room_view, Delivery, TimelineEntry};
