//! Reconciliation of the pending queue against the remote message store
//!
//! A pass walks the queue oldest first and handles each record on its
//! own: upload the image if it has not been uploaded yet, write the
//! message document, then drop the record locally. A failure marks that
//! record `failed`, bumps its retry count and moves on to the next one.
//! Records are never discarded on failure.

mod driver;

pub use driver::{SyncDriver, SyncHandle};

use crate::error::Result;
use crate::queue::PendingQueue;
use crate::remote::{MediaHost, MessageStore};
use hearth_protocol::{OutgoingMessage, PendingMessage, PendingStatus};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Summary of one reconciliation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records looked at
    pub attempted: usize,
    /// Records written remotely and removed from the queue
    pub synced: usize,
    /// Records left in the queue as `failed`
    pub failed: usize,
    /// Images sent to the media host
    pub uploads: usize,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.attempted += other.attempted;
        self.synced += other.synced;
        self.failed += other.failed;
        self.uploads += other.uploads;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another run was in progress; it will make one more pass for us.
    AlreadyRunning,
}

/// Effects that already happened remotely but could not be recorded in
/// the queue. Consulted before repeating any remote call for a record.
#[derive(Default)]
struct Memo {
    uploaded: HashMap<Uuid, String>,
    delivered: HashSet<Uuid>,
}

pub struct Reconciler {
    queue: Arc<PendingQueue>,
    store: Arc<dyn MessageStore>,
    media: Arc<dyn MediaHost>,
    running: AtomicBool,
    rerun: AtomicBool,
    memo: Mutex<Memo>,
}

/// Clears the running flag when dropped
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Reconciler {
    pub fn new(
        queue: Arc<PendingQueue>,
        store: Arc<dyn MessageStore>,
        media: Arc<dyn MediaHost>,
    ) -> Self {
        Self {
            queue,
            store,
            media,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
            memo: Mutex::new(Memo::default()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drain the queue. Single-flight: while a run is in progress further
    /// calls return [`SyncOutcome::AlreadyRunning`] and are folded into one
    /// extra pass of the active run.
    pub async fn run(&self) -> SyncOutcome {
        // Raised before trying to acquire so a run that is releasing the
        // flag always sees it
        self.rerun.store(true, Ordering::SeqCst);
        let Some(mut guard) = RunGuard::acquire(&self.running) else {
            tracing::debug!("Sync already running, coalescing trigger");
            return SyncOutcome::AlreadyRunning;
        };

        let mut total = SyncReport::default();
        loop {
            self.rerun.store(false, Ordering::SeqCst);
            total.absorb(self.pass().await);

            if self.rerun.load(Ordering::SeqCst) {
                tracing::debug!("Running coalesced sync pass");
                continue;
            }

            match self.release(guard) {
                Some(next) => guard = next,
                None => break,
            }
        }

        SyncOutcome::Completed(total)
    }

    /// Drop the running flag, then take it back if a trigger landed
    /// between the last check and the release.
    fn release<'a>(&'a self, guard: RunGuard<'a>) -> Option<RunGuard<'a>> {
        drop(guard);
        if !self.rerun.load(Ordering::SeqCst) {
            return None;
        }
        RunGuard::acquire(&self.running)
    }

    async fn pass(&self) -> SyncReport {
        let mut records = self.queue.get_all().await;
        // Stable sort: ties keep insertion order
        records.sort_by_key(|m| m.client_timestamp);

        let mut report = SyncReport::default();
        if records.is_empty() {
            return report;
        }

        tracing::info!("Syncing {} pending messages", records.len());

        for record in records {
            report.attempted += 1;

            match self.sync_record(&record, &mut report).await {
                Ok(()) => report.synced += 1,
                Err(e) => {
                    report.failed += 1;
                    let retry_count = record.retry_count.saturating_add(1);
                    tracing::warn!(
                        id = %record.id,
                        room = %record.room_id,
                        retry_count,
                        transient = e.is_transient(),
                        "Failed to sync pending message: {}",
                        e
                    );

                    if let Err(e) = self
                        .queue
                        .update_status(record.id, PendingStatus::Failed, retry_count)
                        .await
                    {
                        tracing::error!(id = %record.id, "Could not mark message as failed: {}", e);
                    }
                }
            }
        }

        tracing::info!(
            synced = report.synced,
            failed = report.failed,
            uploads = report.uploads,
            "Sync pass finished"
        );
        report
    }

    async fn sync_record(&self, record: &PendingMessage, report: &mut SyncReport) -> Result<()> {
        if self.was_delivered(record.id) {
            // The document exists remotely; only the local removal is left
            self.queue.remove(record.id).await?;
            self.forget(record.id);
            return Ok(());
        }

        let mut record = record.clone();
        if let Some(url) = self.remembered_upload(record.id) {
            record.uploaded_image_url.get_or_insert(url);
        }

        if let Some(image) = record.image_data.take() {
            let url = match record.uploaded_image_url.clone() {
                Some(url) => url,
                None => {
                    self.set_status(&record, PendingStatus::Uploading).await;
                    let url = self.media.upload_image(&image).await?;
                    report.uploads += 1;
                    self.remember_upload(record.id, &url);
                    url
                }
            };

            // Converge to the URL; a failed write here must not cost a re-upload
            if let Err(e) = self.queue.update_uploaded_image_url(record.id, &url).await {
                tracing::error!(id = %record.id, "Could not record uploaded image URL: {}", e);
            }
            record.uploaded_image_url = Some(url);
        }

        let payload = OutgoingMessage::from_pending(&record);
        let created = self.store.create_message(&record.room_id, &payload).await?;
        tracing::info!(
            id = %record.id,
            document = %created.id,
            room = %record.room_id,
            "Pending message delivered"
        );

        self.mark_delivered(record.id);
        if let Err(e) = self.queue.remove(record.id).await {
            tracing::error!(
                id = %record.id,
                "Message delivered but could not be removed from the queue: {}",
                e
            );
            return Err(e);
        }
        self.forget(record.id);
        Ok(())
    }

    async fn set_status(&self, record: &PendingMessage, status: PendingStatus) {
        if let Err(e) = self
            .queue
            .update_status(record.id, status, record.retry_count)
            .await
        {
            tracing::warn!(id = %record.id, "Could not update message status: {}", e);
        }
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, Memo> {
        // The memo holds plain data; a poisoned lock is still usable
        self.memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn was_delivered(&self, id: Uuid) -> bool {
        self.memo().delivered.contains(&id)
    }

    fn mark_delivered(&self, id: Uuid) {
        self.memo().delivered.insert(id);
    }

    fn remembered_upload(&self, id: Uuid) -> Option<String> {
        self.memo().uploaded.get(&id).cloned()
    }

    fn remember_upload(&self, id: Uuid, url: &str) {
        self.memo().uploaded.insert(id, url.to_string());
    }

    fn forget(&self, id: Uuid) {
        let mut memo = self.memo();
        memo.delivered.remove(&id);
        memo.uploaded.remove(&id);
    }
}
