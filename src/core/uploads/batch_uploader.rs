// Debounced batch uploader.
//
// Every conversation gets its own coordinator task that owns the pending photos
// and the settle deadline. Arrivals are messages on that task's channel, and the
// deadline is just another branch of its select loop, so there is no lock around
// the accumulator. When the deadline fires the accumulator is swapped out for an
// empty one before anything else happens; photos arriving while a batch uploads
// start the next batch.
//
// A coordinator that has nothing pending for `COORDINATOR_IDLE_TIMEOUT` takes
// itself out of the registry and exits. The next photo from that conversation
// spawns a fresh one.

use super::upload_models::{
    replies, ArrivalOutcome, BatchReport, ConversationId, PhotoRef, PHOTO_MIME_TYPE,
};
use super::upload_ports::{ChatNotifier, FileStorage, PhotoSource};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Quiet period observed in production: two seconds without a new photo.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// How long a coordinator with nothing pending waits before it retires.
pub const COORDINATOR_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

enum CoordinatorEvent {
    Arrived(PhotoRef),
    PendingCount(oneshot::Sender<usize>),
}

/// Registry entry for a running coordinator. The id tells a retiring
/// coordinator whether the entry is still its own.
struct CoordinatorHandle {
    id: u64,
    sender: mpsc::UnboundedSender<CoordinatorEvent>,
}

type Registry = DashMap<ConversationId, CoordinatorHandle>;

/// Everything a flush needs. Shared by all coordinators.
struct UploadPipeline {
    photos: Arc<dyn PhotoSource>,
    notifier: Arc<dyn ChatNotifier>,
    storage: Arc<dyn FileStorage>,
}

pub struct BatchUploader {
    pipeline: Arc<UploadPipeline>,
    quiet_period: Duration,
    coordinators: Arc<Registry>,
    next_coordinator_id: AtomicU64,
}

impl BatchUploader {
    pub fn new(
        photos: Arc<dyn PhotoSource>,
        notifier: Arc<dyn ChatNotifier>,
        storage: Arc<dyn FileStorage>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(UploadPipeline {
                photos,
                notifier,
                storage,
            }),
            quiet_period,
            coordinators: Arc::new(DashMap::new()),
            next_coordinator_id: AtomicU64::new(0),
        }
    }

    /// Adds a photo to the conversation's pending batch and restarts its quiet period.
    ///
    /// If storage isn't authorized the user gets a single "not ready" reply and
    /// the photo is dropped.
    pub async fn on_item_arrived(
        &self,
        conversation: ConversationId,
        photo: PhotoRef,
    ) -> ArrivalOutcome {
        if !self.pipeline.storage.is_ready().await {
            tracing::info!(chat_id = conversation.0, "Photo refused, storage not ready");
            if let Err(e) = self
                .pipeline
                .notifier
                .notify(conversation, replies::NOT_READY)
                .await
            {
                tracing::warn!("Failed to send not-ready reply: {}", e);
            }
            return ArrivalOutcome::NotReady;
        }

        // Sends happen while the entry is locked, so a coordinator retiring
        // under the same lock never misses a photo.
        let mut event = CoordinatorEvent::Arrived(photo);
        loop {
            let handle = self
                .coordinators
                .entry(conversation)
                .or_insert_with(|| self.spawn_coordinator(conversation));

            let sent = handle.sender.send(event);
            match sent {
                Ok(()) => return ArrivalOutcome::Queued,
                Err(mpsc::error::SendError(returned)) => {
                    // Coordinator is gone (its task panicked). Replace it and retry.
                    let stale = handle.id;
                    drop(handle);
                    tracing::warn!(chat_id = conversation.0, "Restarting batch coordinator");
                    self.coordinators
                        .remove_if(&conversation, |_, current| current.id == stale);
                    event = returned;
                }
            }
        }
    }

    /// Number of photos waiting for the conversation's quiet period to end.
    #[allow(dead_code)] // Diagnostics only; the message handler doesn't need it.
    pub async fn pending_count(&self, conversation: ConversationId) -> usize {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = match self.coordinators.get(&conversation) {
            Some(handle) => handle
                .sender
                .send(CoordinatorEvent::PendingCount(reply_tx))
                .is_ok(),
            None => false,
        };
        if !sent {
            return 0;
        }
        reply_rx.await.unwrap_or(0)
    }

    /// Stops every coordinator. Photos still waiting for their quiet period are discarded.
    pub fn shutdown(&self) {
        let active = self.coordinators.len();
        self.coordinators.clear();
        tracing::info!(conversations = active, "Batch uploader stopped");
    }

    fn spawn_coordinator(&self, conversation: ConversationId) -> CoordinatorHandle {
        let id = self.next_coordinator_id.fetch_add(1, Ordering::Relaxed);
        let (sender, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            id,
            conversation,
            quiet_period: self.quiet_period,
            pipeline: Arc::clone(&self.pipeline),
            registry: Arc::downgrade(&self.coordinators),
        };
        tokio::spawn(coordinator.run(rx));
        tracing::debug!(chat_id = conversation.0, "Spawned batch coordinator");
        CoordinatorHandle { id, sender }
    }
}

struct Coordinator {
    id: u64,
    conversation: ConversationId,
    quiet_period: Duration,
    pipeline: Arc<UploadPipeline>,
    registry: Weak<Registry>,
}

impl Coordinator {
    async fn run(self, mut events: mpsc::UnboundedReceiver<CoordinatorEvent>) {
        let mut pending: Vec<PhotoRef> = Vec::new();
        let mut settle_at: Option<Instant> = None;
        let mut idle_at = Instant::now() + COORDINATOR_IDLE_TIMEOUT;

        loop {
            let deadline = settle_at.unwrap_or(idle_at);
            tokio::select! {
                event = events.recv() => match event {
                    Some(CoordinatorEvent::Arrived(photo)) => {
                        pending.push(photo);
                        // Replaces whatever deadline was pending.
                        settle_at = Some(Instant::now() + self.quiet_period);
                    }
                    Some(CoordinatorEvent::PendingCount(reply)) => {
                        let _ = reply.send(pending.len());
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => {
                    if settle_at.take().is_some() {
                        let batch = std::mem::take(&mut pending);
                        let pipeline = Arc::clone(&self.pipeline);
                        let conversation = self.conversation;
                        tokio::spawn(async move {
                            pipeline.flush(conversation, batch).await;
                        });
                    } else if self.retire(&events) {
                        break;
                    }
                    idle_at = Instant::now() + COORDINATOR_IDLE_TIMEOUT;
                }
            }
        }

        if !pending.is_empty() {
            tracing::warn!(
                chat_id = self.conversation.0,
                discarded = pending.len(),
                "Coordinator stopped with photos still pending"
            );
        }
    }

    /// Removes this coordinator's registry entry if nothing is queued for it.
    ///
    /// Runs under the entry's lock, the same lock arrivals send under.
    fn retire(&self, events: &mpsc::UnboundedReceiver<CoordinatorEvent>) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return true;
        };

        let retired = registry
            .remove_if(&self.conversation, |_, handle| {
                handle.id == self.id && events.is_empty()
            })
            .is_some();
        if retired {
            tracing::debug!(chat_id = self.conversation.0, "Retired idle batch coordinator");
        }
        retired
    }
}

impl UploadPipeline {
    /// Uploads a drained batch one photo at a time.
    ///
    /// Returns `None` for an empty batch, in which case nothing is sent.
    async fn flush(
        &self,
        conversation: ConversationId,
        batch: Vec<PhotoRef>,
    ) -> Option<BatchReport> {
        if batch.is_empty() {
            return None;
        }

        let attempted = batch.len();
        tracing::info!(chat_id = conversation.0, photos = attempted, "Batch settled");
        self.reply(conversation, &replies::batch_received(attempted))
            .await;

        let mut succeeded = 0;
        for photo in &batch {
            if self.upload_one(conversation, photo).await {
                succeeded += 1;
            }
        }

        let report = BatchReport {
            attempted,
            succeeded,
        };
        tracing::info!(
            chat_id = conversation.0,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed(),
            "Batch finished"
        );
        self.reply(conversation, &replies::batch_done(succeeded, attempted))
            .await;

        Some(report)
    }

    async fn upload_one(&self, conversation: ConversationId, photo: &PhotoRef) -> bool {
        let bytes = match self.photos.fetch(photo).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(chat_id = conversation.0, "Failed to fetch photo: {}", e);
                return false;
            }
        };

        let filename = photo.storage_filename(conversation);
        match self.storage.upload(bytes, &filename, PHOTO_MIME_TYPE).await {
            Ok(file) => {
                tracing::info!(file_id = %file.id, "Uploaded '{}'", filename);
                true
            }
            Err(e) => {
                tracing::error!(chat_id = conversation.0, "Failed to upload '{}': {}", filename, e);
                false
            }
        }
    }

    async fn reply(&self, conversation: ConversationId, text: &str) {
        if let Err(e) = self.notifier.notify(conversation, text).await {
            tracing::warn!("Failed to send batch reply: {}", e);
        }
    }
}
