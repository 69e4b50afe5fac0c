//! Push-stream reconciliation.
//!
//! The backend emits batches of job status observations over a long-lived
//! push channel. The transport itself is abstracted as a channel of raw
//! text payloads; [`StreamReconciler`] decodes each payload, filters it to
//! the chapter in context, merges it into the shared active set and
//! forwards relevant terminal observations for workflow dispatch.
//!
//! A malformed payload is logged and dropped — one bad event must not end
//! the subscription.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::TrackerError;
use crate::job::{ActiveJobSet, Job};

/// One push-channel event: a batch of job status observations.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBatch {
    pub jobs: Vec<Job>,
}

/// Parse a raw push payload into a typed batch.
///
/// Returns `Err` for malformed JSON or a missing `jobs` array.
pub fn decode_batch(payload: &str) -> Result<StatusBatch, TrackerError> {
    serde_json::from_str(payload).map_err(|e| TrackerError::StreamDecode(e.to_string()))
}

/// A job belongs to the current context iff its input names the chapter.
pub fn is_relevant(job: &Job, chapter_id: &str) -> bool {
    job.chapter_id() == Some(chapter_id)
}

/// Merge one batch into the active set.
///
/// Irrelevant jobs are dropped before the merge and trigger nothing.
/// Returns the relevant terminal jobs newly observed, in batch order, for
/// side-effect dispatch. Replaying the same batch leaves the set unchanged
/// and reports no terminals the second time.
pub fn apply_batch(set: &mut ActiveJobSet, batch: StatusBatch, chapter_id: &str) -> Vec<Job> {
    let mut terminals = Vec::new();
    for job in batch.jobs {
        if !is_relevant(&job, chapter_id) {
            continue;
        }
        let newly_terminal = job.is_terminal();
        if set.apply(job.clone()) && newly_terminal {
            terminals.push(job);
        }
    }
    terminals
}

/// Consumes the push channel for one chapter context.
pub struct StreamReconciler {
    chapter_id: String,
    set: Arc<Mutex<ActiveJobSet>>,
    terminal_tx: mpsc::UnboundedSender<Job>,
}

/// Handle to a live subscription task.
pub struct StreamHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Tear the subscription down. Batches still queued on the transport
    /// are not processed after this returns.
    pub async fn unsubscribe(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Wait for the subscription task to exit on its own (the transport
    /// channel closed).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl StreamReconciler {
    pub fn new(
        chapter_id: impl Into<String>,
        set: Arc<Mutex<ActiveJobSet>>,
        terminal_tx: mpsc::UnboundedSender<Job>,
    ) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            set,
            terminal_tx,
        }
    }

    /// Process one raw payload. Malformed payloads are logged and dropped.
    pub fn handle_payload(&self, payload: &str) {
        let batch = match decode_batch(payload) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unreadable status batch");
                return;
            }
        };

        let terminals = {
            let mut set = self.set.lock().expect("active set lock poisoned");
            apply_batch(&mut set, batch, &self.chapter_id)
        };

        for job in terminals {
            tracing::info!(job_id = %job.id, kind = %job.kind, status = %job.status,
                           "terminal status from push stream");
            let _ = self.terminal_tx.send(job);
        }
    }

    /// Spawn the long-lived subscription task over a payload channel.
    ///
    /// The task runs until the channel closes or the returned handle is
    /// unsubscribed. Cancellation is checked before queued payloads, so a
    /// batch already in flight when `unsubscribe` is called is ignored.
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<String>) -> StreamHandle {
        let cancel = CancellationToken::new();
        let child = cancel.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = child.cancelled() => break,
                    payload = rx.recv() => match payload {
                        Some(payload) => self.handle_payload(&payload),
                        None => break,
                    },
                }
            }
        });

        StreamHandle { cancel, task }
    }
}
