//! Content source-of-truth collaborator and debounced autosave.
//!
//! Chapter storage is owned by the backend; the tracker reads and patches
//! it through [`ContentStore`] but persists nothing itself. Rapid edits
//! are decoupled from persistence by [`DebouncedSaver`], which coalesces
//! them into one save after a quiet period.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::TrackerError;

/// Review decision marker carried on chapter metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMarker {
    Approved,
    NeedsRegeneration,
}

/// Chapter content as served by the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterContent {
    pub chapter_id: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_marker: Option<ReviewMarker>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update pushed back to the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_marker: Option<ReviewMarker>,
}

impl ContentPatch {
    pub fn body(text: impl Into<String>) -> Self {
        Self {
            body: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn marker(marker: ReviewMarker) -> Self {
        Self {
            review_marker: Some(marker),
            ..Default::default()
        }
    }
}

/// External read/write collaborator owning chapter storage.
pub trait ContentStore {
    async fn get_content(&self, chapter_id: &str) -> Result<ChapterContent, TrackerError>;
    async fn patch_content(&self, chapter_id: &str, patch: ContentPatch)
    -> Result<(), TrackerError>;
}

/// Coalesces rapid edits into a single save after a quiet period.
///
/// Each `schedule` call restarts the timer, so only the latest patch
/// survives a burst of edits. An explicit `save_now` cancels any pending
/// timer and forwards immediately — safe to call while a timer is armed.
pub struct DebouncedSaver {
    delay: Duration,
    tx: mpsc::UnboundedSender<ContentPatch>,
    pending: Option<JoinHandle<()>>,
}

impl DebouncedSaver {
    pub fn new(delay: Duration, tx: mpsc::UnboundedSender<ContentPatch>) -> Self {
        Self {
            delay,
            tx,
            pending: None,
        }
    }

    /// Arm (or re-arm) the quiet-period timer for this patch.
    pub fn schedule(&mut self, patch: ContentPatch) {
        self.cancel_pending();
        let tx = self.tx.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(patch);
        }));
    }

    /// Bypass the debounce: cancel any armed timer and save immediately.
    pub fn save_now(&mut self, patch: ContentPatch) {
        self.cancel_pending();
        let _ = self.tx.send(patch);
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
