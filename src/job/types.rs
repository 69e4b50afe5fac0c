use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status reported by the task executor.
///
/// Terminal statuses are write-once: once observed for a job id, no
/// further transitions for that job occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Closed taxonomy of task kinds the tracker knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full chapter text generation.
    ChapterGeneration,
    /// Alternative-branch generation for an iteration round.
    BranchGeneration,
    /// Multi-dimension quality review of a chapter.
    ReviewScore,
    /// Continuity check against earlier chapters.
    ConsistencyCheck,
    /// Canon check against the story bible.
    CanonCheck,
    /// Post-process: long-term memory extraction.
    MemoryExtraction,
    /// Post-process: foreshadowing hook extraction.
    HookExtraction,
    /// Post-process: pending-entity extraction.
    EntityExtraction,
    /// Post-process: chapter summary generation.
    SummaryGeneration,
}

impl JobKind {
    /// Best-effort background tasks whose failure never blocks authoring.
    pub const POST_PROCESS: [JobKind; 4] = [
        JobKind::MemoryExtraction,
        JobKind::HookExtraction,
        JobKind::EntityExtraction,
        JobKind::SummaryGeneration,
    ];

    pub fn is_post_process(self) -> bool {
        Self::POST_PROCESS.contains(&self)
    }

    /// Report-style checks: failures are stored and offered a retry.
    pub fn is_report(self) -> bool {
        matches!(self, JobKind::ConsistencyCheck | JobKind::CanonCheck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ChapterGeneration => "chapter_generation",
            JobKind::BranchGeneration => "branch_generation",
            JobKind::ReviewScore => "review_score",
            JobKind::ConsistencyCheck => "consistency_check",
            JobKind::CanonCheck => "canon_check",
            JobKind::MemoryExtraction => "memory_extraction",
            JobKind::HookExtraction => "hook_extraction",
            JobKind::EntityExtraction => "entity_extraction",
            JobKind::SummaryGeneration => "summary_generation",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Timestamp default for status batches that omit the field. The epoch (and
// not "now") keeps a timestamp-less echo from looking fresher than a
// terminal observation already recorded for the same id.
fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// A single long-running generation task tracked by the client.
///
/// Created by job submission in `Queued` status and mutated only by the
/// arrival of a fresher observation from the poll or push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    /// Task-specific payload. Carries the owning `chapter_id` used for
    /// relevance filtering.
    #[serde(default)]
    pub input: Value,
    /// Task result, present only once the job has succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure message, present only once the job has failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default = "epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch")]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, status: JobStatus, input: Value) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            status,
            input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The chapter this job belongs to, read from its input payload.
    pub fn chapter_id(&self) -> Option<&str> {
        self.input.get("chapter_id").and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
