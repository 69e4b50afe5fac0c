//! Workflow orchestration over terminal job results.
//!
//! [`WorkflowOrchestrator`] sits above the two update channels. For every
//! terminal job it dispatches one kind-specific side effect (content
//! refresh, branch-list refresh, review storage, report storage, badge
//! update) and drives the iterative sub-workflows: feedback-driven branch
//! rounds, suggestion selection, review accept/reject and staleness.
//!
//! The push stream and a poll loop can both deliver the same terminal
//! observation, so dispatch is idempotent per job id: whichever channel
//! arrives first wins and the replay produces no events.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde_json::{Value, json};

use crate::api::SubmitJob;
use crate::content::{ChapterContent, ContentPatch, ContentStore, ReviewMarker};
use crate::error::{CHECK_FAILED_FALLBACK, TASK_FAILED_FALLBACK, TrackerError};
use crate::gate::{GateConfig, GateResult};
use crate::job::{Job, JobKind, JobStatus};
use crate::review::{self, NormalizedReview, SuggestionPriority};

/// Badge state for best-effort post-process tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadgeState {
    Running,
    Succeeded,
    Failed(String),
}

/// Stored result of a consistency or canon check.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckReport {
    Ready {
        output: Value,
        /// Present for continuity checks, classified against the gate.
        gate: Option<GateResult>,
    },
    /// Retryable failure state shown in the report view.
    Failed { message: String },
}

/// Observable side effects produced by terminal dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    ContentRefreshed,
    RefreshFailed { message: String },
    GenerationFailed { message: String },
    BranchListRefreshed,
    BranchGenerationFailed { message: String },
    ReviewUpdated,
    ReviewFailed { message: String },
    ReportStored { kind: JobKind },
    ReportFailed { kind: JobKind, message: String },
    BadgeChanged { kind: JobKind, state: BadgeState },
}

/// Feedback-driven regeneration bookkeeping.
///
/// The round starts at 1, advances by exactly one per accepted iteration
/// and never decreases except on explicit reset (branch applied).
#[derive(Debug, Clone, PartialEq)]
pub struct IterationState {
    pub round: u32,
    pub pending_feedback: String,
    pub selected_suggestions: BTreeSet<String>,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            round: 1,
            pending_feedback: String::new(),
            selected_suggestions: BTreeSet::new(),
        }
    }
}

/// Bounded memo store for composed feedback strings.
///
/// Oldest-inserted-first eviction. Updating an existing key keeps its
/// insertion slot.
#[derive(Debug)]
pub struct SuggestionCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, String>,
}

impl SuggestionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, value: String) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compose iteration feedback from the selected suggestions plus a
/// free-text addendum.
///
/// Selected suggestions contribute their `suggestion` text in list order,
/// joined by line breaks; a non-blank addendum is appended under a
/// demarcating header. Zero selection and a blank addendum compose to an
/// empty string, which callers must treat as "iteration disabled".
pub fn compose_feedback(
    review: &NormalizedReview,
    selected: &BTreeSet<String>,
    addendum: &str,
) -> String {
    let parts: Vec<&str> = review
        .suggestions
        .iter()
        .filter(|s| selected.contains(&s.aspect))
        .map(|s| s.suggestion.as_str())
        .filter(|t| !t.is_empty())
        .collect();

    let mut text = parts.join("\n");
    let addendum = addendum.trim();
    if !addendum.is_empty() {
        if text.is_empty() {
            text = addendum.to_string();
        } else {
            text = format!("{text}\n\nAdditional notes:\n{addendum}");
        }
    }
    text
}

pub struct WorkflowOrchestrator<S: ContentStore> {
    store: S,
    chapter_id: String,
    gate_config: GateConfig,
    labels: BTreeMap<String, String>,
    content: Option<ChapterContent>,
    review: Option<NormalizedReview>,
    review_fresh: bool,
    iteration: IterationState,
    badges: HashMap<JobKind, BadgeState>,
    reports: HashMap<JobKind, CheckReport>,
    dispatched: HashSet<String>,
    feedback_cache: SuggestionCache,
}

impl<S: ContentStore> WorkflowOrchestrator<S> {
    pub fn new(store: S, chapter_id: impl Into<String>, gate_config: GateConfig) -> Self {
        Self {
            store,
            chapter_id: chapter_id.into(),
            gate_config,
            labels: review::default_labels(),
            content: None,
            review: None,
            review_fresh: false,
            iteration: IterationState::default(),
            badges: HashMap::new(),
            reports: HashMap::new(),
            dispatched: HashSet::new(),
            feedback_cache: SuggestionCache::new(32),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.feedback_cache = SuggestionCache::new(capacity);
        self
    }

    /// Note a non-terminal observation. Post-process jobs get a running
    /// badge; everything else needs no pre-terminal bookkeeping here.
    pub fn on_running(&mut self, job: &Job) {
        if job.kind.is_post_process() && !job.is_terminal() {
            self.badges.insert(job.kind, BadgeState::Running);
        }
    }

    /// Dispatch side effects for a terminal job.
    ///
    /// Exactly once per job id: replayed observations return no events.
    pub async fn on_terminal(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        if !job.is_terminal() {
            return Vec::new();
        }
        if !self.dispatched.insert(job.id.clone()) {
            return Vec::new();
        }

        tracing::info!(job_id = %job.id, kind = %job.kind, status = %job.status,
                       "dispatching terminal job");

        match job.kind {
            JobKind::ChapterGeneration => self.finish_generation(job).await,
            JobKind::BranchGeneration => self.finish_branch(job),
            JobKind::ReviewScore => self.finish_review(job),
            JobKind::ConsistencyCheck | JobKind::CanonCheck => self.finish_report(job),
            _ => self.finish_post_process(job),
        }
    }

    async fn finish_generation(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        if job.status != JobStatus::Succeeded {
            // Prior content stays untouched on failure.
            return vec![WorkflowEvent::GenerationFailed {
                message: failure_message(job, TASK_FAILED_FALLBACK),
            }];
        }

        match self.store.get_content(&self.chapter_id).await {
            Ok(content) => {
                self.content = Some(content);
                vec![WorkflowEvent::ContentRefreshed]
            }
            Err(e) => {
                tracing::warn!(chapter_id = %self.chapter_id, error = %e,
                               "content refresh after generation failed");
                vec![WorkflowEvent::RefreshFailed {
                    message: e.to_string(),
                }]
            }
        }
    }

    fn finish_branch(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        if job.status == JobStatus::Succeeded {
            vec![WorkflowEvent::BranchListRefreshed]
        } else {
            vec![WorkflowEvent::BranchGenerationFailed {
                message: failure_message(job, TASK_FAILED_FALLBACK),
            }]
        }
    }

    fn finish_review(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        if job.status != JobStatus::Succeeded {
            self.review_fresh = false;
            return vec![WorkflowEvent::ReviewFailed {
                message: failure_message(job, TASK_FAILED_FALLBACK),
            }];
        }

        let normalized = review::normalize(job.output.as_ref(), &self.labels);
        // Default selection on a new review: all suggestions.
        self.iteration.selected_suggestions = normalized
            .suggestions
            .iter()
            .map(|s| s.aspect.clone())
            .collect();
        // A fresh review supersedes any previous accept/reject decision.
        if let Some(content) = &mut self.content {
            content.review_marker = None;
        }
        self.review = Some(normalized);
        self.review_fresh = true;
        vec![WorkflowEvent::ReviewUpdated]
    }

    fn finish_report(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        if job.status == JobStatus::Succeeded {
            let output = job.output.clone().unwrap_or(Value::Null);
            let gate = (job.kind == JobKind::ConsistencyCheck)
                .then(|| GateResult::from_output(&output, &self.gate_config));
            self.reports
                .insert(job.kind, CheckReport::Ready { output, gate });
            vec![WorkflowEvent::ReportStored { kind: job.kind }]
        } else {
            let message = failure_message(job, CHECK_FAILED_FALLBACK);
            self.reports.insert(
                job.kind,
                CheckReport::Failed {
                    message: message.clone(),
                },
            );
            vec![WorkflowEvent::ReportFailed {
                kind: job.kind,
                message,
            }]
        }
    }

    fn finish_post_process(&mut self, job: &Job) -> Vec<WorkflowEvent> {
        let state = if job.status == JobStatus::Succeeded {
            BadgeState::Succeeded
        } else {
            BadgeState::Failed(failure_message(job, TASK_FAILED_FALLBACK))
        };
        self.badges.insert(job.kind, state.clone());
        vec![WorkflowEvent::BadgeChanged {
            kind: job.kind,
            state,
        }]
    }

    /// Resubmit a failed consistency or canon check.
    pub async fn retry_check(
        &self,
        submitter: &impl SubmitJob,
        kind: JobKind,
    ) -> Result<Job, TrackerError> {
        debug_assert!(kind.is_report());
        submitter
            .submit_job(kind, json!({"chapter_id": self.chapter_id}))
            .await
    }

    // --- branch iteration ---

    /// Submit the next feedback-driven branch generation round.
    ///
    /// No-op (returns `Ok(false)`) when the pending feedback is blank and
    /// there is no selected content to iterate on. On acceptance the
    /// round advances by exactly one and the feedback buffer is cleared;
    /// a submission failure leaves both untouched.
    pub async fn request_iteration(
        &mut self,
        submitter: &impl SubmitJob,
        selected_content: Option<&str>,
    ) -> Result<bool, TrackerError> {
        let feedback = self.iteration.pending_feedback.trim().to_string();
        let has_content = selected_content.is_some_and(|c| !c.trim().is_empty());
        if feedback.is_empty() && !has_content {
            return Ok(false);
        }

        let next_round = self.iteration.round + 1;
        let input = json!({
            "chapter_id": self.chapter_id,
            "selected_content": selected_content,
            "feedback": feedback,
            "iteration_round": next_round,
        });
        let job = submitter.submit_job(JobKind::BranchGeneration, input).await?;

        tracing::info!(job_id = %job.id, round = next_round, "branch iteration submitted");
        self.iteration.round = next_round;
        self.iteration.pending_feedback.clear();
        Ok(true)
    }

    /// Reset iteration bookkeeping after a branch is applied.
    pub fn reset_iteration(&mut self) {
        self.iteration = IterationState::default();
    }

    pub fn set_pending_feedback(&mut self, text: impl Into<String>) {
        self.iteration.pending_feedback = text.into();
    }

    pub fn iteration(&self) -> &IterationState {
        &self.iteration
    }

    // --- suggestion-driven feedback ---

    pub fn select_all_suggestions(&mut self) {
        self.iteration.selected_suggestions = self
            .review
            .iter()
            .flat_map(|r| r.suggestions.iter())
            .map(|s| s.aspect.clone())
            .collect();
    }

    pub fn select_high_priority(&mut self) {
        self.iteration.selected_suggestions = self
            .review
            .iter()
            .flat_map(|r| r.suggestions.iter())
            .filter(|s| s.priority == SuggestionPriority::High)
            .map(|s| s.aspect.clone())
            .collect();
    }

    pub fn set_selected_suggestions(&mut self, keys: BTreeSet<String>) {
        self.iteration.selected_suggestions = keys;
    }

    /// Whether the current selection and addendum would produce feedback.
    /// When false, the iteration action is disabled.
    pub fn can_iterate(&self, addendum: &str) -> bool {
        match &self.review {
            Some(review) => {
                !compose_feedback(review, &self.iteration.selected_suggestions, addendum)
                    .is_empty()
            }
            None => !addendum.trim().is_empty(),
        }
    }

    /// Compose feedback from the selection (memoized per chapter, round
    /// and selection) and stage it as the pending feedback. Returns
    /// whether anything was staged.
    pub fn stage_feedback(&mut self, addendum: &str) -> bool {
        let Some(review) = &self.review else {
            let addendum = addendum.trim();
            if addendum.is_empty() {
                return false;
            }
            self.iteration.pending_feedback = addendum.to_string();
            return true;
        };

        let key = format!(
            "{}:{}:{}:{}",
            self.chapter_id,
            self.iteration.round,
            self.iteration
                .selected_suggestions
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(","),
            addendum.trim(),
        );

        let feedback = match self.feedback_cache.get(&key) {
            Some(cached) => cached.to_string(),
            None => {
                let composed =
                    compose_feedback(review, &self.iteration.selected_suggestions, addendum);
                self.feedback_cache.insert(key, composed.clone());
                composed
            }
        };

        if feedback.is_empty() {
            return false;
        }
        self.iteration.pending_feedback = feedback;
        true
    }

    // --- staleness ---

    /// A review is stale iff the content was modified strictly after the
    /// review was captured. Informational only; blocks nothing.
    pub fn review_is_stale(&self) -> bool {
        match (&self.review, &self.content) {
            (Some(review), Some(content)) => content.updated_at > review.captured_at,
            _ => false,
        }
    }

    // --- accept / reject ---

    /// Accept the current review: mark the chapter approved.
    pub async fn accept_review(&mut self) -> Result<(), TrackerError> {
        self.patch_marker(ReviewMarker::Approved).await
    }

    /// Reject the current review: mark the chapter for regeneration.
    pub async fn reject_review(&mut self) -> Result<(), TrackerError> {
        self.patch_marker(ReviewMarker::NeedsRegeneration).await
    }

    async fn patch_marker(&mut self, marker: ReviewMarker) -> Result<(), TrackerError> {
        self.store
            .patch_content(&self.chapter_id, ContentPatch::marker(marker))
            .await?;
        if let Some(content) = &mut self.content {
            content.review_marker = Some(marker);
        }
        Ok(())
    }

    // --- accessors ---

    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }

    pub fn content(&self) -> Option<&ChapterContent> {
        self.content.as_ref()
    }

    pub fn review(&self) -> Option<&NormalizedReview> {
        self.review.as_ref()
    }

    pub fn review_fresh(&self) -> bool {
        self.review_fresh
    }

    pub fn badge(&self, kind: JobKind) -> Option<&BadgeState> {
        self.badges.get(&kind)
    }

    pub fn report(&self, kind: JobKind) -> Option<&CheckReport> {
        self.reports.get(&kind)
    }
}

fn failure_message(job: &Job, fallback: &str) -> String {
    job.error.clone().unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Verdict;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    // --- test doubles ---

    #[derive(Default)]
    struct MemoryStore {
        content: Mutex<Option<ChapterContent>>,
        patches: Mutex<Vec<ContentPatch>>,
        fail_get: bool,
    }

    impl MemoryStore {
        fn with_content(body: &str) -> Self {
            Self {
                content: Mutex::new(Some(ChapterContent {
                    chapter_id: "ch-1".into(),
                    body: body.into(),
                    review_marker: None,
                    updated_at: Utc::now(),
                })),
                ..Default::default()
            }
        }
    }

    impl ContentStore for MemoryStore {
        async fn get_content(&self, chapter_id: &str) -> Result<ChapterContent, TrackerError> {
            if self.fail_get {
                return Err(TrackerError::Config("store offline".into()));
            }
            self.content
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| TrackerError::Config(format!("no content for {chapter_id}")))
        }

        async fn patch_content(
            &self,
            _chapter_id: &str,
            patch: ContentPatch,
        ) -> Result<(), TrackerError> {
            if let Some(content) = self.content.lock().unwrap().as_mut() {
                if let Some(body) = &patch.body {
                    content.body = body.clone();
                }
                if let Some(marker) = patch.review_marker {
                    content.review_marker = Some(marker);
                }
            }
            self.patches.lock().unwrap().push(patch);
            Ok(())
        }
    }

    struct RecordingSubmitter {
        submitted: Mutex<Vec<(JobKind, Value)>>,
        fail: bool,
    }

    impl RecordingSubmitter {
        fn new() -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                submitted: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl SubmitJob for RecordingSubmitter {
        async fn submit_job(&self, kind: JobKind, input: Value) -> Result<Job, TrackerError> {
            if self.fail {
                return Err(TrackerError::SubmissionFailed("backend down".into()));
            }
            self.submitted.lock().unwrap().push((kind, input.clone()));
            Ok(Job::new("sub-1", kind, JobStatus::Queued, input))
        }
    }

    fn orchestrator(store: MemoryStore) -> WorkflowOrchestrator<MemoryStore> {
        WorkflowOrchestrator::new(store, "ch-1", GateConfig::new(6.8, 4.9).unwrap())
    }

    fn terminal_job(id: &str, kind: JobKind, status: JobStatus) -> Job {
        Job::new(id, kind, status, json!({"chapter_id": "ch-1"}))
    }

    fn review_job(id: &str, output: Value) -> Job {
        let mut job = terminal_job(id, JobKind::ReviewScore, JobStatus::Succeeded);
        job.output = Some(output);
        job
    }

    // --- terminal dispatch ---

    #[tokio::test]
    async fn dispatch_is_exactly_once_per_job_id() {
        let mut orch = orchestrator(MemoryStore::with_content("chapter text"));
        let job = terminal_job("j1", JobKind::BranchGeneration, JobStatus::Succeeded);

        let first = orch.on_terminal(&job).await;
        let replay = orch.on_terminal(&job).await;

        assert_eq!(first, vec![WorkflowEvent::BranchListRefreshed]);
        assert!(replay.is_empty());
    }

    #[tokio::test]
    async fn generation_success_refreshes_content() {
        let mut orch = orchestrator(MemoryStore::with_content("the storm broke at dawn"));
        let job = terminal_job("j1", JobKind::ChapterGeneration, JobStatus::Succeeded);

        let events = orch.on_terminal(&job).await;

        assert_eq!(events, vec![WorkflowEvent::ContentRefreshed]);
        assert_eq!(orch.content().unwrap().body, "the storm broke at dawn");
    }

    #[tokio::test]
    async fn generation_failure_leaves_content_untouched() {
        let mut orch = orchestrator(MemoryStore::with_content("original"));
        let mut job = terminal_job("j1", JobKind::ChapterGeneration, JobStatus::Failed);
        job.error = Some("model overloaded".into());

        let events = orch.on_terminal(&job).await;

        assert_eq!(
            events,
            vec![WorkflowEvent::GenerationFailed {
                message: "model overloaded".into()
            }]
        );
        assert!(orch.content().is_none());
    }

    #[tokio::test]
    async fn refresh_failure_is_reported_separately() {
        let store = MemoryStore {
            fail_get: true,
            ..Default::default()
        };
        let mut orch = orchestrator(store);
        let job = terminal_job("j1", JobKind::ChapterGeneration, JobStatus::Succeeded);

        let events = orch.on_terminal(&job).await;
        assert!(matches!(events[0], WorkflowEvent::RefreshFailed { .. }));
    }

    #[tokio::test]
    async fn review_success_stores_normalized_review() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let job = review_job(
            "j1",
            json!({
                "dimensions": {"plot": 8, "pacing": {"score": 6, "comment": "slow"}},
                "suggestions": [
                    {"aspect": "pacing", "issue": "drags", "suggestion": "trim", "priority": "high"},
                    {"aspect": "prose", "issue": "flat", "suggestion": "vary rhythm"}
                ]
            }),
        );

        let events = orch.on_terminal(&job).await;

        assert_eq!(events, vec![WorkflowEvent::ReviewUpdated]);
        assert!(orch.review_fresh());
        let review = orch.review().unwrap();
        assert_eq!(review.avg_score, 7.0);
        // Default selection is all suggestions.
        assert_eq!(
            orch.iteration().selected_suggestions,
            BTreeSet::from(["pacing".to_string(), "prose".to_string()])
        );
    }

    #[tokio::test]
    async fn review_failure_marks_review_not_fresh() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let job = terminal_job("j1", JobKind::ReviewScore, JobStatus::Failed);

        let events = orch.on_terminal(&job).await;
        assert_eq!(
            events,
            vec![WorkflowEvent::ReviewFailed {
                message: TASK_FAILED_FALLBACK.into()
            }]
        );
        assert!(!orch.review_fresh());
    }

    #[tokio::test]
    async fn consistency_report_is_gated() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let mut job = terminal_job("j1", JobKind::ConsistencyCheck, JobStatus::Succeeded);
        job.output = Some(json!({"score": 8.2, "issues": []}));

        orch.on_terminal(&job).await;

        match orch.report(JobKind::ConsistencyCheck).unwrap() {
            CheckReport::Ready { gate: Some(gate), .. } => {
                assert_eq!(gate.verdict, Verdict::Pass);
                assert!(gate.recommended);
            }
            other => panic!("expected gated report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn canon_failure_stores_fallback_message() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let job = terminal_job("j1", JobKind::CanonCheck, JobStatus::Failed);

        let events = orch.on_terminal(&job).await;

        assert_eq!(
            events,
            vec![WorkflowEvent::ReportFailed {
                kind: JobKind::CanonCheck,
                message: CHECK_FAILED_FALLBACK.into()
            }]
        );
        assert_eq!(
            orch.report(JobKind::CanonCheck),
            Some(&CheckReport::Failed {
                message: CHECK_FAILED_FALLBACK.into()
            })
        );
    }

    #[tokio::test]
    async fn post_process_badge_transitions() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));

        let running = Job::new(
            "j1",
            JobKind::MemoryExtraction,
            JobStatus::Running,
            json!({"chapter_id": "ch-1"}),
        );
        orch.on_running(&running);
        assert_eq!(
            orch.badge(JobKind::MemoryExtraction),
            Some(&BadgeState::Running)
        );

        let mut failed = terminal_job("j1", JobKind::MemoryExtraction, JobStatus::Failed);
        failed.error = Some("embedding store unreachable".into());
        let events = orch.on_terminal(&failed).await;

        assert_eq!(
            events,
            vec![WorkflowEvent::BadgeChanged {
                kind: JobKind::MemoryExtraction,
                state: BadgeState::Failed("embedding store unreachable".into())
            }]
        );
    }

    #[tokio::test]
    async fn canceled_branch_surfaces_as_failure() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let job = terminal_job("j1", JobKind::BranchGeneration, JobStatus::Canceled);

        let events = orch.on_terminal(&job).await;
        assert!(matches!(
            events[0],
            WorkflowEvent::BranchGenerationFailed { .. }
        ));
    }

    // --- branch iteration ---

    #[tokio::test]
    async fn iteration_advances_round_by_exactly_one() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let submitter = RecordingSubmitter::new();

        orch.set_pending_feedback("more tension in the duel");
        let accepted = orch
            .request_iteration(&submitter, Some("branch two text"))
            .await
            .unwrap();

        assert!(accepted);
        assert_eq!(orch.iteration().round, 2);
        assert!(orch.iteration().pending_feedback.is_empty());

        let submitted = submitter.submitted.lock().unwrap();
        let (kind, input) = &submitted[0];
        assert_eq!(*kind, JobKind::BranchGeneration);
        assert_eq!(input["iteration_round"], 2);
        assert_eq!(input["feedback"], "more tension in the duel");
        assert_eq!(input["selected_content"], "branch two text");
    }

    #[tokio::test]
    async fn iteration_rejects_blank_feedback_without_content() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let submitter = RecordingSubmitter::new();

        orch.set_pending_feedback("   ");
        let accepted = orch.request_iteration(&submitter, None).await.unwrap();

        assert!(!accepted);
        assert_eq!(orch.iteration().round, 1);
        assert!(submitter.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn iteration_submission_failure_keeps_round() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let submitter = RecordingSubmitter::failing();

        orch.set_pending_feedback("try again");
        let err = orch.request_iteration(&submitter, None).await.unwrap_err();

        assert!(matches!(err, TrackerError::SubmissionFailed(_)));
        assert_eq!(orch.iteration().round, 1);
        assert_eq!(orch.iteration().pending_feedback, "try again");
    }

    #[tokio::test]
    async fn reset_returns_round_to_one() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        let submitter = RecordingSubmitter::new();

        orch.set_pending_feedback("round two");
        orch.request_iteration(&submitter, None).await.unwrap();
        orch.set_pending_feedback("round three");
        orch.request_iteration(&submitter, None).await.unwrap();
        assert_eq!(orch.iteration().round, 3);

        orch.reset_iteration();
        assert_eq!(orch.iteration().round, 1);
    }

    // --- suggestion-driven feedback ---

    fn review_with_suggestions() -> Value {
        json!({
            "dimensions": {"plot": 7},
            "suggestions": [
                {"aspect": "pacing", "issue": "drags", "suggestion": "trim the middle",
                 "priority": "high"},
                {"aspect": "prose", "issue": "flat", "suggestion": "vary rhythm"},
                {"aspect": "stakes", "issue": "low", "suggestion": "raise the cost",
                 "priority": "high"}
            ]
        })
    }

    #[tokio::test]
    async fn composed_feedback_joins_selected_in_list_order() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&review_job("j1", review_with_suggestions()))
            .await;

        assert!(orch.stage_feedback(""));
        assert_eq!(
            orch.iteration().pending_feedback,
            "trim the middle\nvary rhythm\nraise the cost"
        );
    }

    #[tokio::test]
    async fn addendum_is_demarcated() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&review_job("j1", review_with_suggestions()))
            .await;
        orch.set_selected_suggestions(BTreeSet::from(["pacing".to_string()]));

        orch.stage_feedback("keep the rain motif");
        assert_eq!(
            orch.iteration().pending_feedback,
            "trim the middle\n\nAdditional notes:\nkeep the rain motif"
        );
    }

    #[tokio::test]
    async fn high_priority_selector_narrows_selection() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&review_job("j1", review_with_suggestions()))
            .await;

        orch.select_high_priority();
        assert_eq!(
            orch.iteration().selected_suggestions,
            BTreeSet::from(["pacing".to_string(), "stakes".to_string()])
        );
    }

    #[tokio::test]
    async fn zero_selection_and_blank_addendum_disable_iteration() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&review_job("j1", review_with_suggestions()))
            .await;

        orch.set_selected_suggestions(BTreeSet::new());
        assert!(!orch.can_iterate(""));
        assert!(!orch.stage_feedback("   "));
        assert!(orch.iteration().pending_feedback.is_empty());

        assert!(orch.can_iterate("but fix the ending"));
    }

    // --- staleness ---

    #[tokio::test]
    async fn review_is_stale_only_when_content_is_newer() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&terminal_job(
            "g1",
            JobKind::ChapterGeneration,
            JobStatus::Succeeded,
        ))
        .await;
        orch.on_terminal(&review_job("j1", json!({"avg_score": 8})))
            .await;

        // Review captured after the content refresh: not stale.
        assert!(!orch.review_is_stale());

        // Content edited after the review.
        orch.content.as_mut().unwrap().updated_at = Utc::now() + ChronoDuration::seconds(30);
        assert!(orch.review_is_stale());
    }

    // --- accept / reject ---

    #[tokio::test]
    async fn accept_then_reject_overwrites_marker() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&terminal_job(
            "g1",
            JobKind::ChapterGeneration,
            JobStatus::Succeeded,
        ))
        .await;

        orch.accept_review().await.unwrap();
        assert_eq!(
            orch.content().unwrap().review_marker,
            Some(ReviewMarker::Approved)
        );

        orch.reject_review().await.unwrap();
        assert_eq!(
            orch.content().unwrap().review_marker,
            Some(ReviewMarker::NeedsRegeneration)
        );

        let patches = orch.store.patches.lock().unwrap();
        assert_eq!(patches.len(), 2);
    }

    #[tokio::test]
    async fn new_review_clears_previous_decision() {
        let mut orch = orchestrator(MemoryStore::with_content("text"));
        orch.on_terminal(&terminal_job(
            "g1",
            JobKind::ChapterGeneration,
            JobStatus::Succeeded,
        ))
        .await;
        orch.accept_review().await.unwrap();

        orch.on_terminal(&review_job("j2", json!({"avg_score": 6.5})))
            .await;
        assert_eq!(orch.content().unwrap().review_marker, None);
    }

    // --- suggestion cache ---

    #[test]
    fn cache_evicts_oldest_inserted_first() {
        let mut cache = SuggestionCache::new(2);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("c".into(), "3".into());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some("2"));
        assert_eq!(cache.get("c"), Some("3"));
    }

    #[test]
    fn cache_update_keeps_insertion_slot() {
        let mut cache = SuggestionCache::new(2);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        cache.insert("a".into(), "updated".into());
        cache.insert("c".into(), "3".into());

        // "a" kept its original (oldest) slot, so it was evicted first.
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b"), Some("2"));
    }

    // --- retry ---

    #[tokio::test]
    async fn retry_check_resubmits_same_kind() {
        let orch = orchestrator(MemoryStore::with_content("text"));
        let submitter = RecordingSubmitter::new();

        let job = orch
            .retry_check(&submitter, JobKind::CanonCheck)
            .await
            .unwrap();
        assert_eq!(job.kind, JobKind::CanonCheck);
        assert_eq!(job.input["chapter_id"], "ch-1");
    }
}
