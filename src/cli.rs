//! Command-line interface, built on clap.
//!
//! Defines [`Cli`] with subcommands [`Command`] (submit, status, watch,
//! gate) and a global `--verbose` flag.

use clap::{Parser, Subcommand, ValueEnum};

use crate::job::JobKind;

/// Inkflow — lifecycle tracker for AI story generation jobs.
#[derive(Debug, Parser)]
#[command(name = "inkflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable detailed (debug-level) output.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Job kind accepted on the command line, mapped onto
/// [`JobKind`](crate::job::JobKind) internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    /// Full chapter text generation.
    Chapter,
    /// Alternative-branch generation.
    Branch,
    /// Multi-dimension quality review.
    Review,
    /// Continuity check against earlier chapters.
    Consistency,
    /// Canon check against the story bible.
    Canon,
    /// Long-term memory extraction.
    Memory,
    /// Foreshadowing hook extraction.
    Hooks,
    /// Pending-entity extraction.
    Entities,
    /// Chapter summary generation.
    Summary,
}

impl From<KindArg> for JobKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Chapter => JobKind::ChapterGeneration,
            KindArg::Branch => JobKind::BranchGeneration,
            KindArg::Review => JobKind::ReviewScore,
            KindArg::Consistency => JobKind::ConsistencyCheck,
            KindArg::Canon => JobKind::CanonCheck,
            KindArg::Memory => JobKind::MemoryExtraction,
            KindArg::Hooks => JobKind::HookExtraction,
            KindArg::Entities => JobKind::EntityExtraction,
            KindArg::Summary => JobKind::SummaryGeneration,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a generation job for a chapter.
    Submit {
        /// Task kind to run.
        #[arg(value_enum)]
        kind: KindArg,

        /// Chapter the job belongs to.
        chapter: String,

        /// Free-text prompt passed to the task executor.
        prompt: String,

        /// Poll the job to a terminal status after submitting.
        #[arg(long, default_value_t = false)]
        wait: bool,
    },

    /// Fetch the current status of a job.
    Status {
        /// Server-assigned job id.
        job_id: String,
    },

    /// Poll a job until it reaches a terminal status.
    Watch {
        /// Server-assigned job id.
        job_id: String,
    },

    /// Classify a continuity score against the configured thresholds.
    Gate {
        /// Continuity score to classify.
        score: f64,
    },
}
