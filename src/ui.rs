//! Terminal output — spinner and styled summaries.
//!
//! Uses `indicatif` for the poll spinner and `console` for styling.
//! [`JobProgress`] tracks a single watched job; the free functions render
//! normalized reviews and gate results.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::gate::GateResult;
use crate::job::JobStatus;
use crate::review::NormalizedReview;

/// Visual progress for one polled job.
pub struct JobProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl JobProgress {
    /// Start the spinner for the given job id.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message(format!("waiting: {job_id}"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    /// Reflect a newly observed status on the spinner.
    pub fn update_status(&self, status: JobStatus) {
        self.pb.set_message(format!("{status}"));
    }

    /// Finish the spinner after a successful terminal status.
    pub fn succeed(&self) {
        self.pb.finish_and_clear();
        println!("  {} Job completed", self.green.apply_to("✓"));
    }

    /// Finish the spinner after a failure or timeout.
    pub fn fail(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.red.apply_to("✗"));
    }
}

/// Print a normalized review as a styled summary.
pub fn print_review(review: &NormalizedReview) {
    let heading = Style::new().cyan().bold();
    println!();
    println!("{}", heading.apply_to("─── Review ───"));
    println!("  score: {} ({})", review.avg_score, review.grade);
    if !review.summary.is_empty() {
        println!("  {}", review.summary);
    }
    for dim in &review.dimensions {
        match &dim.comment {
            Some(comment) => println!("  {:<12} {:>4}  {comment}", dim.label, dim.score),
            None => println!("  {:<12} {:>4}", dim.label, dim.score),
        }
    }
    for suggestion in &review.suggestions {
        println!("  • [{:?}] {}: {}", suggestion.priority, suggestion.aspect, suggestion.suggestion);
    }
}

/// Print a gate result as pretty JSON.
pub fn print_gate(result: &GateResult) {
    let style = if result.recommended {
        Style::new().green().bold()
    } else {
        Style::new().yellow()
    };
    println!("{}", style.apply_to(format!("verdict: {}", result.verdict)));
    println!(
        "{}",
        serde_json::to_string_pretty(result).unwrap_or_default()
    );
}
