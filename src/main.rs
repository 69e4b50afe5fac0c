use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use inkflow::api::{JobClient, PollOptions};
use inkflow::cli::{Cli, Command};
use inkflow::config::TrackerConfig;
use inkflow::gate;
use inkflow::job::{JobKind, JobStatus};
use inkflow::review;
use inkflow::ui::{self, JobProgress};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = TrackerConfig::load()?;
    let client = JobClient::new(config.api_base_url.clone());

    match cli.command {
        Command::Submit {
            kind,
            chapter,
            prompt,
            wait,
        } => {
            let job = client
                .submit(
                    kind.into(),
                    serde_json::json!({"chapter_id": chapter, "prompt": prompt}),
                )
                .await?;
            println!("submitted {} ({})", job.id, job.kind);
            if wait {
                watch_job(&client, &job.id, &config).await?;
            }
        }

        Command::Status { job_id } => {
            let job = client.fetch(&job_id).await?;
            if job.kind == JobKind::ReviewScore && job.status == JobStatus::Succeeded {
                let review = review::normalize(job.output.as_ref(), &review::default_labels());
                ui::print_review(&review);
            } else {
                println!("{}", serde_json::to_string_pretty(&job)?);
            }
        }

        Command::Watch { job_id } => {
            watch_job(&client, &job_id, &config).await?;
        }

        Command::Gate { score } => {
            let result = gate::classify(score, &config.gate_config()?);
            ui::print_gate(&result);
        }
    }

    Ok(())
}

/// Poll a job to a terminal status with spinner feedback.
async fn watch_job(client: &JobClient, job_id: &str, config: &TrackerConfig) -> Result<()> {
    let progress = JobProgress::start(job_id);
    let opts = PollOptions {
        interval: Duration::from_millis(config.poll_interval_ms),
        max_attempts: config.poll_max_attempts,
        cancel: CancellationToken::new(),
    };

    match client
        .poll_until_terminal(job_id, &opts, |status| progress.update_status(status))
        .await
    {
        Ok(output) => {
            progress.succeed();
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            progress.fail(&e.to_string());
            Err(e.into())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "inkflow=debug" } else { "inkflow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}
