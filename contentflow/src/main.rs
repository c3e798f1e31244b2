//! Command line front end for running and inspecting content jobs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use contentflow::observability::init_tracing;
use contentflow::prelude::*;

/// Runs content-generation jobs against a durable step ledger.
#[derive(Debug, Parser)]
#[command(name = "contentflow", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file; environment variables apply on top.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Ledger directory. Overrides the configured one.
    #[arg(long, global = true, env = "CONTENTFLOW_LEDGER_DIR")]
    ledger_dir: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submits a job and waits for it to finish.
    Run {
        /// Article topic.
        topic: String,

        /// Target article length in words.
        #[arg(long, default_value_t = contentflow::core::DEFAULT_TARGET_WORDS)]
        words: u32,

        /// Article language.
        #[arg(long, default_value = "en")]
        language: String,
    },

    /// Prints the status of a job.
    Status {
        /// Job id.
        job_id: String,
    },

    /// Resumes one unfinished job.
    Resume {
        /// Job id.
        job_id: String,
    },

    /// Resumes every unfinished job in the ledger.
    Recover,
}

fn load_config(cli: &Cli) -> Result<ContentflowConfig> {
    let base = match &cli.config {
        Some(path) => ContentflowConfig::from_json_file(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => ContentflowConfig::default(),
    };
    let mut config = base.with_env_overrides(|key| std::env::var(key).ok())?;
    if let Some(dir) = &cli.ledger_dir {
        config.ledger_dir = Some(dir.clone());
    }
    if cli.json_logs {
        config.log_json = true;
    }
    Ok(config)
}

fn build_dispatcher(config: &ContentflowConfig) -> Result<JobDispatcher> {
    let store: Arc<dyn LedgerStore> = match &config.ledger_dir {
        Some(dir) => Arc::new(FileLedgerStore::open(dir.clone())?),
        None => Arc::new(InMemoryLedgerStore::new()),
    };
    let providers = StepProviders::from_config(config)?;
    if providers.models.is_empty() {
        tracing::warn!("no language model configured; drafting will fail");
    }
    let sequence = standard_sequence(config, &providers)?;
    let orchestrator = Orchestrator::new(sequence, store)
        .with_events(Arc::new(LoggingEventSink::default()))
        .with_quality(config.quality.clone());
    Ok(JobDispatcher::new(Arc::new(orchestrator)))
}

async fn print_status(dispatcher: &JobDispatcher, job_id: &JobId) -> Result<()> {
    let status = dispatcher.status(job_id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_level, config.log_json);

    let dispatcher = build_dispatcher(&config)?;

    match cli.command {
        Command::Run {
            topic,
            words,
            language,
        } => {
            if config.ledger_dir.is_none() {
                tracing::info!("no ledger directory set; job state is kept in memory");
            }
            let params = JobParams::new(topic)
                .with_target_word_count(words)
                .with_language(language);
            let handle = dispatcher.submit(params).await?;
            let job_id = handle.job_id().clone();
            let state = handle.wait().await;
            print_status(&dispatcher, &job_id).await?;
            if state != JobState::Completed {
                bail!("job {job_id} ended in state {state:?}");
            }
        }
        Command::Status { job_id } => {
            print_status(&dispatcher, &JobId::from(job_id)).await?;
        }
        Command::Resume { job_id } => {
            let job_id = JobId::from(job_id);
            let state = dispatcher.resume(&job_id).await?.wait().await;
            print_status(&dispatcher, &job_id).await?;
            if state != JobState::Completed {
                bail!("job {job_id} ended in state {state:?}");
            }
        }
        Command::Recover => {
            let handles = dispatcher.recover().await?;
            for handle in handles {
                let job_id = handle.job_id().clone();
                let state = handle.wait().await;
                println!("{job_id}\t{state:?}");
            }
        }
    }
    Ok(())
}
