//! canillita: turns linked news, videos and posts into threaded summary replies.

mod app;
mod logging;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use canillita_core::{Job, JobKind, PipelineConfig, Submission};
use canillita_jobs::{Ingestor, JobContext, SubmitOutcome};

use crate::app::{load_providers, App};
use crate::platform::FilePlatform;

#[derive(Parser)]
#[command(name = "canillita")]
#[command(author, version, about = "Threaded summaries for shared news links")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool and the submission poller
    Run {
        /// Drain the queue once and exit
        #[arg(long)]
        once: bool,

        /// JSON file with submissions to poll (array of {external_id, url, community})
        #[arg(long)]
        submissions: Option<PathBuf>,
    },

    /// Extract and assemble a link without queueing or posting
    Preview {
        url: String,

        /// Override the per-message character limit
        #[arg(long)]
        max_chunk_length: Option<usize>,
    },

    /// Queue a link by hand
    Enqueue {
        url: String,

        /// External id of the submission to reply to
        #[arg(long)]
        id: String,
    },

    /// Show processing and queue statistics
    Stats {
        /// Window in days
        #[arg(long)]
        days: Option<i64>,
    },

    /// List dead-lettered jobs
    DeadLetters {
        #[arg(long, default_value_t = canillita_core::defaults::LIST_LIMIT)]
        limit: i64,
    },

    /// Put a dead-lettered job back in the queue
    Requeue { job_id: Uuid },

    /// Delete processed records older than the given age
    Cleanup {
        #[arg(long)]
        days: Option<i64>,
    },

    /// Load and validate provider rules
    CheckProviders,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Run { once, submissions } => cmd_run(config, once, submissions).await,
        Commands::Preview {
            url,
            max_chunk_length,
        } => cmd_preview(config, &url, max_chunk_length).await,
        Commands::Enqueue { url, id } => cmd_enqueue(config, url, id).await,
        Commands::Stats { days } => cmd_stats(config, days).await,
        Commands::DeadLetters { limit } => cmd_dead_letters(config, limit).await,
        Commands::Requeue { job_id } => cmd_requeue(config, job_id).await,
        Commands::Cleanup { days } => cmd_cleanup(config, days).await,
        Commands::CheckProviders => cmd_check_providers(config),
    }
}

async fn cmd_run(
    config: PipelineConfig,
    once: bool,
    submissions: Option<PathBuf>,
) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let platform = Arc::new(FilePlatform::new(submissions));
    let worker = app.worker(platform.clone())?;
    let ingestor = Ingestor::new(
        platform,
        app.pipeline.clone(),
        app.config.communities.clone(),
    )
    .with_interval(std::time::Duration::from_secs(app.config.ingest_interval_secs));
    let ingestor = match &app.config.providers_path {
        Some(path) => ingestor.with_provider_reload(app.providers.clone(), path.clone()),
        None => ingestor,
    };

    if once {
        let ingested = ingestor.poll_once().await?;
        let report = worker.run_once().await?;
        println!(
            "ingested {} ({} new), completed {}, retrying {}, dead-lettered {}",
            ingested.seen, ingested.enqueued, report.completed, report.retried, report.dead_lettered
        );
        return Ok(());
    }

    let handle = worker.start();
    let poller = tokio::spawn({
        let shutdown = handle.shutdown_signal();
        async move { ingestor.run(shutdown).await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown requested");
    handle.shutdown()?;
    handle.join().await?;
    if let Err(e) = poller.await {
        warn!(error = %e, "Ingestor task failed");
    }
    Ok(())
}

async fn cmd_preview(
    config: PipelineConfig,
    url: &str,
    max_chunk_length: Option<usize>,
) -> anyhow::Result<()> {
    let max_chunk_length = max_chunk_length.unwrap_or(config.max_chunk_length);
    let app = App::build(config.with_max_chunk_length(max_chunk_length)).await?;
    let classifier = canillita_core::ContentClassifier::new(
        app.config.news_domains.clone(),
        app.config.blocked_domains.clone(),
    );
    let source = classifier.source_for(&Submission {
        external_id: "preview".to_string(),
        url: url.to_string(),
        community: None,
        title: None,
    })?;
    let kind = JobKind::for_source(source.kind);
    let handler = app.handler_for(kind)?;
    let ctx = JobContext::new(Job::new(source, kind, 1, Utc::now()), max_chunk_length);
    let chunks = handler.prepare(&ctx).await?;

    for chunk in &chunks {
        println!(
            "--- {}/{} ({} caracteres) ---",
            chunk.sequence + 1,
            chunks.len(),
            chunk.body.chars().count()
        );
        println!("{}\n", chunk.body);
    }
    Ok(())
}

async fn cmd_enqueue(config: PipelineConfig, url: String, id: String) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let outcome = app
        .pipeline
        .submit(&Submission {
            external_id: id.clone(),
            url,
            community: None,
            title: None,
        })
        .await?;
    match outcome {
        SubmitOutcome::Enqueued(job_id) => println!("queued {} as job {}", id, job_id),
        SubmitOutcome::Duplicate => println!("{} is already queued or processed", id),
        SubmitOutcome::Unsupported(reason) => bail!("{} not queued: {}", id, reason),
    }
    Ok(())
}

async fn cmd_stats(config: PipelineConfig, days: Option<i64>) -> anyhow::Result<()> {
    let days = days.unwrap_or(config.stats_window_days);
    let app = App::build(config).await?;
    let stats = app.pipeline.processing_stats(days).await?;
    let queue = app.pipeline.queue_stats().await?;

    println!("Últimos {} días", stats.window_days);
    println!("  procesados: {}", stats.total);
    println!("  exitosos:   {}", stats.succeeded);
    println!("  fallidos:   {}", stats.failed);
    println!("  tasa éxito: {:.1}%", stats.success_rate);
    if !stats.common_errors.is_empty() {
        println!("Errores frecuentes:");
        for error in &stats.common_errors {
            println!("  {:>4}  {}", error.count, error.error_message);
        }
    }
    println!(
        "Cola: {} pendientes ({} reintentando), {} en curso, {} descartados",
        queue.pending, queue.retrying, queue.leased, queue.dead_lettered
    );
    Ok(())
}

async fn cmd_dead_letters(config: PipelineConfig, limit: i64) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    let dead = app.pipeline.dead_letters(limit).await?;
    if dead.is_empty() {
        println!("No dead-lettered jobs");
    }
    for letter in dead {
        println!(
            "{}  {}  {}  intentos={}  [{}] {}",
            letter.job_id,
            letter.dead_at.format("%Y-%m-%d %H:%M"),
            letter.source.url,
            letter.attempts,
            letter.error_kind,
            letter.last_error
        );
    }
    Ok(())
}

async fn cmd_requeue(config: PipelineConfig, job_id: Uuid) -> anyhow::Result<()> {
    let app = App::build(config).await?;
    match app.pipeline.requeue(job_id).await? {
        Some(new_id) => println!("requeued {} as {}", job_id, new_id),
        None => bail!("no dead-lettered job {} (or its source is in flight)", job_id),
    }
    Ok(())
}

async fn cmd_cleanup(config: PipelineConfig, days: Option<i64>) -> anyhow::Result<()> {
    let days = days.unwrap_or(config.cleanup_days);
    let app = App::build(config).await?;
    let removed = app.pipeline.cleanup(days).await?;
    println!("removed {} records older than {} days", removed, days);
    Ok(())
}

fn cmd_check_providers(config: PipelineConfig) -> anyhow::Result<()> {
    let registry = load_providers(&config)?;
    for provider in registry.providers() {
        let rule = provider.rule();
        println!(
            "{:<24} {:<24} selectors={} min_len={} min_ratio={}",
            provider.name(),
            if rule.domain_pattern.is_empty() {
                "*"
            } else {
                rule.domain_pattern.as_str()
            },
            rule.content_selectors.len(),
            rule.min_text_length,
            rule.min_text_to_markup_ratio
        );
    }
    println!("{} provider rules valid", registry.len());
    Ok(())
}
