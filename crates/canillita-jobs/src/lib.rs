//! # canillita-jobs
//!
//! Job processing for canillita.
//!
//! This crate provides:
//! - Handlers per job kind (article extraction, video summary, social post)
//! - Threaded, resumable delivery of message chunks
//! - Exponential backoff with jitter for retries
//! - A fixed-size worker pool with graceful shutdown and event broadcast
//! - The ingestion poller and the pipeline facade used by the CLI
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use canillita_jobs::{ArticleHandler, WorkerBuilder, WorkerConfig};
//! use canillita_db::Stores;
//!
//! let worker = WorkerBuilder::new(Stores::memory(), platform)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(ArticleHandler::new(orchestrator))
//!     .build();
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown()?;
//! handle.join().await?;
//! ```

pub mod backoff;
pub mod delivery;
pub mod handler;
pub mod handlers;
pub mod ingest;
pub mod pipeline;
pub mod worker;

pub use canillita_core::*;

pub use backoff::BackoffPolicy;
pub use delivery::deliver;
pub use handler::{JobContext, JobHandler};
pub use handlers::{ArticleHandler, SocialHandler, VideoHandler, VIDEO_TITLE_FALLBACK};
pub use ingest::{IngestReport, Ingestor};
pub use pipeline::{Pipeline, SubmitOutcome};
pub use worker::{
    DrainReport, JobOutcome, JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle,
};
