//! # canillita-core
//!
//! Core types, traits, and abstractions for canillita.
//!
//! This crate provides:
//! - Domain models (sources, provider rules, jobs, records, message chunks)
//! - The error taxonomy that drives retry decisions
//! - Storage and collaborator traits injected into the pipeline
//! - Content-kind routing for submitted links
//! - Centralized defaults, logging field names and environment config

pub mod classify;
pub mod config;
pub mod defaults;
pub mod domain;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

pub use classify::{video_id_of, youtube_video_id, ContentClassifier};
pub use config::PipelineConfig;
pub use domain::{domain_matches, domain_of, parse_http_url, registrable_domain};
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use traits::*;
