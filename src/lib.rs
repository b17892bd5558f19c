//! Mailtrawl: bulk business-contact email discovery
//!
//! This crate implements a concurrent crawler that visits company websites,
//! extracts email addresses through layered pattern matching and
//! de-obfuscation, validates them against domain-affinity and anti-spam
//! rules, and writes the results back as structured records with
//! checkpoint/resume support.

pub mod checkpoint;
pub mod company;
pub mod config;
pub mod engine;
pub mod extract;
pub mod fetch;
pub mod plan;
pub mod processor;
pub mod report;
pub mod sitemap;
pub mod url;
pub mod validate;

use thiserror::Error;

/// Main error type for mailtrawl operations
///
/// Ordinary network failures are never surfaced through this type: they are
/// absorbed into `FetchOutcome` error tags and per-company results. Only
/// job-fatal conditions (unreadable input, unwritable checkpoint location)
/// end up here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Report error: {0}")]
    Report(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Checkpoint persistence errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed checkpoint file {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Result type alias for mailtrawl operations
pub type Result<T> = std::result::Result<T, EngineError>;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, ResumeState};
pub use company::CompanyRecord;
pub use config::EngineConfig;
pub use engine::{BatchSummary, Engine, EngineEvents, NullEvents};
pub use fetch::{FetchOutcome, Fetcher};
pub use processor::{DiscoveryMethod, ProcessingResult};
pub use url::{clean_website, Domain};
