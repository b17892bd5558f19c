//! Engine configuration
//!
//! Built by the CLI from flags, validated before the engine starts. The
//! worker count requested here is an upper bound; the engine clamps it to
//! the number of companies and to [`MAX_WORKERS`].

use std::path::PathBuf;

use crate::ConfigError;

/// Hard ceiling on concurrent workers regardless of what was requested
pub const MAX_WORKERS: usize = 200;

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 60;

/// Default number of processed companies between checkpoint flushes
pub const DEFAULT_FLUSH_INTERVAL: usize = 500;

/// Runtime configuration for a discovery run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory receiving checkpoint files and final reports
    pub output_dir: PathBuf,
    /// Requested concurrent workers (clamped, see [`EngineConfig::effective_workers`])
    pub workers: usize,
    /// Companies processed between checkpoint flushes
    pub flush_interval: usize,
    /// Verbosity level from the CLI (0 = info, 1 = debug, 2+ = trace)
    pub verbose: u8,
    /// Optional cap on how many companies to process this run
    pub limit: Option<usize>,
    /// Optional wall-clock budget; dispatch stops once exceeded
    pub max_hours: Option<f64>,
    /// Resume from the latest checkpoint files in `output_dir`
    pub resume: bool,
    /// Crawl every planned URL instead of stopping at the first page
    /// yielding valid emails
    pub exhaustive: bool,
    /// Extra fetch attempts after the first failure
    pub fetch_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            workers: DEFAULT_WORKERS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            verbose: 0,
            limit: None,
            max_hours: None,
            resume: false,
            exhaustive: false,
            fetch_retries: 1,
        }
    }
}

impl EngineConfig {
    /// Checks the configuration for values that would make a run nonsensical.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Validation(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.flush_interval == 0 {
            return Err(ConfigError::Validation(
                "flush interval must be at least 1".to_string(),
            ));
        }
        if let Some(hours) = self.max_hours {
            if hours <= 0.0 {
                return Err(ConfigError::Validation(
                    "max hours must be positive".to_string(),
                ));
            }
        }
        if let Some(limit) = self.limit {
            if limit == 0 {
                return Err(ConfigError::Validation(
                    "limit must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Worker count actually used for a batch of `companies` companies.
    ///
    /// Never exceeds the requested count, the company count, or
    /// [`MAX_WORKERS`]; never drops below 1.
    pub fn effective_workers(&self, companies: usize) -> usize {
        self.workers.min(companies).min(MAX_WORKERS).max(1)
    }
}
