//! Checkpoint persistence
//!
//! Periodic CSV snapshots of completed results. Each flush writes a new
//! file whose name encodes batch number, cumulative count and timestamp;
//! resume reads every checkpoint file in lexicographic order and merges
//! them, so an interrupted run can be continued without reprocessing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::processor::{DiscoveryMethod, ProcessingResult};
use crate::CheckpointError;

lazy_static! {
    static ref BATCH_NUMBER: Regex = Regex::new(r"progress_batch_(\d+)_").unwrap();
}

const FILE_PREFIX: &str = "progress_batch_";
const FILE_SUFFIX: &str = ".csv";

/// One checkpoint CSV row; the column set is a fixed external contract
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRow {
    name: String,
    domain: String,
    website: String,
    city: String,
    industry: String,
    emails_found: String,
    discovery_method: String,
    success: bool,
    pages_accessed: String,
    processing_time: f64,
}

impl CheckpointRow {
    fn from_result(result: &ProcessingResult) -> Self {
        Self {
            name: result.company_name.clone(),
            domain: result.domain.clone().unwrap_or_default(),
            website: result.website.clone().unwrap_or_default(),
            city: result.city.clone(),
            industry: result.industry.clone(),
            emails_found: result.emails.join(", "),
            discovery_method: result.discovery_method.to_string(),
            success: result.success,
            pages_accessed: result.pages_accessed.join("; "),
            processing_time: result.processing_time_seconds,
        }
    }

    fn into_result(self) -> ProcessingResult {
        let emails: Vec<String> = self
            .emails_found
            .split(", ")
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        let pages: Vec<String> = self
            .pages_accessed
            .split("; ")
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        ProcessingResult {
            company_name: self.name,
            domain: (!self.domain.is_empty()).then_some(self.domain),
            website: (!self.website.is_empty()).then_some(self.website),
            city: self.city,
            industry: self.industry,
            success: !emails.is_empty(),
            emails,
            discovery_method: DiscoveryMethod::parse(&self.discovery_method)
                .unwrap_or(DiscoveryMethod::Error),
            pages_accessed: pages,
            processing_time_seconds: self.processing_time,
            extraction_stats: Default::default(),
        }
    }
}

/// Everything a resumed run needs to know about previous runs
#[derive(Debug, Default)]
pub struct ResumeState {
    pub processed_names: HashSet<String>,
    pub total_emails: u64,
    pub next_batch: usize,
    pub prior_results: Vec<ProcessingResult>,
}

/// Writes and reads checkpoint files under one output directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    output_dir: PathBuf,
    flush_interval: usize,
}

impl CheckpointStore {
    pub fn new(output_dir: impl Into<PathBuf>, flush_interval: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            flush_interval,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Persists buffered results, unless the buffering policy says to wait.
    ///
    /// A flush happens when the buffer has reached the interval, the total
    /// crossed an interval multiple, or `force` is set (end of run,
    /// shutdown). Returns the written path, or `None` when skipped.
    pub fn save(
        &self,
        results: &[ProcessingResult],
        batch: usize,
        total_processed: usize,
        force: bool,
    ) -> Result<Option<PathBuf>, CheckpointError> {
        if results.is_empty() {
            return Ok(None);
        }
        if !force
            && results.len() < self.flush_interval
            && total_processed % self.flush_interval != 0
        {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.output_dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!(
            "{}{:03}_{}_companies_{}{}",
            FILE_PREFIX, batch, total_processed, timestamp, FILE_SUFFIX
        );
        let path = self.output_dir.join(filename);

        let mut writer = csv::Writer::from_path(&path)?;
        for result in results {
            writer.serialize(CheckpointRow::from_result(result))?;
        }
        writer.flush().map_err(CheckpointError::Io)?;

        info!(path = %path.display(), rows = results.len(), "checkpoint written");
        Ok(Some(path))
    }

    /// Merges every checkpoint file in the output directory.
    ///
    /// Files are read in lexicographic filename order so resume is
    /// reproducible regardless of filesystem timestamps. The first row seen
    /// for a name wins; later duplicates are skipped.
    pub fn load_latest(&self) -> Result<ResumeState, CheckpointError> {
        let mut state = ResumeState {
            next_batch: 1,
            ..Default::default()
        };

        if !self.output_dir.exists() {
            return Ok(state);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.output_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        let mut max_batch = 0usize;
        for path in &files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if let Some(caps) = BATCH_NUMBER.captures(name) {
                if let Ok(batch) = caps[1].parse::<usize>() {
                    max_batch = max_batch.max(batch);
                }
            }

            let mut reader = csv::Reader::from_path(path)?;
            for row in reader.deserialize::<CheckpointRow>() {
                let row = match row {
                    Ok(row) => row,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping malformed checkpoint row");
                        continue;
                    }
                };
                if row.name.is_empty() || state.processed_names.contains(&row.name) {
                    continue;
                }
                state.processed_names.insert(row.name.clone());
                let result = row.into_result();
                state.total_emails += result.emails.len() as u64;
                state.prior_results.push(result);
            }
        }

        state.next_batch = max_batch + 1;
        if !files.is_empty() {
            info!(
                files = files.len(),
                companies = state.processed_names.len(),
                emails = state.total_emails,
                "resume state loaded"
            );
        }
        Ok(state)
    }
}
