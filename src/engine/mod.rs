//! Batch scheduler
//!
//! Bounded fan-out of the company processor over the input list. One
//! semaphore permit equals one in-flight company; a dispatcher task hands
//! out permits until the list or the wall-clock budget is exhausted, and
//! the collector folds completions into counters, progress events and
//! checkpoint flushes.

mod events;

pub use events::{EngineEvents, NullEvents};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointStore, ResumeState};
use crate::company::CompanyRecord;
use crate::config::EngineConfig;
use crate::fetch::Fetcher;
use crate::processor::{process_company, DiscoveryMethod, ProcessingResult};
use crate::{EngineError, Result};

/// Aggregated outcome of one engine run
#[derive(Debug)]
pub struct BatchSummary {
    /// Results from this run only, completion order
    pub results: Vec<ProcessingResult>,
    /// Results restored from checkpoint files on a resumed run; empty
    /// otherwise. Final reports must cover `prior_results` + `results`.
    pub prior_results: Vec<ProcessingResult>,
    pub total_processed: usize,
    /// Cumulative, including resumed prior runs
    pub total_emails: u64,
    pub success_count: usize,
    pub elapsed_seconds: f64,
    /// Highest number of simultaneously active company tasks observed
    pub peak_concurrency: usize,
}

/// The discovery engine: configuration, shared fetcher, checkpoint store
/// and event sink
pub struct Engine {
    config: Arc<EngineConfig>,
    fetcher: Arc<Fetcher>,
    store: CheckpointStore,
    events: Arc<dyn EngineEvents>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = CheckpointStore::new(&config.output_dir, config.flush_interval);
        Ok(Self {
            config: Arc::new(config),
            fetcher: Arc::new(Fetcher::new()?),
            store,
            events: Arc::new(NullEvents),
        })
    }

    /// Replaces the default fetcher, mainly to install URL rewrites.
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EngineEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Runs the whole batch to completion.
    ///
    /// Resume filtering happens before the `limit` truncation, so a limited
    /// resumed run makes progress through the remaining companies instead
    /// of re-counting finished ones.
    pub async fn run(&self, companies: Vec<CompanyRecord>) -> Result<BatchSummary> {
        let start = Instant::now();

        let resume = if self.config.resume {
            match self.store.load_latest() {
                Ok(state) => state,
                Err(e) => {
                    let message = format!("cannot load resume state: {}", e);
                    error!("{}", message);
                    self.events.on_fatal_error(&message);
                    return Err(EngineError::Checkpoint(e));
                }
            }
        } else {
            ResumeState {
                next_batch: 1,
                ..Default::default()
            }
        };

        let mut pending: Vec<CompanyRecord> = companies
            .into_iter()
            .filter(|c| !resume.processed_names.contains(&c.name))
            .collect();
        if let Some(limit) = self.config.limit {
            pending.truncate(limit);
        }

        let total = pending.len();
        let workers = self.config.effective_workers(total);
        info!(
            companies = total,
            workers,
            skipped = resume.processed_names.len(),
            "starting batch"
        );

        if total == 0 {
            let summary = BatchSummary {
                results: Vec::new(),
                prior_results: resume.prior_results,
                total_processed: 0,
                total_emails: resume.total_emails,
                success_count: 0,
                elapsed_seconds: start.elapsed().as_secs_f64(),
                peak_concurrency: 0,
            };
            self.events.on_complete(0, summary.total_emails, summary.elapsed_seconds);
            return Ok(summary);
        }

        let semaphore = Arc::new(Semaphore::new(workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<ProcessingResult>();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let deadline = self
            .config
            .max_hours
            .map(|hours| start + Duration::from_secs_f64(hours * 3600.0));

        // Dispatcher: hands out permits until the list or the wall-clock
        // budget runs out. Worker tasks own their permit for the duration
        // of one company.
        let dispatcher = {
            let semaphore = Arc::clone(&semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let config = Arc::clone(&self.config);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let tx = tx.clone();
            tokio::spawn(async move {
                for record in pending {
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            warn!(company = %record.name, "wall-clock budget exhausted, stopping dispatch");
                            break;
                        }
                    }
                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let fetcher = Arc::clone(&fetcher);
                    let config = Arc::clone(&config);
                    let active = Arc::clone(&active);
                    let peak = Arc::clone(&peak);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);

                        let result = std::panic::AssertUnwindSafe(process_company(
                            &fetcher, &config, &record,
                        ))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            error!(company = %record.name, "company task panicked");
                            error_result(&record)
                        });

                        active.fetch_sub(1, Ordering::SeqCst);
                        let _ = tx.send(result);
                        drop(permit);
                    });
                }
            })
        };
        drop(tx);

        // Collector: counters, progress cadence, checkpoint cadence.
        let mut results: Vec<ProcessingResult> = Vec::new();
        let mut buffer: Vec<ProcessingResult> = Vec::new();
        let mut processed = 0usize;
        let mut success_count = 0usize;
        let mut total_emails = resume.total_emails;
        let mut batch = resume.next_batch;

        while let Some(result) = rx.recv().await {
            processed += 1;
            total_emails += result.emails.len() as u64;
            if result.success {
                success_count += 1;
            }
            self.events.on_company_processed(&result);
            buffer.push(result.clone());
            results.push(result);

            if processed % 10 == 0 {
                let elapsed = start.elapsed().as_secs_f64();
                let rate = processed as f64 / elapsed.max(0.001);
                let eta = (total - processed) as f64 / rate.max(0.001);
                info!(
                    processed,
                    total,
                    emails = total_emails,
                    rate = %format!("{:.1}/s", rate),
                    eta = %format!("{:.0}s", eta),
                    "progress"
                );
                self.events.on_progress(processed, total, total_emails);
            }

            if buffer.len() >= self.config.flush_interval {
                batch = self.flush(&mut buffer, batch, processed, false).await;
            }
        }

        let _ = dispatcher.await;

        // Final flush of whatever is left, regardless of interval.
        if !buffer.is_empty() {
            batch = self.flush(&mut buffer, batch, processed, true).await;
        }
        let _ = batch;

        let summary = BatchSummary {
            results,
            prior_results: resume.prior_results,
            total_processed: processed,
            total_emails,
            success_count,
            elapsed_seconds: start.elapsed().as_secs_f64(),
            peak_concurrency: peak.load(Ordering::SeqCst),
        };
        info!(
            processed = summary.total_processed,
            emails = summary.total_emails,
            succeeded = summary.success_count,
            elapsed = %format!("{:.1}s", summary.elapsed_seconds),
            peak = summary.peak_concurrency,
            "batch complete"
        );
        self.events
            .on_complete(summary.total_processed, summary.total_emails, summary.elapsed_seconds);
        Ok(summary)
    }

    /// Writes the buffer on a blocking task so in-flight fetches keep
    /// running. A failed write is logged and the buffer retained for the
    /// next flush; checkpoint failures never fail the batch.
    async fn flush(
        &self,
        buffer: &mut Vec<ProcessingResult>,
        batch: usize,
        total_processed: usize,
        force: bool,
    ) -> usize {
        let store = self.store.clone();
        let rows = std::mem::take(buffer);
        let rows_for_write = rows.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            store.save(&rows_for_write, batch, total_processed, force)
        })
        .await;

        match outcome {
            Ok(Ok(Some(_path))) => {
                self.events.on_batch_checkpoint(batch, &rows);
                batch + 1
            }
            Ok(Ok(None)) => {
                *buffer = rows;
                batch
            }
            Ok(Err(e)) => {
                warn!(error = %e, "checkpoint write failed, keeping buffer");
                *buffer = rows;
                batch
            }
            Err(e) => {
                warn!(error = %e, "checkpoint task failed, keeping buffer");
                *buffer = rows;
                batch
            }
        }
    }
}

fn error_result(record: &CompanyRecord) -> ProcessingResult {
    ProcessingResult {
        company_name: record.name.clone(),
        domain: None,
        website: record.website.clone(),
        city: record.city.clone(),
        industry: record.industry.clone(),
        emails: Vec::new(),
        discovery_method: DiscoveryMethod::Error,
        success: false,
        pages_accessed: Vec::new(),
        processing_time_seconds: 0.0,
        extraction_stats: HashMap::new(),
    }
}
