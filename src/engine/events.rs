use crate::processor::ProcessingResult;

/// Callbacks the engine fires while a batch runs.
///
/// The engine never writes to a transport itself; whatever consumes these
/// events (CLI logger, job-queue reporter) decides what to do with them.
/// All methods have no-op defaults so implementors pick only what they
/// need. Implementations must be cheap; they run on the collector task.
pub trait EngineEvents: Send + Sync {
    /// Lightweight progress tick, fired every few completions.
    fn on_progress(&self, _processed: usize, _total: usize, _emails_found: u64) {}

    /// One company finished, in completion order.
    fn on_company_processed(&self, _result: &ProcessingResult) {}

    /// A checkpoint file was written for `batch`.
    fn on_batch_checkpoint(&self, _batch: usize, _results: &[ProcessingResult]) {}

    /// The batch drained and the final flush happened.
    fn on_complete(&self, _total_processed: usize, _total_emails: u64, _elapsed_seconds: f64) {}

    /// The job cannot continue (unreadable resume state, unwritable output).
    fn on_fatal_error(&self, _message: &str) {}
}

/// Event sink that ignores everything
pub struct NullEvents;

impl EngineEvents for NullEvents {}
