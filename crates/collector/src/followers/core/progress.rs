//! Progress tracking and reporting for collection runs
//!
//! The pipeline only emits counts; turning them into text is up to the
//! reporter the caller installs.

use std::sync::Arc;
use std::time::Duration;

/// Progress callback for collection operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted during a collection run
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Best-effort follower total for the target account
    CountEstimated {
        handle: String,
        followers_count: u64,
    },
    /// One listing page was fetched and filtered
    PageFetched {
        page: usize,
        retrieved: usize,
        skipped: usize,
        collected: usize,
        estimated_total: Option<u64>,
    },
    ListingComplete {
        handle: String,
        new_ids: usize,
        skipped: usize,
    },
    /// A lookup chunk was resolved and its rows appended to the store
    ChunkProcessed {
        chunk: usize,
        total_chunks: usize,
        requested: usize,
        written: usize,
    },
    /// Every id in the chunk was already known
    ChunkSkipped {
        chunk: usize,
        total_chunks: usize,
    },
    /// The chunk was abandoned after exhausting transport retries
    ChunkFailed {
        chunk: usize,
        total_chunks: usize,
        unresolved: usize,
        error: String,
    },
    RateLimited {
        url: String,
        wait: Duration,
    },
    RetryAttempt {
        url: String,
        attempt: usize,
        max_attempts: usize,
    },
    EnrichmentComplete {
        written: usize,
        unresolved: usize,
    },
    Warning {
        message: String,
    },
}

/// Percentage of `done` over `total`, capped at 100
///
/// A zero or stale total never divides by zero: zero yields 0%, and overshoot
/// yields 100%.
pub fn progress_percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((done as f64 / total as f64) * 100.0).min(100.0)
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_count_estimated(&self, _handle: &str, _followers_count: u64) {}
    fn on_page_fetched(&self, _page: usize, _retrieved: usize, _skipped: usize, _collected: usize, _estimated_total: Option<u64>) {}
    fn on_listing_complete(&self, _handle: &str, _new_ids: usize, _skipped: usize) {}
    fn on_chunk_processed(&self, _chunk: usize, _total_chunks: usize, _requested: usize, _written: usize) {}
    fn on_chunk_skipped(&self, _chunk: usize, _total_chunks: usize) {}
    fn on_chunk_failed(&self, _chunk: usize, _total_chunks: usize, _unresolved: usize, _error: &str) {}
    fn on_rate_limited(&self, _url: &str, _wait: Duration) {}
    fn on_retry_attempt(&self, _url: &str, _attempt: usize, _max_attempts: usize) {}
    fn on_enrichment_complete(&self, _written: usize, _unresolved: usize) {}
    fn on_warning(&self, _message: &str) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::CountEstimated { handle, followers_count } => {
                self.on_count_estimated(&handle, followers_count);
            }
            ProgressEvent::PageFetched { page, retrieved, skipped, collected, estimated_total } => {
                self.on_page_fetched(page, retrieved, skipped, collected, estimated_total);
            }
            ProgressEvent::ListingComplete { handle, new_ids, skipped } => {
                self.on_listing_complete(&handle, new_ids, skipped);
            }
            ProgressEvent::ChunkProcessed { chunk, total_chunks, requested, written } => {
                self.on_chunk_processed(chunk, total_chunks, requested, written);
            }
            ProgressEvent::ChunkSkipped { chunk, total_chunks } => {
                self.on_chunk_skipped(chunk, total_chunks);
            }
            ProgressEvent::ChunkFailed { chunk, total_chunks, unresolved, error } => {
                self.on_chunk_failed(chunk, total_chunks, unresolved, &error);
            }
            ProgressEvent::RateLimited { url, wait } => {
                self.on_rate_limited(&url, wait);
            }
            ProgressEvent::RetryAttempt { url, attempt, max_attempts } => {
                self.on_retry_attempt(&url, attempt, max_attempts);
            }
            ProgressEvent::EnrichmentComplete { written, unresolved } => {
                self.on_enrichment_complete(written, unresolved);
            }
            ProgressEvent::Warning { message } => {
                self.on_warning(&message);
            }
        })
    }
}

/// Simple console progress reporter writing to stderr
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_count_estimated(&self, handle: &str, followers_count: u64) {
        eprintln!("@{} has about {} followers", handle, followers_count);
    }

    fn on_page_fetched(&self, page: usize, retrieved: usize, skipped: usize, collected: usize, estimated_total: Option<u64>) {
        match estimated_total {
            Some(total) => {
                let seen = (collected + skipped) as u64;
                eprintln!("Page {}: {} ids ({} already stored) - {:.2}% of ~{}",
                    page, retrieved, skipped, progress_percent(seen, total), total);
            }
            None => {
                eprintln!("Page {}: {} ids ({} already stored)", page, retrieved, skipped);
            }
        }
    }

    fn on_listing_complete(&self, handle: &str, new_ids: usize, skipped: usize) {
        eprintln!("Listed followers of @{}: {} new, {} already stored", handle, new_ids, skipped);
    }

    fn on_chunk_processed(&self, chunk: usize, total_chunks: usize, requested: usize, written: usize) {
        let percent = progress_percent(chunk as u64, total_chunks as u64);
        if self.verbose {
            eprintln!("Progress: {:.2}% - chunk {} of {} ({} requested, {} stored)",
                percent, chunk, total_chunks, requested, written);
        } else {
            eprintln!("Progress: {:.2}% - chunk {} of {}", percent, chunk, total_chunks);
        }
    }

    fn on_chunk_skipped(&self, chunk: usize, total_chunks: usize) {
        if self.verbose {
            eprintln!("Chunk {} of {} already stored, skipped", chunk, total_chunks);
        }
    }

    fn on_chunk_failed(&self, chunk: usize, total_chunks: usize, unresolved: usize, error: &str) {
        eprintln!("Chunk {} of {} left {} followers unresolved: {}", chunk, total_chunks, unresolved, error);
    }

    fn on_rate_limited(&self, url: &str, wait: Duration) {
        eprintln!("Rate limited on {}, waiting {}s", url, wait.as_secs());
    }

    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize) {
        eprintln!("Retry {}/{} for: {}", attempt, max_attempts, url);
    }

    fn on_enrichment_complete(&self, written: usize, unresolved: usize) {
        eprintln!("Data collection complete: {} new followers stored, {} unresolved", written, unresolved);
    }

    fn on_warning(&self, message: &str) {
        eprintln!("Warning: {}", message);
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}

/// Composite progress reporter that forwards events to multiple reporters
pub struct CompositeProgressReporter {
    reporters: Vec<Box<dyn ProgressReporter>>,
}

impl std::fmt::Debug for CompositeProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProgressReporter")
            .field("reporters_count", &self.reporters.len())
            .finish()
    }
}

impl CompositeProgressReporter {
    pub fn new() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn add_reporter<R: ProgressReporter + 'static>(mut self, reporter: R) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }
}

impl Default for CompositeProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CompositeProgressReporter {
    fn on_count_estimated(&self, handle: &str, followers_count: u64) {
        for reporter in &self.reporters {
            reporter.on_count_estimated(handle, followers_count);
        }
    }

    fn on_page_fetched(&self, page: usize, retrieved: usize, skipped: usize, collected: usize, estimated_total: Option<u64>) {
        for reporter in &self.reporters {
            reporter.on_page_fetched(page, retrieved, skipped, collected, estimated_total);
        }
    }

    fn on_listing_complete(&self, handle: &str, new_ids: usize, skipped: usize) {
        for reporter in &self.reporters {
            reporter.on_listing_complete(handle, new_ids, skipped);
        }
    }

    fn on_chunk_processed(&self, chunk: usize, total_chunks: usize, requested: usize, written: usize) {
        for reporter in &self.reporters {
            reporter.on_chunk_processed(chunk, total_chunks, requested, written);
        }
    }

    fn on_chunk_skipped(&self, chunk: usize, total_chunks: usize) {
        for reporter in &self.reporters {
            reporter.on_chunk_skipped(chunk, total_chunks);
        }
    }

    fn on_chunk_failed(&self, chunk: usize, total_chunks: usize, unresolved: usize, error: &str) {
        for reporter in &self.reporters {
            reporter.on_chunk_failed(chunk, total_chunks, unresolved, error);
        }
    }

    fn on_rate_limited(&self, url: &str, wait: Duration) {
        for reporter in &self.reporters {
            reporter.on_rate_limited(url, wait);
        }
    }

    fn on_retry_attempt(&self, url: &str, attempt: usize, max_attempts: usize) {
        for reporter in &self.reporters {
            reporter.on_retry_attempt(url, attempt, max_attempts);
        }
    }

    fn on_enrichment_complete(&self, written: usize, unresolved: usize) {
        for reporter in &self.reporters {
            reporter.on_enrichment_complete(written, unresolved);
        }
    }

    fn on_warning(&self, message: &str) {
        for reporter in &self.reporters {
            reporter.on_warning(message);
        }
    }
}

/// Send an event to an optional callback
pub(crate) fn emit(callback: &Option<ProgressCallback>, event: ProgressEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingReporter {
        chunks: Arc<Mutex<Vec<(usize, usize)>>>,
    }

    impl ProgressReporter for CountingReporter {
        fn on_chunk_processed(&self, chunk: usize, total_chunks: usize, _requested: usize, _written: usize) {
            self.chunks.lock().unwrap().push((chunk, total_chunks));
        }
    }

    #[test]
    fn test_progress_percent_guards_zero_and_overshoot() {
        assert_eq!(progress_percent(10, 0), 0.0);
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(50, 200), 25.0);
        assert_eq!(progress_percent(300, 200), 100.0);
    }

    #[test]
    fn test_reporter_receives_events_through_callback() {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let reporter = CountingReporter { chunks: chunks.clone() };
        let callback = CompositeProgressReporter::new()
            .add_reporter(reporter)
            .add_reporter(NullProgressReporter)
            .into_callback();

        callback(ProgressEvent::ChunkProcessed { chunk: 1, total_chunks: 3, requested: 100, written: 98 });
        callback(ProgressEvent::ChunkSkipped { chunk: 2, total_chunks: 3 });
        callback(ProgressEvent::ChunkProcessed { chunk: 3, total_chunks: 3, requested: 10, written: 10 });

        assert_eq!(*chunks.lock().unwrap(), vec![(1, 3), (3, 3)]);
    }
}
