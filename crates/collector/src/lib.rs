//! Collector Library
//!
//! This library collects the followers of an account through a rate-limited,
//! cursor-paginated HTTP API, resolves their profiles in bounded batches and
//! keeps them in an append-only CSV store so repeated runs only fetch what is
//! missing. The stored set can then be ranked into a text report.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use collector::{
//!     CollectorConfig, FollowerPipeline, ProgressCallback, ProgressEvent, ReportOptions, RunMode,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> collector::Result<()> {
//! // Configuration is passed explicitly; nothing is read from the environment
//! let config = CollectorConfig::new("bearer-token");
//!
//! // Set up progress callback (optional)
//! let progress: ProgressCallback = Arc::new(|event: ProgressEvent| match event {
//!     ProgressEvent::PageFetched { page, retrieved, .. } => {
//!         println!("Page {}: {} ids", page, retrieved);
//!     }
//!     ProgressEvent::ChunkProcessed { chunk, total_chunks, written, .. } => {
//!         println!("Chunk {}/{}: {} new followers", chunk, total_chunks, written);
//!     }
//!     _ => {}
//! });
//!
//! let pipeline = FollowerPipeline::from_config(config, "./data")?
//!     .with_progress(Some(progress));
//!
//! // Fetch whatever the store is missing, then rank it
//! let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await?;
//! println!("{} new followers stored", summary.written());
//!
//! let report = pipeline.report("rustlang", &ReportOptions::default()).await?;
//! println!("{}", report.render());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Rate-limit backoff**: waits out provider windows using the reset header
//! - **Transport retries**: bounded retries per request; a failed batch is left for the next run
//! - **Incremental store**: append-only CSV writes, crash-safe per batch
//! - **Resumable runs**: ids already stored are never requested again
//! - **Progress tracking**: structured events instead of printed text

pub mod followers;

// Re-export commonly used types for convenience
pub use followers::{
    CollectorConfig, CollectorError, FollowerPipeline, FollowerRecord, FollowerStore,
    ProgressCallback, ProgressEvent, RankedReport, ReportColumn, ReportOptions, Result,
    RunMode, RunSummary,
};
