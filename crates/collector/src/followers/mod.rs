//! Followers module
//!
//! This module contains the whole collection pipeline: core types,
//! the provider API layer, listing, enrichment, the store and reporting.

pub mod core;
pub mod config;
pub mod api;
pub mod collect;
pub mod enrich;
pub mod store;
pub mod report;
pub mod pipeline;

// Re-export main types for convenience
pub use self::core::{
    CollectionRun, FollowerId, FollowerRecord, JoinedAt,
    ApiRequest, RawResponse, ReqwestTransport, Transport, TransportFailure,
    ProgressCallback, ProgressEvent, ProgressReporter, IntoProgressCallback,
    ConsoleProgressReporter, NullProgressReporter, CompositeProgressReporter,
    ExecutorMetrics, ExecutorMetricsSnapshot, progress_percent,
    CollectorError, Result, ErrorSeverity, FileOperation, RunPhase,
};
pub use config::CollectorConfig;
pub use api::{Cursor, FollowerIdsPage, LookupUser, RateLimitStatus, RequestExecutor, SocialApi};
pub use collect::{FollowerIdPager, IdCollector};
pub use enrich::{EnrichSummary, Enricher};
pub use store::FollowerStore;
pub use report::{RankedReport, ReportColumn, ReportOptions};
pub use pipeline::{normalize_handle, FollowerPipeline, RunMode, RunSummary};

#[cfg(test)]
mod tests;
