//! Core types used throughout the collection pipeline
//!
//! This module contains the fundamental types that all other modules depend on.

pub mod error;
pub mod http;
pub mod metrics;
pub mod progress;

pub use error::{CollectorError, ErrorSeverity, FileOperation, Result, RunPhase};
pub use http::{ApiRequest, RawResponse, ReqwestTransport, Transport, TransportFailure};
pub use metrics::{ExecutorMetrics, ExecutorMetricsSnapshot};
pub use progress::{
    progress_percent, CompositeProgressReporter, ConsoleProgressReporter, IntoProgressCallback,
    NullProgressReporter, ProgressCallback, ProgressEvent, ProgressReporter,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use std::borrow::Borrow;
use std::fmt;

/// Format of `created_at` as the provider sends it, e.g. `Wed Oct 10 20:19:24 +0000 2018`
pub const PROVIDER_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Format of the store's `timestamp` column (UTC)
pub const RESOLVED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker written for an unknown join date
pub const UNKNOWN_MARKER: &str = "N/A";

/// Follower identifier, kept as text so ids beyond 2^53 survive round trips
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FollowerId(String);

impl FollowerId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FollowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FollowerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FollowerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for FollowerId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for FollowerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// When a follower joined the provider, if known
///
/// `Unknown` orders before every known date, so descending sorts put it last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JoinedAt {
    Unknown,
    At(DateTime<Utc>),
}

impl JoinedAt {
    /// Parse a provider or RFC 3339 date; anything else is `Unknown`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == UNKNOWN_MARKER {
            return JoinedAt::Unknown;
        }
        DateTime::parse_from_str(raw, PROVIDER_DATE_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .map(|dt| JoinedAt::At(dt.with_timezone(&Utc)))
            .unwrap_or(JoinedAt::Unknown)
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        match self {
            JoinedAt::At(dt) => Some(*dt),
            JoinedAt::Unknown => None,
        }
    }
}

impl fmt::Display for JoinedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinedAt::At(dt) => write!(f, "{}", dt.format(PROVIDER_DATE_FORMAT)),
            JoinedAt::Unknown => f.write_str(UNKNOWN_MARKER),
        }
    }
}

/// One resolved follower, written once and never updated by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerRecord {
    pub id: FollowerId,
    pub screen_name: String,
    pub display_name: String,
    pub followers_count: u64,
    pub joined_at: JoinedAt,
    pub resolved_at: DateTime<Utc>,
}

impl FollowerRecord {
    /// `resolved_at` in the store's column format
    pub fn resolved_at_text(&self) -> String {
        self.resolved_at.format(RESOLVED_AT_FORMAT).to_string()
    }

    /// Parse a `timestamp` column value
    pub fn parse_resolved_at(raw: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw.trim(), RESOLVED_AT_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Counters for a single collection run, used only for progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionRun {
    pub handle: String,
    /// Provider's follower count; may be stale or missing
    pub estimated_total: Option<u64>,
    pub pages: usize,
    /// Ids returned by the listing endpoint
    pub retrieved: usize,
    /// Listed ids that were already stored
    pub skipped: usize,
    /// Chunks handled by the enricher, whether or not they produced rows
    pub chunks_processed: usize,
    pub chunks_total: usize,
}

impl CollectionRun {
    pub fn new<S: Into<String>>(handle: S) -> Self {
        Self {
            handle: handle.into(),
            ..Self::default()
        }
    }

    /// Listing progress against the estimated total
    pub fn listing_percent(&self) -> f64 {
        progress_percent(self.retrieved as u64, self.estimated_total.unwrap_or(0))
    }

    /// Enrichment progress in chunks
    pub fn enrichment_percent(&self) -> f64 {
        progress_percent(self.chunks_processed as u64, self.chunks_total as u64)
    }
}
