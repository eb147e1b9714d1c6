//! End-to-end collection run for one account
//!
//! Listing, enrichment and reporting run strictly in that order on a single
//! flow of control. The request executor is shared by every phase, so
//! rate-limit backoff seen by one phase applies to the next.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::followers::api::{RequestExecutor, SocialApi};
use crate::followers::collect::IdCollector;
use crate::followers::config::CollectorConfig;
use crate::followers::core::progress::emit;
use crate::followers::core::{
    CollectionRun, CollectorError, ExecutorMetricsSnapshot, FollowerId, ProgressCallback,
    ProgressEvent, ReqwestTransport, Result, RunPhase,
};
use crate::followers::enrich::{EnrichSummary, Enricher};
use crate::followers::report::{RankedReport, ReportOptions};
use crate::followers::store::FollowerStore;

/// Whether a run may reuse stored data without touching the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Report from the store if it exists; fetch only on a first run
    #[default]
    ExistingOnly,
    /// Always list followers and resolve the ones not yet stored
    FetchAndMerge,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::ExistingOnly => write!(f, "existing"),
            RunMode::FetchAndMerge => write!(f, "fetch"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "existing" | "existing-only" => Ok(RunMode::ExistingOnly),
            "fetch" | "fetch-and-merge" | "merge" => Ok(RunMode::FetchAndMerge),
            other => Err(format!("unknown mode '{}', expected 'existing' or 'fetch'", other)),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub handle: String,
    pub mode: RunMode,
    /// False when stored data was reused without contacting the provider
    pub fetched: bool,
    pub run: CollectionRun,
    /// Listed ids that were not yet stored
    pub new_ids: usize,
    pub enrichment: Option<EnrichSummary>,
    /// Followers in the store after the run
    pub stored: usize,
}

impl RunSummary {
    pub fn written(&self) -> usize {
        self.enrichment.as_ref().map_or(0, |e| e.written)
    }

    pub fn unresolved(&self) -> &[FollowerId] {
        self.enrichment.as_ref().map(|e| e.unresolved.as_slice()).unwrap_or_default()
    }
}

/// Strip whitespace and a leading `@` from a handle
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_string()
}

/// Collection pipeline bound to one provider and one data directory
#[derive(Clone)]
pub struct FollowerPipeline {
    executor: RequestExecutor,
    data_dir: PathBuf,
    progress: Option<ProgressCallback>,
}

impl FollowerPipeline {
    pub fn new<P: Into<PathBuf>>(executor: RequestExecutor, data_dir: P) -> Self {
        Self {
            executor,
            data_dir: data_dir.into(),
            progress: None,
        }
    }

    /// Validate `config` and talk to the provider over HTTP
    pub fn from_config<P: Into<PathBuf>>(config: CollectorConfig, data_dir: P) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(ReqwestTransport::from_config(&config)?);
        Ok(Self::new(RequestExecutor::new(transport, config), data_dir))
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.executor = self.executor.with_progress(progress.clone());
        self.progress = progress;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn store_for(&self, handle: &str) -> FollowerStore {
        FollowerStore::for_handle(&self.data_dir, &normalize_handle(handle))
    }

    pub fn metrics(&self) -> ExecutorMetricsSnapshot {
        self.executor.metrics()
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Bring the store for `handle` up to date according to `mode`
    pub async fn run(&self, handle: &str, mode: RunMode) -> Result<RunSummary> {
        let handle = normalize_handle(handle);
        if handle.is_empty() {
            return Err(CollectorError::Configuration {
                message: "Account handle is empty".to_string(),
                field: Some("handle".to_string()),
                suggestion: Some("Set FOLLOWERS_HANDLE or pass --handle".to_string()),
            });
        }
        let subject = format!("@{}", handle);
        let store = self.store_for(&handle);

        if mode == RunMode::ExistingOnly
            && store.exists().await.map_err(|e| e.in_phase(RunPhase::Listing, subject.clone()))?
        {
            let stored = store
                .load_known_ids()
                .await
                .map_err(|e| e.in_phase(RunPhase::Listing, subject.clone()))?
                .len();
            info!("Using {} stored followers from {}", stored, store.path().display());
            return Ok(RunSummary {
                run: CollectionRun::new(handle.clone()),
                handle,
                mode,
                fetched: false,
                new_ids: 0,
                enrichment: None,
                stored,
            });
        }

        let api = SocialApi::new(self.executor.clone())?;
        let mut run = CollectionRun::new(handle.clone());
        run.estimated_total = self.estimate_total(&api, &handle).await;

        let mut known: HashSet<FollowerId> = store
            .load_known_ids()
            .await
            .map_err(|e| e.in_phase(RunPhase::Listing, subject.clone()))?;
        info!("Collecting followers of @{} ({} already stored)", handle, known.len());

        let new_ids = IdCollector::new(api.clone())
            .with_progress(self.progress.clone())
            .collect(&mut run, &known)
            .await?;

        let enrichment = Enricher::new(api)
            .with_progress(self.progress.clone())
            .enrich_known(&new_ids, &store, &mut known)
            .await?;
        run.chunks_total = enrichment.chunks_total;
        run.chunks_processed = enrichment.chunks_processed;

        let metrics = self.executor.metrics();
        info!(
            "Run for @{} finished: {} written, {} requests, {} rate-limit waits, {:?} slept",
            handle, enrichment.written, metrics.requests_sent, metrics.rate_limit_waits, metrics.slept
        );

        Ok(RunSummary {
            handle,
            mode,
            fetched: true,
            run,
            new_ids: new_ids.len(),
            enrichment: Some(enrichment),
            stored: known.len(),
        })
    }

    /// Rank the stored followers of `handle`
    pub async fn report(&self, handle: &str, options: &ReportOptions) -> Result<RankedReport> {
        let handle = normalize_handle(handle);
        let records = self
            .store_for(&handle)
            .load_all()
            .await
            .map_err(|e| e.in_phase(RunPhase::Reporting, format!("@{}", handle)))?;
        Ok(RankedReport::build(records, &handle, options))
    }

    /// Follower count for progress; failures only cost the estimate
    async fn estimate_total(&self, api: &SocialApi, handle: &str) -> Option<u64> {
        match api.followers_count(handle).await {
            Ok(Some(count)) => {
                info!("@{} has about {} followers", handle, count);
                emit(&self.progress, ProgressEvent::CountEstimated {
                    handle: handle.to_string(),
                    followers_count: count,
                });
                Some(count)
            }
            Ok(None) => None,
            Err(e) => {
                let e = e.in_phase(RunPhase::Counting, format!("@{}", handle));
                warn!("{}: {}", e, e.root());
                emit(&self.progress, ProgressEvent::Warning {
                    message: format!("{}; progress percentages are unavailable", e),
                });
                None
            }
        }
    }
}
