//! Chunked follower detail lookup
//!
//! Ids are resolved in batches no larger than the lookup endpoint accepts.
//! Each resolved batch is appended to the store before the next request, so
//! an interrupted run keeps everything it already paid for.

use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::followers::api::SocialApi;
use crate::followers::core::progress::emit;
use crate::followers::core::{
    FollowerId, FollowerRecord, ProgressCallback, ProgressEvent, Result, RunPhase,
};
use crate::followers::store::FollowerStore;

/// Outcome of one enrichment pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichSummary {
    /// Records appended to the store
    pub written: usize,
    pub chunks_total: usize,
    /// Chunks handled, including skipped and failed ones
    pub chunks_processed: usize,
    pub chunks_skipped: usize,
    pub chunks_failed: usize,
    /// Requested ids the provider did not return (deleted or suspended accounts)
    pub not_returned: usize,
    /// Ids left for a later run because their chunk exhausted transport retries
    pub unresolved: Vec<FollowerId>,
}

/// Resolves follower ids to records and streams them into the store
#[derive(Clone)]
pub struct Enricher {
    api: SocialApi,
    chunk_size: usize,
    progress: Option<ProgressCallback>,
}

impl Enricher {
    pub fn new(api: SocialApi) -> Self {
        let chunk_size = api.executor().config().effective_chunk_size();
        Self {
            api,
            chunk_size,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resolve `ids` against the ids already in `store`
    pub async fn enrich(&self, ids: &[FollowerId], store: &FollowerStore) -> Result<EnrichSummary> {
        let mut known = store
            .load_known_ids()
            .await
            .map_err(|e| e.in_phase(RunPhase::Enrichment, store.path().display().to_string()))?;
        self.enrich_known(ids, store, &mut known).await
    }

    /// Resolve `ids`, treating `known` as the store's key set and growing it as chunks land
    ///
    /// A chunk whose request exhausts transport retries is left unresolved and
    /// the pass moves on. Any other failure aborts the pass.
    pub async fn enrich_known(
        &self,
        ids: &[FollowerId],
        store: &FollowerStore,
        known: &mut HashSet<FollowerId>,
    ) -> Result<EnrichSummary> {
        let chunks: Vec<&[FollowerId]> = ids.chunks(self.chunk_size).collect();
        let total_chunks = chunks.len();
        let mut summary = EnrichSummary {
            chunks_total: total_chunks,
            ..EnrichSummary::default()
        };

        for (index, chunk) in chunks.into_iter().enumerate() {
            let number = index + 1;
            summary.chunks_processed += 1;

            let mut pending_set = HashSet::with_capacity(chunk.len());
            let pending: Vec<FollowerId> = chunk
                .iter()
                .filter(|id| !known.contains(*id) && pending_set.insert((*id).clone()))
                .cloned()
                .collect();

            if pending.is_empty() {
                debug!("Chunk {}/{} already stored, skipping", number, total_chunks);
                summary.chunks_skipped += 1;
                emit(&self.progress, ProgressEvent::ChunkSkipped {
                    chunk: number,
                    total_chunks,
                });
                continue;
            }

            let subject = chunk_subject(&pending);
            let users = match self.api.lookup_users(&pending).await {
                Ok(users) => users,
                Err(e) if e.is_recoverable() => {
                    warn!("Leaving {} unresolved for a later run: {}", subject, e);
                    summary.chunks_failed += 1;
                    emit(&self.progress, ProgressEvent::ChunkFailed {
                        chunk: number,
                        total_chunks,
                        unresolved: pending.len(),
                        error: e.to_string(),
                    });
                    summary.unresolved.extend(pending);
                    continue;
                }
                Err(e) => return Err(e.in_phase(RunPhase::Enrichment, subject)),
            };

            let resolved_at = Utc::now();
            let mut batch_ids = HashSet::with_capacity(users.len());
            let records: Vec<FollowerRecord> = users
                .into_iter()
                .filter_map(|user| user.into_record(resolved_at))
                .filter(|record| pending_set.contains(&record.id) && batch_ids.insert(record.id.clone()))
                .collect();

            let written = store
                .append(&records)
                .await
                .map_err(|e| e.in_phase(RunPhase::Enrichment, subject.clone()))?;
            known.extend(records.into_iter().map(|record| record.id));

            summary.written += written;
            summary.not_returned += pending.len() - written;
            debug!("Chunk {}/{}: {} requested, {} written", number, total_chunks, pending.len(), written);
            emit(&self.progress, ProgressEvent::ChunkProcessed {
                chunk: number,
                total_chunks,
                requested: pending.len(),
                written,
            });
        }

        info!(
            "Enrichment finished: {} written, {} unresolved, {} not returned by the provider",
            summary.written,
            summary.unresolved.len(),
            summary.not_returned
        );
        emit(&self.progress, ProgressEvent::EnrichmentComplete {
            written: summary.written,
            unresolved: summary.unresolved.len(),
        });
        Ok(summary)
    }
}

/// Human-readable id range for error messages
fn chunk_subject(ids: &[FollowerId]) -> String {
    match ids {
        [] => "no ids".to_string(),
        [only] => format!("id {}", only),
        [first, .., last] => format!("ids {}..{}", first, last),
    }
}
