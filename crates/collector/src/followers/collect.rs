//! Paginated follower id collection

use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::followers::api::{Cursor, SocialApi};
use crate::followers::core::progress::emit;
use crate::followers::core::{
    CollectionRun, FollowerId, ProgressCallback, ProgressEvent, Result, RunPhase,
};

/// Walks the follower listing of one account, one page per call
///
/// Ids already in `known` or already yielded by this pager are dropped, so
/// the concatenation of all pages is the set of new ids in listing order.
pub struct FollowerIdPager<'a> {
    api: SocialApi,
    known: &'a HashSet<FollowerId>,
    seen: HashSet<FollowerId>,
    cursor: Option<Cursor>,
    run: &'a mut CollectionRun,
    progress: Option<ProgressCallback>,
}

impl<'a> FollowerIdPager<'a> {
    pub fn new(api: SocialApi, run: &'a mut CollectionRun, known: &'a HashSet<FollowerId>) -> Self {
        Self {
            api,
            known,
            seen: HashSet::new(),
            cursor: Some(Cursor::INITIAL),
            run,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.is_none()
    }

    /// Fetch the next page and return its new ids, or `None` once the listing is exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<FollowerId>>> {
        let Some(cursor) = self.cursor else {
            return Ok(None);
        };

        let page = self.api.follower_ids_page(&self.run.handle, cursor).await?;
        let retrieved = page.ids.len();

        let mut fresh = Vec::with_capacity(retrieved);
        let mut skipped = 0;
        for id in page.ids {
            if self.known.contains(&id) || !self.seen.insert(id.clone()) {
                skipped += 1;
            } else {
                fresh.push(id);
            }
        }

        self.run.pages += 1;
        self.run.retrieved += retrieved;
        self.run.skipped += skipped;

        self.cursor = if page.next_cursor.is_terminal() {
            None
        } else if page.next_cursor == cursor {
            warn!("Listing cursor {} did not advance, stopping pagination", cursor);
            None
        } else {
            Some(page.next_cursor)
        };

        debug!(
            "Page {} for @{}: {} ids, {} new, next cursor {:?}",
            self.run.pages, self.run.handle, retrieved, fresh.len(), self.cursor
        );
        emit(&self.progress, ProgressEvent::PageFetched {
            page: self.run.pages,
            retrieved,
            skipped,
            collected: self.seen.len(),
            estimated_total: self.run.estimated_total,
        });

        Ok(Some(fresh))
    }
}

/// Collects the ids of followers not yet in the store
#[derive(Clone)]
pub struct IdCollector {
    api: SocialApi,
    progress: Option<ProgressCallback>,
}

impl IdCollector {
    pub fn new(api: SocialApi) -> Self {
        Self { api, progress: None }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Pager over `run.handle` filtering against `known`
    pub fn pager<'a>(&self, run: &'a mut CollectionRun, known: &'a HashSet<FollowerId>) -> FollowerIdPager<'a> {
        FollowerIdPager::new(self.api.clone(), run, known).with_progress(self.progress.clone())
    }

    /// Drain the listing for `run.handle`, returning ids absent from `known`
    ///
    /// Any failure aborts the listing, annotated with the handle.
    pub async fn collect(&self, run: &mut CollectionRun, known: &HashSet<FollowerId>) -> Result<Vec<FollowerId>> {
        let handle = run.handle.clone();
        let mut ids = Vec::new();
        {
            let mut pager = self.pager(run, known);
            while let Some(page) = pager
                .next_page()
                .await
                .map_err(|e| e.in_phase(RunPhase::Listing, format!("@{}", handle)))?
            {
                ids.extend(page);
            }
        }

        info!(
            "Listed {} followers of @{}: {} new, {} already stored",
            run.retrieved, handle, ids.len(), run.skipped
        );
        emit(&self.progress, ProgressEvent::ListingComplete {
            handle,
            new_ids: ids.len(),
            skipped: run.skipped,
        });
        Ok(ids)
    }
}
