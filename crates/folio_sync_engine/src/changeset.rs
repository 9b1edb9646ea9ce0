//! Change-set queries against both replicas.

use crate::batch::AbortSignal;
use crate::error::SyncResult;
use crate::remote::{with_timeout, FetchRequest, RemoteApi};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use folio_sync_protocol::Article;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Answers "what changed" on each side. Performs no resolution.
pub struct ChangeSetBuilder<'a, S: ?Sized, R: ?Sized> {
    store: &'a S,
    remote: &'a R,
    page_size: u32,
    request_timeout: Duration,
    signal: AbortSignal,
}

impl<'a, S, R> ChangeSetBuilder<'a, S, R>
where
    S: LocalStore + ?Sized,
    R: RemoteApi + ?Sized,
{
    /// Creates a builder. `page_size` is clamped to at least one.
    pub fn new(
        store: &'a S,
        remote: &'a R,
        page_size: usize,
        request_timeout: Duration,
        signal: AbortSignal,
    ) -> Self {
        Self {
            store,
            remote,
            page_size: u32::try_from(page_size.max(1)).unwrap_or(u32::MAX),
            request_timeout,
            signal,
        }
    }

    /// Returns every locally modified article, deleted ones included.
    pub async fn local_dirty(&self) -> SyncResult<Vec<Article>> {
        let dirty = self.store.get_dirty_articles().await?;
        debug!(count = dirty.len(), "collected local changes");
        Ok(dirty)
    }

    /// Returns remote articles updated at or after `since`, or every remote
    /// article when `since` is `None`.
    ///
    /// Pages are fetched in order until the reported page count is reached.
    /// Any failing page fails the whole query. An article seen on several
    /// pages keeps the copy from the last one.
    pub async fn remote_since(&self, since: Option<DateTime<Utc>>) -> SyncResult<Vec<Article>> {
        let mut articles: Vec<Article> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut page = 1u32;

        loop {
            self.signal.check()?;
            let request = FetchRequest::new(page, self.page_size, since);
            let response =
                with_timeout(self.request_timeout, self.remote.fetch_articles(&request)).await?;
            debug!(
                page,
                items = response.items.len(),
                total_pages = response.total_pages,
                "fetched page"
            );

            for article in response.items {
                match positions.get(&article.id) {
                    Some(&index) => articles[index] = article,
                    None => {
                        positions.insert(article.id.clone(), articles.len());
                        articles.push(article);
                    }
                }
            }

            if page >= response.total_pages {
                break;
            }
            page += 1;
        }

        Ok(articles)
    }
}
