//! Article fixtures.
//!
//! Every fixture is stamped on 2023-01-01 UTC so tests can reason about
//! ordering with plain hour offsets.

use chrono::{DateTime, TimeZone, Utc};
use folio_sync_protocol::Article;

/// Returns 2023-01-01 at `hour:minute` UTC.
///
/// # Panics
///
/// Panics if `hour` or `minute` is out of range.
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, hour, minute, 0)
        .single()
        .expect("fixture time out of range")
}

/// Returns the instant all fixtures are created at.
pub fn epoch() -> DateTime<Utc> {
    at(0, 0)
}

/// Returns the id of the `index`-th generated article.
pub fn article_id(index: usize) -> String {
    format!("article-{index:04}")
}

/// Builder for test articles.
#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    article: Article,
}

impl ArticleBuilder {
    /// Starts a clean, never-synced article created at [`epoch`].
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let title = format!("Title of {id}");
        Self {
            article: Article::new(id, title, epoch()),
        }
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.article.title = title.into();
        self
    }

    /// Sets the body.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.article.content = content.into();
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.article.tags.insert(tag.into());
        self
    }

    /// Sets the favorite flag.
    pub fn favorite(mut self, favorite: bool) -> Self {
        self.article.is_favorite = favorite;
        self
    }

    /// Sets the read flag.
    pub fn read(mut self, read: bool) -> Self {
        self.article.is_read = read;
        self
    }

    /// Sets `updated_at`.
    pub fn updated(mut self, updated_at: DateTime<Utc>) -> Self {
        self.article.updated_at = updated_at;
        self
    }

    /// Sets `synced_at`.
    pub fn synced(mut self, synced_at: DateTime<Utc>) -> Self {
        self.article.synced_at = Some(synced_at);
        self
    }

    /// Marks the article as locally modified.
    pub fn dirty(mut self) -> Self {
        self.article.is_modified = true;
        self
    }

    /// Soft-deletes the article at `deleted_at`.
    pub fn deleted(mut self, deleted_at: DateTime<Utc>) -> Self {
        self.article.deleted_at = Some(deleted_at);
        self
    }

    /// Builds the article.
    pub fn build(self) -> Article {
        self.article
    }
}

/// Creates `count` locally modified, never-synced articles.
pub fn dirty_articles(count: usize) -> Vec<Article> {
    (0..count)
        .map(|i| ArticleBuilder::new(article_id(i)).dirty().build())
        .collect()
}

/// Creates `count` clean articles last synced at `synced_at`.
pub fn synced_articles(count: usize, synced_at: DateTime<Utc>) -> Vec<Article> {
    (0..count)
        .map(|i| ArticleBuilder::new(article_id(i)).synced(synced_at).build())
        .collect()
}

/// The local side of the classic last-write-wins scenario: article `A`
/// titled "Local", edited at 10:00 and not yet uploaded.
pub fn lww_local() -> Article {
    ArticleBuilder::new("A")
        .title("Local")
        .updated(at(10, 0))
        .synced(at(9, 0))
        .dirty()
        .build()
}

/// The remote side of the last-write-wins scenario: article `A` titled
/// "Remote", written at 12:00.
pub fn lww_remote() -> Article {
    ArticleBuilder::new("A")
        .title("Remote")
        .updated(at(12, 0))
        .build()
}
