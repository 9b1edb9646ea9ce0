//! Local store contract.
//!
//! The engine reads and writes the local replica only through
//! [`LocalStore`]. Writes are single-record and keyed by id so a sync never
//! replaces data a user edited concurrently.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_sync_protocol::{Article, ArticlePatch, ProtocolError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// The subset of the local persistence layer the engine depends on.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Returns every article with `is_modified` set, deleted or not.
    async fn get_dirty_articles(&self) -> SyncResult<Vec<Article>>;

    /// Looks up one article.
    async fn get_article(&self, id: &str) -> SyncResult<Option<Article>>;

    /// Inserts a new article and returns its id.
    async fn create_article(&self, article: Article) -> SyncResult<String>;

    /// Applies a partial update and returns the number of rows affected.
    async fn update_article(&self, id: &str, patch: &ArticlePatch) -> SyncResult<u64>;

    /// Returns the instant of the last successful sync.
    async fn get_last_sync_timestamp(&self) -> SyncResult<Option<DateTime<Utc>>>;

    /// Persists the instant of the last successful sync.
    async fn set_last_sync_timestamp(&self, at: DateTime<Utc>) -> SyncResult<()>;
}

/// An in-memory local store.
///
/// Supports failure injection for tests: whole-store read failures and
/// per-article write failures.
pub struct MemoryStore {
    articles: RwLock<BTreeMap<String, Article>>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
    fail_reads: AtomicBool,
    failing_writes: RwLock<HashSet<String>>,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            articles: RwLock::new(BTreeMap::new()),
            last_sync: RwLock::new(None),
            fail_reads: AtomicBool::new(false),
            failing_writes: RwLock::new(HashSet::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a store holding `articles`.
    pub fn with_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let store = Self::new();
        for article in articles {
            store.insert(article);
        }
        store
    }

    /// Inserts or replaces an article directly, bypassing sync bookkeeping.
    pub fn insert(&self, article: Article) {
        self.articles.write().insert(article.id.clone(), article);
    }

    /// Simulates a user edit: applies `edit`, marks the article dirty and
    /// bumps `updated_at` to `at`.
    ///
    /// Returns false if the article does not exist.
    pub fn edit(&self, id: &str, at: DateTime<Utc>, edit: impl FnOnce(&mut Article)) -> bool {
        let mut articles = self.articles.write();
        match articles.get_mut(id) {
            Some(article) => {
                edit(article);
                article.is_modified = true;
                article.updated_at = at;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of one article.
    pub fn get(&self, id: &str) -> Option<Article> {
        self.articles.read().get(id).cloned()
    }

    /// Returns copies of all articles, ordered by id.
    pub fn all(&self) -> Vec<Article> {
        self.articles.read().values().cloned().collect()
    }

    /// Returns the number of articles.
    pub fn len(&self) -> usize {
        self.articles.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.articles.read().is_empty()
    }

    /// Returns the number of writes performed through the store contract.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the stored last-sync instant.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read()
    }

    /// Makes every query fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every write to `id` fail.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.failing_writes.write().insert(id.into());
    }

    fn check_read(&self) -> SyncResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("local store unavailable".into()));
        }
        Ok(())
    }

    fn check_write(&self, id: &str) -> SyncResult<()> {
        if self.failing_writes.read().contains(id) {
            return Err(SyncError::Storage(format!("write rejected for article {id}")));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_dirty_articles(&self) -> SyncResult<Vec<Article>> {
        self.check_read()?;
        Ok(self
            .articles
            .read()
            .values()
            .filter(|a| a.is_modified)
            .cloned()
            .collect())
    }

    async fn get_article(&self, id: &str) -> SyncResult<Option<Article>> {
        self.check_read()?;
        Ok(self.get(id))
    }

    async fn create_article(&self, article: Article) -> SyncResult<String> {
        article.validate()?;
        self.check_write(&article.id)?;

        let mut articles = self.articles.write();
        if articles.contains_key(&article.id) {
            return Err(SyncError::Storage(format!(
                "article {} already exists",
                article.id
            )));
        }
        let id = article.id.clone();
        articles.insert(id.clone(), article);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn update_article(&self, id: &str, patch: &ArticlePatch) -> SyncResult<u64> {
        if patch.is_empty() {
            return Err(ProtocolError::EmptyPatch { id: id.to_string() }.into());
        }
        self.check_write(id)?;

        let mut articles = self.articles.write();
        match articles.get_mut(id) {
            Some(article) => {
                patch.apply(article);
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn get_last_sync_timestamp(&self) -> SyncResult<Option<DateTime<Utc>>> {
        self.check_read()?;
        Ok(self.last_sync())
    }

    async fn set_last_sync_timestamp(&self, at: DateTime<Utc>) -> SyncResult<()> {
        *self.last_sync.write() = Some(at);
        Ok(())
    }
}
