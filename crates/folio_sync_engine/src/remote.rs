//! Remote API abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use folio_sync_protocol::Article;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Awaits a remote call, failing with [`SyncError::Timeout`] after `limit`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = SyncResult<T>>,
) -> SyncResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit)),
    }
}

/// Parameters for one page of a remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Page number, starting at 1.
    pub page: u32,
    /// Maximum items per page.
    pub limit: u32,
    /// Only return articles updated at or after this instant.
    pub since: Option<DateTime<Utc>>,
}

impl FetchRequest {
    /// Creates a request for the given page.
    pub fn new(page: u32, limit: u32, since: Option<DateTime<Utc>>) -> Self {
        Self { page, limit, since }
    }
}

/// One page of remote articles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlePage {
    /// Articles on this page.
    pub items: Vec<Article>,
    /// Total number of pages for the request's filter.
    pub total_pages: u32,
}

/// The remote, authoritative article store.
///
/// This trait abstracts the network layer so the engine can run against
/// HTTP, a loopback server, or a mock in tests.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetches one page of articles.
    async fn fetch_articles(&self, request: &FetchRequest) -> SyncResult<ArticlePage>;

    /// Fetches one article. Missing articles yield [`SyncError::NotFound`].
    async fn get_article(&self, id: &str) -> SyncResult<Article>;

    /// Creates an article and returns the stored version.
    async fn create_article(&self, article: &Article) -> SyncResult<Article>;

    /// Replaces an article and returns the stored version.
    async fn update_article(&self, id: &str, article: &Article) -> SyncResult<Article>;
}

/// Remote operations a [`MockRemote`] can fail on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    /// `get_article`.
    Get,
    /// `create_article`.
    Create,
    /// `update_article`.
    Update,
}

/// A failure injected into a [`MockRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection dropped.
    Network,
    /// The server answers with this status.
    Status(u16),
    /// The call never completes.
    Hang,
}

impl MockFailure {
    async fn raise<T>(self) -> SyncResult<T> {
        match self {
            MockFailure::Network => Err(SyncError::Network("connection reset by peer".into())),
            MockFailure::Status(status) => Err(SyncError::http(status, "injected failure")),
            MockFailure::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SyncError::Network("hung call returned".into()))
            }
        }
    }
}

/// An in-memory remote for testing.
///
/// Keeps articles in id order, answers fetches sorted by `updated_at`, and
/// counts every call.
#[derive(Debug, Default)]
pub struct MockRemote {
    articles: RwLock<BTreeMap<String, Article>>,
    connected: AtomicBool,
    latency: RwLock<Option<Duration>>,
    assign_timestamps: AtomicBool,
    failures: RwLock<HashMap<(RemoteOp, String), MockFailure>>,
    fetch_failure: RwLock<Option<MockFailure>>,
    fetch_calls: AtomicU64,
    get_calls: AtomicU64,
    create_calls: AtomicU64,
    update_calls: AtomicU64,
}

impl MockRemote {
    /// Creates an empty, connected remote.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Creates a remote holding `articles`.
    pub fn with_articles(articles: impl IntoIterator<Item = Article>) -> Self {
        let remote = Self::new();
        for article in articles {
            remote.insert(article);
        }
        remote
    }

    /// Stores an article as if another device had written it.
    pub fn insert(&self, article: Article) {
        self.articles
            .write()
            .insert(article.id.clone(), article.to_remote());
    }

    /// Edits a stored article and bumps its `updated_at` to `at`.
    pub fn edit(&self, id: &str, at: DateTime<Utc>, edit: impl FnOnce(&mut Article)) -> bool {
        let mut articles = self.articles.write();
        match articles.get_mut(id) {
            Some(article) => {
                edit(article);
                article.updated_at = at;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of a stored article.
    pub fn get(&self, id: &str) -> Option<Article> {
        self.articles.read().get(id).cloned()
    }

    /// Returns the number of stored articles.
    pub fn len(&self) -> usize {
        self.articles.read().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.articles.read().is_empty()
    }

    /// Sets the connected state. A disconnected remote fails every call.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    /// Stamps `updated_at` with the server clock on create and update.
    pub fn set_assign_timestamps(&self, assign: bool) {
        self.assign_timestamps.store(assign, Ordering::SeqCst);
    }

    /// Makes `op` fail for article `id`.
    pub fn fail_on(&self, op: RemoteOp, id: impl Into<String>, failure: MockFailure) {
        self.failures.write().insert((op, id.into()), failure);
    }

    /// Makes every fetch fail.
    pub fn fail_fetches(&self, failure: MockFailure) {
        *self.fetch_failure.write() = Some(failure);
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.failures.write().clear();
        *self.fetch_failure.write() = None;
    }

    /// Number of `fetch_articles` calls.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_article` calls.
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_article` calls.
    pub fn create_calls(&self) -> u64 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `update_article` calls.
    pub fn update_calls(&self) -> u64 {
        self.update_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self, op: Option<(RemoteOp, &str)>) -> SyncResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::Network("not connected to server".into()));
        }
        let failure = match op {
            Some((op, id)) => self.failures.read().get(&(op, id.to_string())).copied(),
            None => *self.fetch_failure.read(),
        };
        match failure {
            Some(failure) => failure.raise().await,
            None => Ok(()),
        }
    }

    fn stored(&self, article: &Article) -> Article {
        let mut stored = article.to_remote();
        if self.assign_timestamps.load(Ordering::SeqCst) {
            stored.updated_at = Utc::now().max(stored.updated_at);
        }
        stored
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn fetch_articles(&self, request: &FetchRequest) -> SyncResult<ArticlePage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(None).await?;

        if request.page == 0 || request.limit == 0 {
            return Err(SyncError::http(400, "page and limit must be positive"));
        }

        let mut matching: Vec<Article> = self
            .articles
            .read()
            .values()
            .filter(|a| request.since.map_or(true, |since| a.updated_at >= since))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));

        let limit = request.limit as usize;
        let total_pages = matching.len().div_ceil(limit) as u32;
        let items = matching
            .into_iter()
            .skip((request.page as usize - 1) * limit)
            .take(limit)
            .collect();

        Ok(ArticlePage { items, total_pages })
    }

    async fn get_article(&self, id: &str) -> SyncResult<Article> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(Some((RemoteOp::Get, id))).await?;
        self.get(id).ok_or_else(|| SyncError::not_found(id))
    }

    async fn create_article(&self, article: &Article) -> SyncResult<Article> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(Some((RemoteOp::Create, &article.id))).await?;
        article.validate()?;

        let stored = self.stored(article);
        let mut articles = self.articles.write();
        if articles.contains_key(&stored.id) {
            return Err(SyncError::http(409, format!("article {} exists", stored.id)));
        }
        articles.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_article(&self, id: &str, article: &Article) -> SyncResult<Article> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.enter(Some((RemoteOp::Update, id))).await?;
        article.validate()?;

        let stored = self.stored(article);
        let mut articles = self.articles.write();
        match articles.get_mut(id) {
            Some(existing) => {
                *existing = stored.clone();
                Ok(stored)
            }
            None => Err(SyncError::not_found(id)),
        }
    }
}
