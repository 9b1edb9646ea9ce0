//! HTTP remote implementation.
//!
//! [`HttpRemote`] speaks the article REST API with JSON bodies. The actual
//! HTTP client is abstracted via [`HttpClient`] so hosts can plug in
//! reqwest, hyper, or a platform bridge.

use crate::error::{SyncError, SyncResult};
use crate::remote::{ArticlePage, FetchRequest, RemoteApi};
use async_trait::async_trait;
use chrono::SecondsFormat;
use folio_sync_protocol::Article;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// An `Err` means no response was received at all; any status code,
/// including errors, is returned as `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Remote API over HTTP.
///
/// Endpoints, relative to the base URL:
/// - `GET /articles?page=&limit=&since=`
/// - `GET /articles/{id}`
/// - `POST /articles`
/// - `PUT /articles/{id}`
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote. A trailing slash on `base_url` is ignored.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the message of the last failed call, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn list_url(&self, request: &FetchRequest) -> String {
        let mut url = format!(
            "{}/articles?page={}&limit={}",
            self.base_url, request.page, request.limit
        );
        if let Some(since) = request.since {
            let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
            url.push_str("&since=");
            url.push_str(&urlencoding::encode(&since));
        }
        url
    }

    fn article_url(&self, id: &str) -> String {
        format!("{}/articles/{}", self.base_url, urlencoding::encode(id))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<&Article>,
        missing_id: Option<&str>,
    ) -> SyncResult<T> {
        let body = body.map(serde_json::to_vec).transpose()?;
        let request = HttpRequest { method, url, body };

        let result = match self.client.send(request).await {
            Ok(response) if response.is_success() => {
                serde_json::from_slice(&response.body).map_err(SyncError::from)
            }
            Ok(response) => match missing_id {
                Some(id) if response.status == 404 => Err(SyncError::not_found(id)),
                _ => Err(SyncError::http(
                    response.status,
                    String::from_utf8_lossy(&response.body).into_owned(),
                )),
            },
            Err(message) => Err(SyncError::Network(message)),
        };

        *self.last_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn fetch_articles(&self, request: &FetchRequest) -> SyncResult<ArticlePage> {
        self.call(Method::Get, self.list_url(request), None, None)
            .await
    }

    async fn get_article(&self, id: &str) -> SyncResult<Article> {
        self.call(Method::Get, self.article_url(id), None, Some(id))
            .await
    }

    async fn create_article(&self, article: &Article) -> SyncResult<Article> {
        let url = format!("{}/articles", self.base_url);
        self.call(Method::Post, url, Some(&article.to_remote()), None)
            .await
    }

    async fn update_article(&self, id: &str, article: &Article) -> SyncResult<Article> {
        self.call(
            Method::Put,
            self.article_url(id),
            Some(&article.to_remote()),
            Some(id),
        )
        .await
    }
}
