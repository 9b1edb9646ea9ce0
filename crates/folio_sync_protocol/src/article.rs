//! Article records.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A saved article, the logical record replicated between the local store
/// and the remote server.
///
/// The `id` is stable across both sides. `synced_at` and `is_modified` are
/// local bookkeeping: the remote never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Stable identifier shared by local and remote copies.
    pub id: String,
    /// Title.
    pub title: String,
    /// Short summary.
    #[serde(default)]
    pub summary: String,
    /// Full body.
    #[serde(default)]
    pub content: String,
    /// Source URL.
    #[serde(default)]
    pub url: String,
    /// Archived flag.
    #[serde(default)]
    pub is_archived: bool,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
    /// Read flag.
    #[serde(default)]
    pub is_read: bool,
    /// Tags, compared as a set.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last modification instant (monotonic per writer).
    pub updated_at: DateTime<Utc>,
    /// Instant of the last successful reconciliation.
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    /// Locally dirty since the last sync.
    #[serde(default)]
    pub is_modified: bool,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Creates a new, clean article stamped with `now`.
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            summary: String::new(),
            content: String::new(),
            url: String::new(),
            is_archived: false,
            is_favorite: false,
            is_read: false,
            tags: BTreeSet::new(),
            created_at: now,
            updated_at: now,
            synced_at: None,
            is_modified: false,
            deleted_at: None,
        }
    }

    /// Returns true if the article carries a soft-delete marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Checks structural validity.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.id.is_empty() {
            return Err(ProtocolError::EmptyId);
        }
        if self.updated_at < self.created_at {
            return Err(ProtocolError::TimestampOrder {
                id: self.id.clone(),
            });
        }
        Ok(())
    }

    /// Compares the user-visible fields that sync replicates.
    ///
    /// Timestamps other than `deleted_at` and the local bookkeeping fields
    /// are ignored.
    pub fn same_content(&self, other: &Article) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.summary == other.summary
            && self.content == other.content
            && self.url == other.url
            && self.is_archived == other.is_archived
            && self.is_favorite == other.is_favorite
            && self.is_read == other.is_read
            && self.tags == other.tags
            && self.deleted_at == other.deleted_at
    }

    /// Returns true if `other` is the same version of this article.
    pub fn same_version(&self, other: &Article) -> bool {
        self.same_content(other) && self.updated_at == other.updated_at
    }

    /// Returns the copy sent to the remote, without local bookkeeping.
    pub fn to_remote(&self) -> Article {
        Article {
            synced_at: None,
            is_modified: false,
            ..self.clone()
        }
    }
}

/// A partial update to a local article, keyed by id.
///
/// Unset fields are left untouched, so a sync write never clobbers a field
/// the user edited concurrently unless the patch names it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePatch {
    /// New title.
    pub title: Option<String>,
    /// New summary.
    pub summary: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New URL.
    pub url: Option<String>,
    /// New archived flag.
    pub is_archived: Option<bool>,
    /// New favorite flag.
    pub is_favorite: Option<bool>,
    /// New read flag.
    pub is_read: Option<bool>,
    /// New tag set.
    pub tags: Option<BTreeSet<String>>,
    /// New creation instant.
    pub created_at: Option<DateTime<Utc>>,
    /// New update instant.
    pub updated_at: Option<DateTime<Utc>>,
    /// New sync instant (`Some(None)` clears it).
    pub synced_at: Option<Option<DateTime<Utc>>>,
    /// New modified flag.
    pub is_modified: Option<bool>,
    /// New soft-delete marker (`Some(None)` restores the article).
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl ArticlePatch {
    /// Creates an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the article as reconciled at `at`: clean and stamped.
    pub fn mark_synced(at: DateTime<Utc>) -> Self {
        Self {
            is_modified: Some(false),
            synced_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// Replaces every replicated field with the values of `source`.
    ///
    /// The modified flag is taken from `source` and `synced_at` is stamped
    /// with `at`.
    pub fn overwrite_with(source: &Article, at: DateTime<Utc>) -> Self {
        Self {
            title: Some(source.title.clone()),
            summary: Some(source.summary.clone()),
            content: Some(source.content.clone()),
            url: Some(source.url.clone()),
            is_archived: Some(source.is_archived),
            is_favorite: Some(source.is_favorite),
            is_read: Some(source.is_read),
            tags: Some(source.tags.clone()),
            created_at: Some(source.created_at),
            updated_at: Some(source.updated_at),
            synced_at: Some(Some(at)),
            is_modified: Some(source.is_modified),
            deleted_at: Some(source.deleted_at),
        }
    }

    /// Sets the server-assigned timestamps.
    pub fn with_server_timestamps(mut self, server: &Article) -> Self {
        self.created_at = Some(server.created_at);
        self.updated_at = Some(server.updated_at);
        self
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the modified flag.
    pub fn with_modified(mut self, modified: bool) -> Self {
        self.is_modified = Some(modified);
        self
    }

    /// Returns true if the patch names no field.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch in place.
    pub fn apply(&self, article: &mut Article) {
        if let Some(title) = &self.title {
            article.title = title.clone();
        }
        if let Some(summary) = &self.summary {
            article.summary = summary.clone();
        }
        if let Some(content) = &self.content {
            article.content = content.clone();
        }
        if let Some(url) = &self.url {
            article.url = url.clone();
        }
        if let Some(v) = self.is_archived {
            article.is_archived = v;
        }
        if let Some(v) = self.is_favorite {
            article.is_favorite = v;
        }
        if let Some(v) = self.is_read {
            article.is_read = v;
        }
        if let Some(tags) = &self.tags {
            article.tags = tags.clone();
        }
        if let Some(at) = self.created_at {
            article.created_at = at;
        }
        if let Some(at) = self.updated_at {
            article.updated_at = at;
        }
        if let Some(at) = self.synced_at {
            article.synced_at = at;
        }
        if let Some(v) = self.is_modified {
            article.is_modified = v;
        }
        if let Some(at) = self.deleted_at {
            article.deleted_at = at;
        }
    }
}
