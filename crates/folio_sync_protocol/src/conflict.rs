//! Conflict detection and resolution.

use crate::article::Article;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of divergence between a local and a remote snapshot.
///
/// Variants are declared in priority order: when several apply, the first
/// one is the primary type of the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictType {
    /// Title or content differ.
    ContentModified,
    /// Archived, favorite or read flags differ.
    StatusChanged,
    /// Tag sets differ.
    TagsUpdated,
}

impl ConflictType {
    /// Returns the wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ContentModified => "CONTENT_MODIFIED",
            ConflictType::StatusChanged => "STATUS_CHANGED",
            ConflictType::TagsUpdated => "TAGS_UPDATED",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for resolving a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    /// Later `updated_at` wins; ties go to the remote.
    #[default]
    LastWriteWins,
    /// Local always wins and stays queued for upload.
    LocalWins,
    /// Remote always wins.
    RemoteWins,
    /// Nothing is applied; the conflict is left for the caller.
    Manual,
}

impl ConflictStrategy {
    /// Returns true if this strategy resolves conflicts without a caller.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictStrategy::Manual)
    }

    /// Resolves `local` against `remote` with this strategy.
    pub fn resolve(&self, local: &Article, remote: &Article) -> Resolution {
        resolve(local, remote, *self)
    }
}

/// Which snapshot a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    /// The local snapshot.
    Local,
    /// The remote snapshot.
    Remote,
}

/// What to do with the local record once a conflict is decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Persist `article` locally.
    ///
    /// When the local side wins `article.is_modified` stays set so the edit
    /// is uploaded on the next run; when the remote side wins it is cleared.
    Apply {
        /// Strategy that produced the decision.
        strategy: ConflictStrategy,
        /// Side that won.
        winner: Winner,
        /// Record to persist.
        article: Article,
    },
    /// Leave the local record untouched for external resolution.
    Defer,
}

/// Result of resolving one pair of snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Detected conflict types, in priority order.
    pub conflict_types: Vec<ConflictType>,
    /// Decision.
    pub outcome: Outcome,
}

impl Resolution {
    /// Returns the primary conflict type, if the snapshots diverge at all.
    pub fn conflict_type(&self) -> Option<ConflictType> {
        self.conflict_types.first().copied()
    }

    /// Returns true if the snapshots diverge.
    pub fn is_conflict(&self) -> bool {
        !self.conflict_types.is_empty()
    }

    /// Returns the record to persist, if any.
    pub fn winner(&self) -> Option<&Article> {
        match &self.outcome {
            Outcome::Apply { article, .. } => Some(article),
            Outcome::Defer => None,
        }
    }

    /// Returns the winning side, if any.
    pub fn winning_side(&self) -> Option<Winner> {
        match &self.outcome {
            Outcome::Apply { winner, .. } => Some(*winner),
            Outcome::Defer => None,
        }
    }
}

/// Classifies how `local` and `remote` diverge.
///
/// Title/content, status flags and tags are checked first. Only when none
/// of them differ are the soft-delete marker (status) and summary/url
/// (content) consulted, so two diverging snapshots always yield a type.
pub fn detect_conflicts(local: &Article, remote: &Article) -> Vec<ConflictType> {
    let mut types = Vec::new();

    if local.title != remote.title || local.content != remote.content {
        types.push(ConflictType::ContentModified);
    }
    if local.is_archived != remote.is_archived
        || local.is_favorite != remote.is_favorite
        || local.is_read != remote.is_read
    {
        types.push(ConflictType::StatusChanged);
    }
    if local.tags != remote.tags {
        types.push(ConflictType::TagsUpdated);
    }

    if types.is_empty() {
        if local.summary != remote.summary || local.url != remote.url {
            types.push(ConflictType::ContentModified);
        }
        if local.deleted_at != remote.deleted_at {
            types.push(ConflictType::StatusChanged);
        }
    }

    types.sort();
    types
}

/// Resolves a conflict between two snapshots of the same article.
///
/// Pure and deterministic: the same inputs always produce the same output.
pub fn resolve(local: &Article, remote: &Article, strategy: ConflictStrategy) -> Resolution {
    let conflict_types = detect_conflicts(local, remote);

    let winner = match strategy {
        ConflictStrategy::LastWriteWins => {
            if local.updated_at > remote.updated_at {
                Some(Winner::Local)
            } else {
                Some(Winner::Remote)
            }
        }
        ConflictStrategy::LocalWins => Some(Winner::Local),
        ConflictStrategy::RemoteWins => Some(Winner::Remote),
        ConflictStrategy::Manual => None,
    };

    let outcome = match winner {
        Some(Winner::Local) => Outcome::Apply {
            strategy,
            winner: Winner::Local,
            article: Article {
                is_modified: true,
                ..local.clone()
            },
        },
        Some(Winner::Remote) => Outcome::Apply {
            strategy,
            winner: Winner::Remote,
            article: Article {
                is_modified: false,
                synced_at: local.synced_at,
                ..remote.clone()
            },
        },
        None => Outcome::Defer,
    };

    Resolution {
        conflict_types,
        outcome,
    }
}

/// How a recorded conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConflictResolution {
    /// A strategy picked a side and the winner was persisted.
    Applied {
        /// Strategy used.
        strategy: ConflictStrategy,
        /// Side that won.
        winner: Winner,
        /// Winning snapshot as persisted, with the sync stamp of the write
        /// once [`ConflictRecord::with_synced_at`] has been applied.
        article: Article,
    },
    /// Waiting for a caller decision.
    Pending,
}

/// A conflict detected while reconciling downloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    /// Article ID.
    pub article_id: String,
    /// Primary conflict type.
    pub conflict_type: ConflictType,
    /// Every detected type, in priority order.
    pub detected_types: Vec<ConflictType>,
    /// Local snapshot at detection time.
    pub local: Article,
    /// Remote snapshot at detection time.
    pub remote: Article,
    /// How the conflict was settled.
    pub resolution: ConflictResolution,
    /// Detection instant.
    pub detected_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Builds a record from a resolution.
    ///
    /// Returns `None` when the snapshots do not diverge.
    pub fn from_resolution(
        local: &Article,
        remote: &Article,
        resolution: &Resolution,
        detected_at: DateTime<Utc>,
    ) -> Option<Self> {
        let conflict_type = resolution.conflict_type()?;
        let settled = match &resolution.outcome {
            Outcome::Apply {
                strategy,
                winner,
                article,
            } => ConflictResolution::Applied {
                strategy: *strategy,
                winner: *winner,
                article: article.clone(),
            },
            Outcome::Defer => ConflictResolution::Pending,
        };

        Some(Self {
            article_id: local.id.clone(),
            conflict_type,
            detected_types: resolution.conflict_types.clone(),
            local: local.clone(),
            remote: remote.clone(),
            resolution: settled,
            detected_at,
        })
    }

    /// Records the `synced_at` stamp the winner was written with.
    ///
    /// Pending records are returned unchanged.
    pub fn with_synced_at(mut self, at: DateTime<Utc>) -> Self {
        if let ConflictResolution::Applied { article, .. } = &mut self.resolution {
            article.synced_at = Some(at);
        }
        self
    }

    /// Returns true if the conflict awaits a caller decision.
    pub fn is_pending(&self) -> bool {
        matches!(self.resolution, ConflictResolution::Pending)
    }
}
