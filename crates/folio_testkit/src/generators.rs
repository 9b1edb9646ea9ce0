//! Property-based test generators using proptest.

use crate::fixtures::epoch;
use chrono::{DateTime, Duration, Utc};
use folio_sync_protocol::{Article, ConflictStrategy};
use proptest::prelude::*;

/// Strategy for instants within one day after [`epoch`].
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..86_400).prop_map(|secs| epoch() + Duration::seconds(secs))
}

/// Strategy for article titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,23}"
}

/// Strategy for a clean article with the given id.
pub fn article_strategy(id: impl Into<String>) -> impl Strategy<Value = Article> {
    let id = id.into();
    (
        title_strategy(),
        "[a-z ]{0,40}",
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::collection::btree_set("[a-z]{1,6}", 0..4),
        timestamp_strategy(),
    )
        .prop_map(move |(title, content, archived, favorite, read, tags, updated_at)| {
            let mut article = Article::new(id.clone(), title, epoch());
            article.content = content;
            article.is_archived = archived;
            article.is_favorite = favorite;
            article.is_read = read;
            article.tags = tags;
            article.updated_at = updated_at;
            article
        })
}

/// Strategy for a batch of `1..max` clean articles with distinct ids.
pub fn article_set_strategy(max: usize) -> impl Strategy<Value = Vec<Article>> {
    (1..max.max(2)).prop_flat_map(|count| {
        (0..count)
            .map(|i| article_strategy(crate::fixtures::article_id(i)))
            .collect::<Vec<_>>()
    })
}

/// Strategy for conflict strategies.
pub fn conflict_strategy_strategy() -> impl Strategy<Value = ConflictStrategy> {
    prop_oneof![
        Just(ConflictStrategy::LastWriteWins),
        Just(ConflictStrategy::LocalWins),
        Just(ConflictStrategy::RemoteWins),
        Just(ConflictStrategy::Manual),
    ]
}
