//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use folio_sync_protocol::ConflictStrategy;
use serde::Deserialize;
use std::time::Duration;

/// Default number of items per batch.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default number of items between progress events.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Configuration for sync runs.
///
/// A run takes a snapshot of the configuration when it starts; updates made
/// while it is active apply to the next run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Maximum items per batch, also used as the page size for remote fetches.
    pub batch_size: usize,
    /// Strategy for conflicting edits.
    pub conflict_strategy: ConflictStrategy,
    /// Timeout applied to each remote call.
    pub request_timeout: Duration,
    /// Items processed between two progress events.
    pub progress_interval: usize,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            conflict_strategy: ConflictStrategy::LastWriteWins,
            request_timeout: Duration::from_secs(30),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the per-call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the progress interval.
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Checks that every field is usable.
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.progress_interval == 0 {
            return Err(SyncError::InvalidConfig(
                "progress_interval must be positive".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::InvalidConfig(
                "request_timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with `update` applied, validated.
    pub fn merged(&self, update: &SyncConfigUpdate) -> SyncResult<Self> {
        let mut next = self.clone();
        if let Some(size) = update.batch_size {
            next.batch_size = size;
        }
        if let Some(strategy) = update.conflict_strategy {
            next.conflict_strategy = strategy;
        }
        if let Some(ms) = update.request_timeout_ms {
            next.request_timeout = Duration::from_millis(ms);
        }
        if let Some(interval) = update.progress_interval {
            next.progress_interval = interval;
        }
        next.validate()?;
        Ok(next)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A partial configuration change.
///
/// Fields left as `None` keep their current value. Deserializes from the
/// camelCase JSON a host application sends.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncConfigUpdate {
    /// New batch size.
    pub batch_size: Option<usize>,
    /// New conflict strategy.
    #[serde(alias = "conflictResolutionStrategy")]
    pub conflict_strategy: Option<ConflictStrategy>,
    /// New per-call timeout in milliseconds.
    pub request_timeout_ms: Option<u64>,
    /// New progress interval.
    pub progress_interval: Option<usize>,
}

impl SyncConfigUpdate {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Sets the conflict strategy.
    pub fn conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = Some(strategy);
        self
    }

    /// Sets the per-call timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.conflict_strategy, ConflictStrategy::LastWriteWins);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder() {
        let config = SyncConfig::new()
            .with_batch_size(50)
            .with_conflict_strategy(ConflictStrategy::Manual)
            .with_request_timeout(Duration::from_secs(5))
            .with_progress_interval(3);

        assert_eq!(config.batch_size, 50);
        assert_eq!(config.conflict_strategy, ConflictStrategy::Manual);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.progress_interval, 3);
    }

    #[test]
    fn zero_batch_size_rejected() {
        let err = SyncConfig::new().with_batch_size(0).validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let base = SyncConfig::new().with_batch_size(40);
        let next = base
            .merged(&SyncConfigUpdate::new().conflict_strategy(ConflictStrategy::RemoteWins))
            .unwrap();

        assert_eq!(next.batch_size, 40);
        assert_eq!(next.conflict_strategy, ConflictStrategy::RemoteWins);
    }

    #[test]
    fn merge_validates() {
        let base = SyncConfig::new();
        assert!(base.merged(&SyncConfigUpdate::new().batch_size(0)).is_err());
        assert!(base
            .merged(&SyncConfigUpdate::new().request_timeout(Duration::ZERO))
            .is_err());
    }

    #[test]
    fn oversized_timeout_saturates() {
        let update = SyncConfigUpdate::new().request_timeout(Duration::MAX);
        assert_eq!(update.request_timeout_ms, Some(u64::MAX));

        let update = SyncConfigUpdate::new().request_timeout(Duration::from_secs(2));
        assert_eq!(update.request_timeout_ms, Some(2000));
    }

    #[test]
    fn update_from_json() {
        let update: SyncConfigUpdate = serde_json::from_str(
            r#"{"batchSize": 10, "conflictResolutionStrategy": "REMOTE_WINS", "requestTimeoutMs": 1500}"#,
        )
        .unwrap();

        assert_eq!(update.batch_size, Some(10));
        assert_eq!(update.conflict_strategy, Some(ConflictStrategy::RemoteWins));
        assert_eq!(update.request_timeout_ms, Some(1500));
        assert_eq!(update.progress_interval, None);
    }

    #[test]
    fn update_rejects_unknown_fields() {
        let result: Result<SyncConfigUpdate, _> = serde_json::from_str(r#"{"batchsize": 10}"#);
        assert!(result.is_err());
    }
}
