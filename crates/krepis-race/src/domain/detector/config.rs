//! Detector Configuration

use crate::domain::clock::EpochLayout;
use crate::domain::error::{DetectorError, DetectorResult};
use crate::domain::relation::{AnalysisMode, Relation, RelationSet};
use serde::{Deserialize, Serialize};

/// Detector configuration
///
/// Deserializable from JSON; missing fields take their defaults.
///
/// ```rust
/// use krepis_race::domain::{DetectorConfig, Relation};
///
/// let config = DetectorConfig::default()
///     .with_relations([Relation::Hb, Relation::Wdc])
///     .with_max_threads(64);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Relations computed in one pass
    pub relations: RelationSet,

    /// Lock-free same-epoch probe before the location lock
    pub epoch_fast_path: bool,

    /// Single-owner state machine
    pub owned_fast_path: bool,

    /// Rule (a) through held-lock snapshot lists instead of per-lock maps
    pub held_lock_snapshots: bool,

    /// Thread capacity; fixes the epoch bit split
    pub max_threads: u64,

    /// Check event-stream consistency (lock holders, live threads)
    pub check_invariants: bool,

    /// Maintain per-engine fast-path and transition counters
    pub count_events: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            relations: [Relation::Hb].into_iter().collect(),
            epoch_fast_path: true,
            owned_fast_path: true,
            held_lock_snapshots: false,
            max_threads: 1024,
            check_invariants: cfg!(debug_assertions),
            count_events: false,
        }
    }
}

impl DetectorConfig {
    /// Replace the relation set
    pub fn with_relations(mut self, relations: impl IntoIterator<Item = Relation>) -> Self {
        self.relations = relations.into_iter().collect();
        self
    }

    /// Enable or disable the epoch fast path
    pub fn with_epoch_fast_path(mut self, enabled: bool) -> Self {
        self.epoch_fast_path = enabled;
        self
    }

    /// Enable or disable the single-owner state machine
    pub fn with_owned_fast_path(mut self, enabled: bool) -> Self {
        self.owned_fast_path = enabled;
        self
    }

    /// Enable or disable held-lock snapshots
    pub fn with_held_lock_snapshots(mut self, enabled: bool) -> Self {
        self.held_lock_snapshots = enabled;
        self
    }

    /// Set the thread capacity
    pub fn with_max_threads(mut self, max_threads: u64) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Enable or disable invariant checks
    pub fn with_check_invariants(mut self, enabled: bool) -> Self {
        self.check_invariants = enabled;
        self
    }

    /// Enable or disable engine counters
    pub fn with_count_events(mut self, enabled: bool) -> Self {
        self.count_events = enabled;
        self
    }

    /// Reject configurations the detector cannot run
    pub fn validate(&self) -> DetectorResult<()> {
        if self.relations.is_empty() {
            return Err(DetectorError::InvalidConfig(
                "at least one relation is required".to_string(),
            ));
        }
        self.layout().map(|_| ())
    }

    /// Epoch layout for the configured capacity
    pub fn layout(&self) -> DetectorResult<EpochLayout> {
        EpochLayout::for_max_threads(self.max_threads)
    }

    /// Mode the engine for `relation` runs under
    pub const fn mode_for(&self, relation: Relation) -> AnalysisMode {
        AnalysisMode::select(relation, self.owned_fast_path, self.held_lock_snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::MAX_SUPPORTED_THREADS;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.relations.iter().collect::<Vec<_>>(), vec![Relation::Hb]);
        assert!(config.epoch_fast_path);
        assert!(config.owned_fast_path);
        assert!(!config.held_lock_snapshots);
        assert_eq!(config.max_threads, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_relations() {
        let config = DetectorConfig::default().with_relations([]);
        assert!(matches!(config.validate(), Err(DetectorError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_capacity() {
        assert!(DetectorConfig::default().with_max_threads(0).validate().is_err());
        assert!(DetectorConfig::default()
            .with_max_threads(MAX_SUPPORTED_THREADS + 1)
            .validate()
            .is_err());
        assert!(DetectorConfig::default()
            .with_max_threads(MAX_SUPPORTED_THREADS)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"relations":["wcp","wdc"],"held_lock_snapshots":true}"#).unwrap();
        assert!(config.relations.contains(Relation::Wcp));
        assert!(config.held_lock_snapshots);
        assert!(config.epoch_fast_path);
        assert_eq!(config.mode_for(Relation::Wcp), AnalysisMode::Snapshot);
        assert_eq!(config.mode_for(Relation::Hb), AnalysisMode::Owned);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed: Result<DetectorConfig, _> = serde_json::from_str(r#"{"relation":"hb"}"#);
        assert!(parsed.is_err());
    }
}
