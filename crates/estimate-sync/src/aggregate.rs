//! Tracked-hours aggregation per issue.
//!
//! Two strategies are available and exactly one is active per process:
//!
//! - [`RecomputeAggregator`] re-sums every entry Harvest holds for the issue.
//!   It costs one extra request per entry but cannot drift after missed or
//!   repeated runs.
//! - [`RunningTotalAggregator`] keeps a total in the checkpoint store and adds
//!   each processed entry to it. Re-processing an entry counts it twice.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::checkpoint::{tracked_time_key, CheckpointStore};
use crate::classify::round_hours;
use crate::config::AggregationStrategy;
use crate::error::{Result, SyncError};
use crate::harvest::TimeEntrySource;
use crate::models::TimeEntry;

/// Computes the total hours tracked against an issue.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Strategy name for logs.
    fn name(&self) -> &'static str;

    /// Total hours for `issue_key` including `entry`, rounded to two places.
    async fn tracked_hours(&self, issue_key: &str, entry: &TimeEntry) -> Result<f64>;

    /// Record `total` once the issue was annotated successfully.
    async fn commit(&self, issue_key: &str, total: f64) -> Result<()>;
}

/// Build the aggregator selected by `strategy`.
#[must_use]
pub fn build_aggregator(
    strategy: AggregationStrategy,
    source: Arc<dyn TimeEntrySource>,
    store: Arc<dyn CheckpointStore>,
) -> Arc<dyn Aggregator> {
    match strategy {
        AggregationStrategy::Recompute => Arc::new(RecomputeAggregator::new(source)),
        AggregationStrategy::RunningTotal => Arc::new(RunningTotalAggregator::new(store)),
    }
}

/// Sum hours over entries, rounded to two places.
#[must_use]
pub fn total_hours(entries: &[TimeEntry]) -> f64 {
    round_hours(entries.iter().map(|e| e.hours).sum())
}

/// Full recompute from the time entry source.
pub struct RecomputeAggregator {
    source: Arc<dyn TimeEntrySource>,
}

impl RecomputeAggregator {
    #[must_use]
    pub fn new(source: Arc<dyn TimeEntrySource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Aggregator for RecomputeAggregator {
    fn name(&self) -> &'static str {
        "recompute"
    }

    async fn tracked_hours(&self, issue_key: &str, _entry: &TimeEntry) -> Result<f64> {
        let entries = self.source.for_external_reference(issue_key).await?;
        let total = total_hours(&entries);
        debug!(issue_key, entries = entries.len(), total, "Recomputed tracked hours");
        Ok(total)
    }

    async fn commit(&self, _issue_key: &str, _total: f64) -> Result<()> {
        Ok(())
    }
}

/// Incremental total persisted per issue.
pub struct RunningTotalAggregator {
    store: Arc<dyn CheckpointStore>,
}

impl RunningTotalAggregator {
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    async fn stored_total(&self, issue_key: &str) -> Result<f64> {
        match self.store.get(&tracked_time_key(issue_key)).await? {
            Some(raw) => raw.trim().parse().map_err(|_| {
                SyncError::Checkpoint(format!("tracked time for {issue_key} is not a number: {raw}"))
            }),
            None => Ok(0.0),
        }
    }
}

#[async_trait]
impl Aggregator for RunningTotalAggregator {
    fn name(&self) -> &'static str {
        "running-total"
    }

    async fn tracked_hours(&self, issue_key: &str, entry: &TimeEntry) -> Result<f64> {
        let previous = self.stored_total(issue_key).await?;
        Ok(round_hours(previous + entry.hours))
    }

    async fn commit(&self, issue_key: &str, total: f64) -> Result<()> {
        self.store
            .put(&tracked_time_key(issue_key), &total.to_string())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::checkpoint::Watermark;
    use crate::models::{EntryUser, ExternalReference};
    use chrono::{TimeZone, Utc};

    fn entry(id: u64, hours: f64) -> TimeEntry {
        TimeEntry {
            id,
            hours,
            notes: None,
            updated_at: Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap(),
            user: EntryUser {
                id: None,
                name: "Kim Allen".to_string(),
            },
            external_reference: Some(ExternalReference {
                id: "WIL-12".to_string(),
                service: "linear.app".to_string(),
                group_id: None,
                permalink: None,
            }),
        }
    }

    struct FixedSource(Vec<TimeEntry>);

    #[async_trait]
    impl TimeEntrySource for FixedSource {
        async fn updated_since(&self, _since: Watermark) -> Result<Vec<TimeEntry>> {
            Ok(self.0.clone())
        }

        async fn for_external_reference(&self, _reference_id: &str) -> Result<Vec<TimeEntry>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_total_is_order_independent() {
        let mut entries = vec![entry(1, 0.1), entry(2, 0.2), entry(3, 1.333), entry(4, 2.0)];
        let forward = total_hours(&entries);
        entries.reverse();
        let backward = total_hours(&entries);
        assert!((forward - backward).abs() < f64::EPSILON);
        assert!((forward - 3.63).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_recompute_sums_all_entries() {
        let source = Arc::new(FixedSource(vec![entry(1, 1.5), entry(2, 2.25)]));
        let aggregator = RecomputeAggregator::new(source);
        let total = aggregator.tracked_hours("WIL-12", &entry(2, 2.25)).await.unwrap();
        assert!((total - 3.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_running_total_adds_and_commits() {
        let store = Arc::new(MemoryCheckpointStore::with_entries([("tracked_time:WIL-12", "1.5")]));
        let aggregator = RunningTotalAggregator::new(store.clone());

        let total = aggregator.tracked_hours("WIL-12", &entry(3, 0.755)).await.unwrap();
        assert!((total - 2.26).abs() < f64::EPSILON);

        // Nothing is persisted until commit.
        assert_eq!(
            store.get("tracked_time:WIL-12").await.unwrap().as_deref(),
            Some("1.5")
        );
        aggregator.commit("WIL-12", total).await.unwrap();
        assert_eq!(
            store.get("tracked_time:WIL-12").await.unwrap().as_deref(),
            Some("2.26")
        );
    }

    #[tokio::test]
    async fn test_running_total_defaults_to_zero() {
        let aggregator = RunningTotalAggregator::new(Arc::new(MemoryCheckpointStore::new()));
        let total = aggregator.tracked_hours("WIL-99", &entry(1, 4.0)).await.unwrap();
        assert!((total - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_running_total_rejects_garbage() {
        let store = Arc::new(MemoryCheckpointStore::with_entries([("tracked_time:WIL-12", "lots")]));
        let aggregator = RunningTotalAggregator::new(store);
        assert!(aggregator.tracked_hours("WIL-12", &entry(1, 1.0)).await.is_err());
    }
}
