//! One reconciliation pass: watermark → entries → per-entry annotation → watermark.
//!
//! Entries are processed strictly one after another in fetch order. A failure
//! in one entry's pipeline is logged and recorded in the [`RunSummary`]; the
//! remaining entries still run. Only failures that make the pass itself
//! unsafe (checkpoint store, fetching the entry window) end the run with an
//! error, and in that case the watermark is left where it was.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{build_aggregator, Aggregator};
use crate::checkpoint::{
    load_watermark, save_watermark, CheckpointStore, FileCheckpointStore, Watermark,
};
use crate::classify::{classify, render_comment, status_message, Status};
use crate::config::Config;
use crate::error::Result;
use crate::harvest::{HarvestClient, TimeEntrySource};
use crate::labels::StatusLabels;
use crate::linear::{EstimateSource, IssueAnnotator, LinearClient};
use crate::models::TimeEntry;

/// Which entries are reconciled and which labels mark their status.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub labels: StatusLabels,
    pub tracked_service: String,
    pub issue_key_marker: String,
}

impl DriverSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            labels: config.labels.clone(),
            tracked_service: config.tracked_service.clone(),
            issue_key_marker: config.issue_key_marker.clone(),
        }
    }
}

/// Collaborators the driver talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn CheckpointStore>,
    pub entries: Arc<dyn TimeEntrySource>,
    pub estimates: Arc<dyn EstimateSource>,
    pub annotator: Arc<dyn IssueAnnotator>,
    pub aggregator: Arc<dyn Aggregator>,
}

/// Result of a single entry's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Annotated {
        status: Status,
        tracked: f64,
        delta: f64,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// Why an eligible entry produced no annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The tracker reported errors for the lookup or has no such issue.
    IssueUnavailable,
    /// The issue has no (or a zero) estimate.
    NoEstimate,
}

/// Entry whose pipeline failed part-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub entry_id: u64,
    pub issue_key: String,
    pub error: String,
}

/// What one pass did.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub previous_watermark: Watermark,
    pub watermark: Watermark,
    /// Entries returned for the window, before any filtering.
    pub fetched: usize,
    /// Entries linked to the tracked service.
    pub relevant: usize,
    /// Relevant entries whose issue key lacks the marker.
    pub ignored: usize,
    pub annotated: usize,
    pub skipped: usize,
    pub failures: Vec<EntryFailure>,
    /// Nothing relevant was fetched; the watermark was not touched.
    pub no_op: bool,
}

/// Orchestrates reconciliation passes.
pub struct RunDriver {
    settings: DriverSettings,
    deps: Collaborators,
}

impl RunDriver {
    #[must_use]
    pub fn new(settings: DriverSettings, deps: Collaborators) -> Self {
        Self { settings, deps }
    }

    /// Wire the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built from the credentials.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn CheckpointStore> =
            Arc::new(FileCheckpointStore::new(&config.checkpoint_path));
        let harvest: Arc<dyn TimeEntrySource> = Arc::new(HarvestClient::new(&config.harvest)?);
        let linear = Arc::new(LinearClient::new(&config.linear)?);
        let aggregator = build_aggregator(config.aggregation, harvest.clone(), store.clone());

        Ok(Self::new(
            DriverSettings::from_config(config),
            Collaborators {
                store,
                entries: harvest,
                estimates: linear.clone(),
                annotator: linear,
                aggregator,
            },
        ))
    }

    /// Run one pass with the current time as the first-run watermark.
    ///
    /// # Errors
    ///
    /// See [`RunDriver::run_at`].
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_at(Utc::now()).await
    }

    /// Run one pass; `now` initializes the watermark if none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint store fails or the entry window
    /// cannot be fetched. Per-entry failures are reported in the summary.
    #[instrument(skip(self), fields(aggregation = self.deps.aggregator.name()))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let previous = load_watermark(self.deps.store.as_ref(), now).await?;

        let fetched = self
            .deps
            .entries
            .updated_since(previous)
            .await
            .map_err(|e| {
                error!(watermark = %previous, error = %e, "Failed to fetch time entries");
                e
            })?;

        let relevant: Vec<(&TimeEntry, &str)> = fetched
            .iter()
            .filter_map(|entry| {
                entry
                    .issue_key_for(&self.settings.tracked_service)
                    .map(|key| (entry, key))
            })
            .collect();

        let mut summary = RunSummary {
            previous_watermark: previous,
            watermark: previous,
            fetched: fetched.len(),
            relevant: relevant.len(),
            ignored: 0,
            annotated: 0,
            skipped: 0,
            failures: Vec::new(),
            no_op: relevant.is_empty(),
        };

        if relevant.is_empty() {
            info!(watermark = %previous, fetched = fetched.len(), "No new time entries to process");
            return Ok(summary);
        }

        for (entry, issue_key) in relevant {
            if !issue_key.contains(self.settings.issue_key_marker.as_str()) {
                debug!(entry_id = entry.id, issue_key, "Issue key lacks marker, ignoring entry");
                summary.ignored += 1;
                continue;
            }

            match self.process_entry(entry, issue_key).await {
                Ok(EntryOutcome::Annotated { status, tracked, delta }) => {
                    info!(entry_id = entry.id, issue_key, %status, tracked, delta, "Annotated issue");
                    summary.annotated += 1;
                }
                Ok(EntryOutcome::Skipped { reason }) => {
                    warn!(entry_id = entry.id, issue_key, ?reason, "Skipped entry");
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!(entry_id = entry.id, issue_key, error = %e, "Failed to process time entry");
                    summary.failures.push(EntryFailure {
                        entry_id: entry.id,
                        issue_key: issue_key.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let next = previous.advance(fetched.iter().map(|e| e.updated_at));
        save_watermark(self.deps.store.as_ref(), next).await?;
        summary.watermark = next;

        info!(
            previous = %previous,
            watermark = %next,
            annotated = summary.annotated,
            skipped = summary.skipped,
            ignored = summary.ignored,
            failed = summary.failures.len(),
            "Time entries processed"
        );
        Ok(summary)
    }

    /// Estimate → aggregate → classify → reconcile labels → annotate → commit.
    async fn process_entry(&self, entry: &TimeEntry, issue_key: &str) -> Result<EntryOutcome> {
        let Some(snapshot) = self.deps.estimates.issue_snapshot(issue_key).await? else {
            return Ok(EntryOutcome::Skipped {
                reason: SkipReason::IssueUnavailable,
            });
        };
        let Some(estimate) = snapshot.usable_estimate() else {
            return Ok(EntryOutcome::Skipped {
                reason: SkipReason::NoEstimate,
            });
        };

        let tracked = self.deps.aggregator.tracked_hours(issue_key, entry).await?;
        let classification = classify(tracked, estimate);
        let message = status_message(tracked, estimate, classification);
        let comment = render_comment(&entry.user.name, &message, entry.notes_text());
        let labels = self
            .settings
            .labels
            .reconcile(&snapshot.label_ids, classification.status);

        self.deps
            .annotator
            .annotate(issue_key, &comment, &labels)
            .await?;
        self.deps.aggregator.commit(issue_key, tracked).await?;

        Ok(EntryOutcome::Annotated {
            status: classification.status,
            tracked,
            delta: classification.delta,
        })
    }
}
