//! Reconciles Harvest time entries against Linear issue estimates.
//!
//! Each pass loads a persisted watermark, fetches the time entries updated
//! since then, and for every entry linked to a tracked Linear issue:
//!
//! - totals the hours tracked against the issue
//! - compares the total with the issue's estimate (over / under / on track)
//! - swaps the issue's status label and posts a comment describing the entry
//!
//! The watermark then advances to the newest `updated_at` seen.
//!
//! # Architecture
//!
//! - [`TimeEntrySource`], [`EstimateSource`], [`IssueAnnotator`] and
//!   [`CheckpointStore`] are the seams to Harvest, Linear and durable state
//! - [`Aggregator`] selects between full recompute and a running total
//! - [`RunDriver`] performs a pass; [`server`] schedules passes

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)] // Many async API methods can fail

pub mod aggregate;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod harvest;
pub mod labels;
pub mod linear;
pub mod models;
pub mod server;

pub use aggregate::{Aggregator, RecomputeAggregator, RunningTotalAggregator};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, Watermark};
pub use classify::{classify, Classification, Status};
pub use config::{AggregationStrategy, Config};
pub use driver::{Collaborators, DriverSettings, EntryOutcome, RunDriver, RunSummary};
pub use error::{Result, SyncError};
pub use harvest::{HarvestClient, TimeEntrySource};
pub use labels::StatusLabels;
pub use linear::{EstimateSource, IssueAnnotator, LinearClient};
pub use models::{EntryUser, ExternalReference, IssueSnapshot, LabelId, TimeEntry};
