//! Data types shared by the sources and the run driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a label in the issue tracker.
pub type LabelId = String;

/// Time entry as returned by the Harvest v2 API.
///
/// Entries are read-only snapshots; nothing in this crate mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    pub hours: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub user: EntryUser,
    #[serde(default)]
    pub external_reference: Option<ExternalReference>,
}

impl TimeEntry {
    /// External reference id when the entry was logged against `service`.
    #[must_use]
    pub fn issue_key_for(&self, service: &str) -> Option<&str> {
        self.external_reference
            .as_ref()
            .filter(|r| r.service == service)
            .map(|r| r.id.as_str())
    }

    /// Notes text, empty when Harvest sent `null`.
    #[must_use]
    pub fn notes_text(&self) -> &str {
        self.notes.as_deref().unwrap_or_default()
    }
}

/// Author of a time entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryUser {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
}

/// Link from a time entry to a work item in another service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    pub id: String,
    pub service: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// Estimate and label state of a tracked issue, fetched per entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IssueSnapshot {
    pub estimate: Option<f64>,
    pub label_ids: Vec<LabelId>,
}

impl IssueSnapshot {
    /// Estimate usable for comparison; zero counts as "not estimated".
    #[must_use]
    pub fn usable_estimate(&self) -> Option<f64> {
        self.estimate.filter(|e| *e > 0.0)
    }
}
