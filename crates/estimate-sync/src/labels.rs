//! Status label reconciliation.

use serde::{Deserialize, Serialize};

use crate::classify::Status;
use crate::models::LabelId;

/// Workspace label ids for the three mutually exclusive statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLabels {
    pub over: LabelId,
    pub under: LabelId,
    pub on_track: LabelId,
}

impl StatusLabels {
    /// Label id for `status`.
    #[must_use]
    pub fn label_for(&self, status: Status) -> &str {
        match status {
            Status::Over => &self.over,
            Status::Under => &self.under,
            Status::OnTrack => &self.on_track,
        }
    }

    /// Whether `label` is one of the three status labels.
    #[must_use]
    pub fn is_status_label(&self, label: &str) -> bool {
        label == self.over || label == self.under || label == self.on_track
    }

    /// Replace whatever status labels `current` carries with the one for
    /// `status`. Other labels keep their order; duplicates are dropped.
    #[must_use]
    pub fn reconcile(&self, current: &[LabelId], status: Status) -> Vec<LabelId> {
        let mut labels: Vec<LabelId> = Vec::with_capacity(current.len() + 1);
        for label in current {
            if !self.is_status_label(label) && !labels.contains(label) {
                labels.push(label.clone());
            }
        }
        labels.push(self.label_for(status).to_string());
        labels
    }
}
