//! Hours-vs-estimate comparison and comment rendering.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Outcome of comparing tracked hours with an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Over,
    Under,
    OnTrack,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Over => write!(f, "OVER"),
            Self::Under => write!(f, "UNDER"),
            Self::OnTrack => write!(f, "ON_TRACK"),
        }
    }
}

/// Status plus the absolute distance from the estimate, in hours.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub status: Status,
    pub delta: f64,
}

/// Round `value` half away from zero at two decimal places.
///
/// The scaled value is first snapped to a millionth so that binary noise
/// (`5.555 - 5.0 == 0.55499999...`) rounds the way its decimal form reads.
#[must_use]
pub fn round_hours(value: f64) -> f64 {
    let scaled = ((value * 100.0) * 1_000_000.0).round() / 1_000_000.0;
    scaled.round() / 100.0
}

/// Compare tracked hours against an estimate.
#[must_use]
pub fn classify(tracked: f64, estimate: f64) -> Classification {
    match tracked.partial_cmp(&estimate) {
        Some(Ordering::Greater) => Classification {
            status: Status::Over,
            delta: round_hours(tracked - estimate),
        },
        Some(Ordering::Less) => Classification {
            status: Status::Under,
            delta: round_hours(estimate - tracked),
        },
        _ => Classification {
            status: Status::OnTrack,
            delta: 0.0,
        },
    }
}

/// Status sentence for an issue. Tracked hours and delta are fixed to two
/// places; the estimate is printed as Linear returned it.
#[must_use]
pub fn status_message(tracked: f64, estimate: f64, classification: Classification) -> String {
    let delta = classification.delta;
    match classification.status {
        Status::Over => format!(
            "🔴 **Over**: {tracked:.2} hours tracked, which is {delta:.2} hours over the estimate of {estimate} hours."
        ),
        Status::Under => format!(
            "🟢 **Under**: {tracked:.2} hours tracked, which is {delta:.2} hours under the estimate of {estimate} hours."
        ),
        Status::OnTrack => format!(
            "🟡 **On Track**: {tracked:.2} hours tracked, which matches the estimate of {estimate} hours exactly."
        ),
    }
}

/// Full comment posted to the issue for one time entry.
#[must_use]
pub fn render_comment(author: &str, message: &str, notes: &str) -> String {
    format!("🕒 **Time Tracked** by {author}: {message} 📝 **Notes**: {notes}")
        .trim()
        .to_string()
}
