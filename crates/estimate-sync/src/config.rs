//! Configuration for the sync service.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, SyncError};
use crate::labels::StatusLabels;

const DEFAULT_HARVEST_API_URL: &str = "https://api.harvestapp.com/v2";
const DEFAULT_LINEAR_API_URL: &str = "https://api.linear.app/graphql";

/// Which aggregation strategy computes an issue's tracked hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationStrategy {
    /// Re-sum every entry recorded against the issue on each pass.
    #[default]
    Recompute,
    /// Add each entry to a total persisted in the checkpoint store.
    RunningTotal,
}

impl FromStr for AggregationStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "recompute" | "full" => Ok(Self::Recompute),
            "running-total" | "running_total" | "incremental" => Ok(Self::RunningTotal),
            other => Err(SyncError::Config(format!(
                "unknown aggregation strategy '{other}' (expected recompute or running-total)"
            ))),
        }
    }
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recompute => write!(f, "recompute"),
            Self::RunningTotal => write!(f, "running-total"),
        }
    }
}

/// Harvest API credentials and endpoint.
#[derive(Clone)]
pub struct HarvestConfig {
    pub access_token: String,
    pub account_id: String,
    pub api_url: String,
    pub user_agent: String,
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("access_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Linear API credentials and endpoint.
#[derive(Clone)]
pub struct LinearConfig {
    pub api_key: String,
    pub api_url: String,
}

impl fmt::Debug for LinearConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Full service configuration, loaded from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub harvest: HarvestConfig,
    pub linear: LinearConfig,
    /// Status labels applied to reconciled issues.
    pub labels: StatusLabels,
    /// `external_reference.service` value that marks Linear-linked entries.
    pub tracked_service: String,
    /// Substring an issue key must contain to be reconciled (e.g. a team key).
    pub issue_key_marker: String,
    pub aggregation: AggregationStrategy,
    pub checkpoint_path: PathBuf,
    pub interval_secs: u64,
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] when a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| SyncError::Config(format!("{key} not set")))
        };

        let aggregation: AggregationStrategy = get("AGGREGATION_STRATEGY")
            .map(|v| v.parse::<AggregationStrategy>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            harvest: HarvestConfig {
                access_token: required("HARVEST_ACCESS_TOKEN")?,
                account_id: required("HARVEST_ACCOUNT_ID")?,
                api_url: get("HARVEST_API_URL")
                    .unwrap_or_else(|| DEFAULT_HARVEST_API_URL.to_string()),
                user_agent: get("HARVEST_USER_AGENT")
                    .unwrap_or_else(|| "estimate-sync".to_string()),
            },
            linear: LinearConfig {
                api_key: required("LINEAR_API_KEY")?,
                api_url: get("LINEAR_API_URL")
                    .unwrap_or_else(|| DEFAULT_LINEAR_API_URL.to_string()),
            },
            labels: StatusLabels {
                over: required("LINEAR_LABEL_OVER")?,
                under: required("LINEAR_LABEL_UNDER")?,
                on_track: required("LINEAR_LABEL_ON_TRACK")?,
            },
            tracked_service: get("TRACKED_SERVICE").unwrap_or_else(|| "linear.app".to_string()),
            issue_key_marker: get("ISSUE_KEY_MARKER").unwrap_or_else(|| "WIL".to_string()),
            aggregation,
            checkpoint_path: get("CHECKPOINT_PATH")
                .map_or_else(|| PathBuf::from("estimate-sync-checkpoint.json"), PathBuf::from),
            interval_secs: parse_or("SYNC_INTERVAL_SECS", get("SYNC_INTERVAL_SECS"), 300)?,
            http_port: parse_or("HTTP_PORT", get("HTTP_PORT"), 8080)?,
        })
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SyncError::Config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}
