//! Persisted progress: the global watermark and per-issue running totals.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Result, SyncError};

/// Key under which the watermark is stored.
pub const WATERMARK_KEY: &str = "lastProcessedTimestamp";

/// Key prefix for running totals (running-total aggregation only).
pub const TRACKED_TIME_PREFIX: &str = "tracked_time:";

/// Key holding the running total for `issue_key`.
#[must_use]
pub fn tracked_time_key(issue_key: &str) -> String {
    format!("{TRACKED_TIME_PREFIX}{issue_key}")
}

/// Durable string key/value store.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Point in the time entry update stream up to which entries were processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    #[must_use]
    pub const fn at(self) -> DateTime<Utc> {
        self.0
    }

    /// Advance to the latest of `self` and `timestamps`; never moves backwards.
    #[must_use]
    pub fn advance<I>(self, timestamps: I) -> Self
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        timestamps
            .into_iter()
            .map(Self)
            .fold(self, std::cmp::max)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

impl Serialize for Watermark {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl FromStr for Watermark {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| SyncError::InvalidWatermark {
                value: s.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Load the watermark, initializing it to `now` truncated to whole seconds
/// (and persisting that) when the store has never seen one.
///
/// # Errors
///
/// Returns an error if the store is unavailable or holds an unparsable value.
pub async fn load_watermark(store: &dyn CheckpointStore, now: DateTime<Utc>) -> Result<Watermark> {
    if let Some(raw) = store.get(WATERMARK_KEY).await? {
        return raw.parse();
    }

    let initial = Watermark::new(now.trunc_subsecs(0));
    debug!(watermark = %initial, "No watermark stored, starting from now");
    store.put(WATERMARK_KEY, &initial.to_string()).await?;
    Ok(initial)
}

/// Persist `watermark`.
///
/// # Errors
///
/// Returns an error if the store write fails.
pub async fn save_watermark(store: &dyn CheckpointStore, watermark: Watermark) -> Result<()> {
    store.put(WATERMARK_KEY, &watermark.to_string()).await
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, mainly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Copy of everything stored.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// Store backed by a single JSON object on disk.
///
/// Every `put` rewrites the file through a temporary sibling and a rename, so
/// a crash mid-write leaves the previous checkpoint intact.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCheckpointStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                SyncError::Checkpoint(format!(
                    "{} is not a valid checkpoint file: {e}",
                    self.path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(SyncError::Checkpoint(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let body = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values).await
    }
}
