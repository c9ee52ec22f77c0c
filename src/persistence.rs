//! Snapshot persistence
//!
//! The whole metric store is saved as one JSON blob under a single key.
//! Maps are written as arrays of `[key, value]` pairs. Loading never fails
//! startup: a missing, unreadable or malformed blob leaves the engine empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{EngineConfig, PersistenceConfig, StoreBackend};
use crate::error::{Error, Result};
use crate::ranking::scoring::{self, ScoringWeights};
use crate::ranking::{ContentMetric, MetricStore, RankingEngine, UserBehavior};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Key-value blob storage for snapshots
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Read a blob, `None` if the key has never been written
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a blob, replacing any previous value
    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}

// ============================================================================
// Adapters
// ============================================================================

/// Process-local blobs, for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryAdapter {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        self.blobs.lock().insert(key.to_string(), blob);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// One file per key under a directory. Writes go to a temp file and are
/// renamed into place so a crash mid-save never truncates the last snapshot.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    dir: PathBuf,
}

impl FileAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl PersistenceAdapter for FileAdapter {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence_with_source(
                format!("failed to read snapshot '{}'", key),
                e,
            )),
        }
    }

    async fn write(&self, key: &str, blob: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await.map_err(|e| {
            Error::persistence_with_source(format!("failed to write snapshot '{}'", key), e)
        })?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// Snapshot format
// ============================================================================

/// Serialized form of the metric store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub user_behavior: Vec<(String, UserBehavior)>,
    pub content_metrics: Vec<(String, ContentMetric)>,
    pub user_interests: Vec<(String, Vec<String>)>,
    pub user_history: Vec<(String, Vec<String>)>,
    #[serde(default)]
    pub weights: Option<ScoringWeights>,
}

impl Snapshot {
    /// Capture the store. Entries are sorted by key so equal stores encode
    /// to equal blobs.
    pub fn capture(store: &MetricStore, weights: &ScoringWeights, now: DateTime<Utc>) -> Self {
        let mut user_behavior: Vec<_> = store
            .behaviors()
            .map(|b| (b.user_id.clone(), b.clone()))
            .collect();
        user_behavior.sort_by(|a, b| a.0.cmp(&b.0));

        let mut content_metrics: Vec<_> = store
            .contents()
            .map(|c| (c.content_id.clone(), c.clone()))
            .collect();
        content_metrics.sort_by(|a, b| a.0.cmp(&b.0));

        let mut user_interests: Vec<_> = store
            .all_interests()
            .map(|(user, tags)| (user.clone(), tags.iter().cloned().collect()))
            .collect();
        user_interests.sort_by(|a, b| a.0.cmp(&b.0));

        let mut user_history: Vec<_> = store
            .all_history()
            .map(|(user, ids)| (user.clone(), ids.iter().cloned().collect()))
            .collect();
        user_history.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            user_behavior,
            content_metrics,
            user_interests,
            user_history,
            weights: Some(*weights),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(Error::invalid_snapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }
        Ok(snapshot)
    }

    /// Rebuild a store, enforcing the current caps and recomputing every
    /// derived field. Weights that do not normalize are dropped.
    pub fn restore(
        self,
        config: &EngineConfig,
        now: DateTime<Utc>,
    ) -> (MetricStore, Option<ScoringWeights>) {
        let mut store = MetricStore::new();

        for (user_id, mut behavior) in self.user_behavior {
            behavior.user_id = user_id;
            store.insert_behavior(behavior);
        }

        for (content_id, mut metric) in self.content_metrics {
            metric.content_id = content_id;
            if let Err(e) = scoring::refresh_derived(&mut metric, now, config.recency_half_life) {
                warn!(content_id = %metric.content_id, "Restored metric not recomputed: {}", e);
            }
            store.insert_content(metric);
        }

        for (user_id, tags) in self.user_interests {
            let interests: BTreeSet<String> =
                tags.into_iter().take(config.max_interests).collect();
            store.insert_interests(user_id, interests);
        }

        for (user_id, ids) in self.user_history {
            let history: VecDeque<String> = ids.into_iter().take(config.history_cap).collect();
            store.insert_history(user_id, history);
        }

        let weights = self.weights.and_then(|w| {
            let normalized = w.normalized();
            if normalized.is_none() {
                warn!(?w, "Ignoring persisted weights that do not normalize");
            }
            normalized
        });

        (store, weights)
    }
}

// ============================================================================
// Snapshot store
// ============================================================================

/// Result of loading a snapshot at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored { users: usize, content: usize },
    Missing,
    Malformed,
    Unavailable,
}

/// Saves and loads the engine state under one key
#[derive(Clone)]
pub struct SnapshotStore {
    adapter: Arc<dyn PersistenceAdapter>,
    key: String,
}

impl SnapshotStore {
    pub fn new(adapter: Arc<dyn PersistenceAdapter>, key: impl Into<String>) -> Self {
        Self {
            adapter,
            key: key.into(),
        }
    }

    pub fn from_config(config: &PersistenceConfig) -> Self {
        let adapter: Arc<dyn PersistenceAdapter> = match config.backend {
            StoreBackend::File => Arc::new(FileAdapter::new(&config.dir)),
            StoreBackend::Memory => Arc::new(MemoryAdapter::new()),
        };
        Self::new(adapter, config.snapshot_key.clone())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Serialize the engine state and write it. Returns the blob size.
    pub async fn save(&self, engine: &RankingEngine) -> Result<usize> {
        let snapshot = engine.with_snapshot(|store, weights| {
            Snapshot::capture(store, weights, Utc::now())
        });
        let bytes = snapshot.to_bytes()?;
        let size = bytes.len();
        self.adapter.write(&self.key, bytes).await?;

        info!(
            backend = self.adapter.name(),
            key = %self.key,
            users = snapshot.user_behavior.len(),
            content = snapshot.content_metrics.len(),
            bytes = size,
            "Snapshot saved"
        );
        Ok(size)
    }

    /// Read and decode the stored snapshot, `None` if nothing was saved yet
    pub async fn fetch(&self) -> Result<Option<Snapshot>> {
        match self.adapter.read(&self.key).await? {
            Some(bytes) => Snapshot::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Load state into the engine. Never fails: anything unusable leaves the
    /// engine untouched.
    pub async fn load(&self, engine: &RankingEngine) -> LoadOutcome {
        let snapshot = match self.fetch().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(key = %self.key, "No snapshot found, starting empty");
                return LoadOutcome::Missing;
            }
            Err(e) if e.is_malformed_snapshot() => {
                warn!(key = %self.key, "Malformed snapshot, starting empty: {}", e);
                return LoadOutcome::Malformed;
            }
            Err(e) => {
                warn!(key = %self.key, "Snapshot unavailable, starting empty: {}", e);
                return LoadOutcome::Unavailable;
            }
        };

        let (store, weights) = snapshot.restore(engine.config(), Utc::now());
        let outcome = LoadOutcome::Restored {
            users: store.user_count(),
            content: store.content_count(),
        };
        engine.replace_state(store, weights);

        info!(key = %self.key, ?outcome, "Snapshot restored");
        outcome
    }
}
