//! Registry of fake installed models

use honeypot_core::{normalize_model_name, HoneypotResult, ModelRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::snapshot::SnapshotStore;

type ModelsMap = BTreeMap<String, ModelRecord>;

/// Concurrent store of model records keyed by normalized `name:tag`.
///
/// Records are replaced wholesale; the lock is only held for the map access,
/// never across snapshot I/O.
pub struct ModelRegistry {
    /// Records indexed by normalized name
    models: RwLock<ModelsMap>,
    /// Snapshot flushed after mutations, if attached
    snapshot: Option<Arc<dyn SnapshotStore>>,
    /// Serializes snapshot writes
    save_lock: Mutex<()>,
}

impl ModelRegistry {
    /// Create an empty in-memory registry
    pub fn new() -> Self {
        Self {
            models: RwLock::new(BTreeMap::new()),
            snapshot: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Create an empty registry that persists to `snapshot` on [`ModelRegistry::persist`]
    pub fn with_snapshot(snapshot: Arc<dyn SnapshotStore>) -> Self {
        Self {
            models: RwLock::new(BTreeMap::new()),
            snapshot: Some(snapshot),
            save_lock: Mutex::new(()),
        }
    }

    /// Look up a model
    pub async fn get(&self, key: &str) -> Option<ModelRecord> {
        let key = normalize_model_name(key);
        self.models.read().await.get(&key).cloned()
    }

    /// Check if a model is installed
    pub async fn contains(&self, key: &str) -> bool {
        let key = normalize_model_name(key);
        self.models.read().await.contains_key(&key)
    }

    /// Insert or replace a model
    pub async fn put(&self, key: &str, record: ModelRecord) {
        let key = normalize_model_name(key);
        if !record.is_consistent() {
            warn!(
                model = %key,
                size = record.size,
                layers_size = record.layers_size(),
                "Model size disagrees with its layers"
            );
        }
        self.models.write().await.insert(key.clone(), record);
        debug!(model = %key, "Stored model");
    }

    /// Remove a model; returns whether it was present
    pub async fn delete(&self, key: &str) -> bool {
        let key = normalize_model_name(key);
        let removed = self.models.write().await.remove(&key).is_some();
        if removed {
            info!(model = %key, "Removed model");
        }
        removed
    }

    /// All models, ordered by name
    pub async fn list(&self) -> Vec<ModelRecord> {
        self.models.read().await.values().cloned().collect()
    }

    /// Number of installed models
    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.models.read().await.is_empty()
    }

    /// Replace the contents with a snapshot.
    ///
    /// A missing snapshot is not an error: the registry starts empty and the
    /// empty state is written back immediately.
    pub async fn load_snapshot(&self, source: &dyn SnapshotStore) -> HoneypotResult<usize> {
        let Some(records) = source.load().await? else {
            self.models.write().await.clear();
            info!("No registry snapshot found, creating an empty one");
            source.save(&[]).await?;
            return Ok(0);
        };

        let mut models = BTreeMap::new();
        for mut record in records {
            let key = normalize_model_name(&record.name);
            if !record.is_consistent() {
                warn!(
                    model = %key,
                    size = record.size,
                    layers_size = record.layers_size(),
                    "Correcting model size from its layers"
                );
                record.size = record.layers_size();
            }
            record.name = key.clone();
            models.insert(key, record);
        }

        let count = models.len();
        *self.models.write().await = models;
        info!(models = count, "Loaded registry snapshot");
        Ok(count)
    }

    /// Write the current contents to a snapshot.
    ///
    /// Saves never overlap, and the contents are read after the previous save
    /// finished, so the last write always carries the newest state.
    pub async fn save_snapshot(&self, sink: &dyn SnapshotStore) -> HoneypotResult<()> {
        let _guard = self.save_lock.lock().await;
        let models = self.list().await;
        sink.save(&models).await
    }

    /// Load from the attached snapshot, if any
    pub async fn load(&self) -> HoneypotResult<usize> {
        match &self.snapshot {
            Some(snapshot) => self.load_snapshot(snapshot.as_ref()).await,
            None => Ok(0),
        }
    }

    /// Best-effort flush to the attached snapshot; failures are logged
    pub async fn persist(&self) {
        if let Some(snapshot) = &self.snapshot {
            if let Err(e) = self.save_snapshot(snapshot.as_ref()).await {
                warn!(error = %e, "Failed to save registry snapshot");
            }
        }
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
