//! Registry snapshot persistence

use async_trait::async_trait;
use honeypot_core::{HoneypotError, HoneypotResult, ModelRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Source and sink for registry snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the stored models; `None` when no snapshot exists yet
    async fn load(&self) -> HoneypotResult<Option<Vec<ModelRecord>>>;

    /// Replace the stored snapshot
    async fn save(&self, models: &[ModelRecord]) -> HoneypotResult<()>;
}

/// On-disk document shape, shared with the `/api/tags` layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotDocument {
    #[serde(default)]
    models: Vec<ModelRecord>,
}

/// Snapshot kept as a pretty-printed JSON file
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    /// Create a snapshot store backed by `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(models: &[ModelRecord]) -> HoneypotResult<Vec<u8>> {
        let document = SnapshotDocument {
            models: models.to_vec(),
        };
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        document.serialize(&mut serializer)?;
        out.push(b'\n');
        Ok(out)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshot {
    async fn load(&self) -> HoneypotResult<Option<Vec<ModelRecord>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(HoneypotError::Snapshot(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let document: SnapshotDocument = serde_json::from_slice(&bytes).map_err(|e| {
            HoneypotError::Snapshot(format!("Failed to parse {}: {}", self.path.display(), e))
        })?;
        Ok(Some(document.models))
    }

    async fn save(&self, models: &[ModelRecord]) -> HoneypotResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let bytes = Self::encode(models)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            models = models.len(),
            "Wrote registry snapshot"
        );
        Ok(())
    }
}
