//! Brief Handoff
//!
//! Carries the analysis result from the credit builder to the report view
//! through a small key/value store, without a server round trip. The report
//! view consumes the payload exactly once.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::api::SuitabilityPolygon;
use crate::error::WorkflowError;
use crate::params::ProjectType;

pub const POLYGONS_KEY: &str = "creditBuilderPolygons";
pub const PROJECT_TYPE_KEY: &str = "projectType";
pub const BUFFER_KM_KEY: &str = "bufferKm";

/// Used when the payload carries no buffer value.
pub const FALLBACK_BUFFER_KM: f64 = 25.0;

#[async_trait]
pub trait HandoffStore: Send + Sync {
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryHandoffStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryHandoffStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HandoffStore for MemoryHandoffStore {
    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}

/// Handoff store persisted as a flat JSON object on disk, so the report can be
/// opened by a separate process.
pub struct FileHandoffStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileHandoffStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(HashMap::new());
        }
        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read handoff file")?;
        let values = serde_json::from_str(&json).context("Failed to deserialize handoff file")?;
        Ok(values)
    }

    async fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(values).context("Failed to serialize handoff values")?;
        fs::write(&self.path, json)
            .await
            .context("Failed to write handoff file")?;
        Ok(())
    }
}

#[async_trait]
impl HandoffStore for FileHandoffStore {
    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value);
        self.save(&values).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}

/// What the report view needs besides the route parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BriefHandoff {
    /// The full ranked list, not only the selected sites.
    pub polygons: Vec<SuitabilityPolygon>,
    pub project_type: String,
    pub buffer_km: f64,
}

fn store_error(err: anyhow::Error) -> WorkflowError {
    WorkflowError::Store(format!("{:#}", err))
}

// A store that cannot be read back holds no usable payload
fn unreadable(err: anyhow::Error) -> WorkflowError {
    WorkflowError::MalformedHandoff(format!("{:#}", err))
}

pub async fn write_handoff(
    store: &dyn HandoffStore,
    polygons: &[SuitabilityPolygon],
    project_type: ProjectType,
    buffer_km: f64,
) -> Result<(), WorkflowError> {
    let polygons_json =
        serde_json::to_string(polygons).map_err(|e| WorkflowError::Store(e.to_string()))?;

    store.set(POLYGONS_KEY, polygons_json).await.map_err(store_error)?;
    store
        .set(PROJECT_TYPE_KEY, project_type.to_string())
        .await
        .map_err(store_error)?;
    store
        .set(BUFFER_KM_KEY, buffer_km.to_string())
        .await
        .map_err(store_error)?;

    debug!("Handoff written: {} polygons", polygons.len());
    Ok(())
}

/// Read and remove the handoff payload. A store that cannot be read is
/// reported as a malformed payload.
pub async fn take_handoff(store: &dyn HandoffStore) -> Result<BriefHandoff, WorkflowError> {
    let polygons_json = store
        .get(POLYGONS_KEY)
        .await
        .map_err(unreadable)?
        .ok_or(WorkflowError::MissingHandoff)?;

    let project_type = store
        .get(PROJECT_TYPE_KEY)
        .await
        .map_err(unreadable)?
        .unwrap_or_else(|| ProjectType::default().to_string());

    let buffer_km = match store.get(BUFFER_KM_KEY).await.map_err(unreadable)? {
        Some(raw) => raw.trim().parse::<f64>().unwrap_or_else(|_| {
            warn!("Unparseable handoff buffer '{}', using {}", raw, FALLBACK_BUFFER_KM);
            FALLBACK_BUFFER_KM
        }),
        None => FALLBACK_BUFFER_KM,
    };

    for key in [POLYGONS_KEY, PROJECT_TYPE_KEY, BUFFER_KM_KEY] {
        store.remove(key).await.map_err(store_error)?;
    }

    let polygons: Vec<SuitabilityPolygon> =
        serde_json::from_str(&polygons_json).map_err(|e| WorkflowError::MalformedHandoff(e.to_string()))?;

    Ok(BriefHandoff {
        polygons,
        project_type,
        buffer_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::polygon;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_then_take_once() {
        let store = MemoryHandoffStore::new();
        let polygons = vec![polygon("p1", 100.0), polygon("p2", 200.0)];
        write_handoff(&store, &polygons, ProjectType::Wetland, 15.0).await.unwrap();

        let handoff = take_handoff(&store).await.unwrap();
        assert_eq!(handoff.polygons, polygons);
        assert_eq!(handoff.project_type, "wetland");
        assert_eq!(handoff.buffer_km, 15.0);

        assert!(matches!(take_handoff(&store).await, Err(WorkflowError::MissingHandoff)));
    }

    #[tokio::test]
    async fn test_defaults_when_keys_missing() {
        let store = MemoryHandoffStore::new();
        store.set(POLYGONS_KEY, "[]".into()).await.unwrap();
        let handoff = take_handoff(&store).await.unwrap();
        assert_eq!(handoff.project_type, "reforestation");
        assert_eq!(handoff.buffer_km, FALLBACK_BUFFER_KM);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let store = MemoryHandoffStore::new();
        store.set(POLYGONS_KEY, "{not json".into()).await.unwrap();
        assert!(matches!(take_handoff(&store).await, Err(WorkflowError::MalformedHandoff(_))));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("handoff.json");

        let writer = FileHandoffStore::new(&path);
        write_handoff(&writer, &[polygon("p1", 10.0)], ProjectType::Grassland, 5.0)
            .await
            .unwrap();
        assert!(path.exists());

        let reader = FileHandoffStore::new(&path);
        let handoff = take_handoff(&reader).await.unwrap();
        assert_eq!(handoff.polygons.len(), 1);
        assert_eq!(reader.get(POLYGONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_malformed() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("handoff.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let store = FileHandoffStore::new(&path);
        let err = take_handoff(&store).await.unwrap_err();
        assert!(matches!(err, WorkflowError::MalformedHandoff(_)));
        assert!(err.to_string().contains("Failed to deserialize handoff file"));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = FileHandoffStore::new(temp_dir.path().join("absent.json"));
        assert_eq!(store.get(POLYGONS_KEY).await.unwrap(), None);
    }
}
