//! Bootstrap marker: the record proving first-run bootstrap completed.
//!
//! Three stores exist. `database` keeps a single row next to the application
//! data, so it lives and dies with the data it describes. `file` keeps a YAML
//! document on a volume. `directory` infers the marker from the migrations
//! directory having revisions, which is how deployments without an explicit
//! marker behave.
//!
//! A marker is either pending or complete. A pending marker is written as soon
//! as a run decides the deployment is fresh, so a bootstrap interrupted after
//! generating its revision still seeds when it is resumed.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MarkerBackend;
use crate::error::{Result, StagehandError};
use crate::migrate::MigrationDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapMarker {
    pub boot_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub seeded: bool,
    /// Bootstrap started on a fresh deployment but has not finished.
    #[serde(default)]
    pub pending: bool,
    pub recorded_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl BootstrapMarker {
    /// A completed bootstrap.
    pub fn new(boot_id: Uuid, revision: Option<String>, seeded: bool) -> Self {
        Self {
            boot_id,
            revision,
            seeded,
            pending: false,
            recorded_at: Utc::now(),
            hostname: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
        }
    }

    pub fn pending(boot_id: Uuid, revision: Option<String>) -> Self {
        Self {
            pending: true,
            ..Self::new(boot_id, revision, false)
        }
    }
}

#[async_trait]
pub trait MarkerStore: Send + Sync {
    fn backend(&self) -> MarkerBackend;

    async fn load(&self) -> Result<Option<BootstrapMarker>>;

    /// Persist `marker` unless a complete one already exists; the first
    /// complete writer wins and pending markers may be overwritten.
    /// Returns true when this call wrote it.
    async fn record(&self, marker: &BootstrapMarker) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// FileMarkerStore
// ---------------------------------------------------------------------------

pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarkerStore for FileMarkerStore {
    fn backend(&self) -> MarkerBackend {
        MarkerBackend::File
    }

    async fn load(&self) -> Result<Option<BootstrapMarker>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        let marker = serde_yaml::from_str(&data).map_err(|e| {
            StagehandError::Marker(format!("{}: {e}", self.path.display()))
        })?;
        Ok(Some(marker))
    }

    async fn record(&self, marker: &BootstrapMarker) -> Result<bool> {
        if matches!(self.load().await?, Some(existing) if !existing.pending) {
            return Ok(false);
        }
        let data = serde_yaml::to_string(marker)?;
        crate::io::atomic_write(&self.path, data.as_bytes())?;
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// DirectoryMarkerStore
// ---------------------------------------------------------------------------

/// Treats a non-empty migrations directory as "already bootstrapped".
pub struct DirectoryMarkerStore {
    dir: MigrationDir,
}

impl DirectoryMarkerStore {
    pub fn new(dir: MigrationDir) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl MarkerStore for DirectoryMarkerStore {
    fn backend(&self) -> MarkerBackend {
        MarkerBackend::Directory
    }

    async fn load(&self) -> Result<Option<BootstrapMarker>> {
        let revisions = self.dir.revisions()?;
        let Some(latest) = revisions.last() else {
            return Ok(None);
        };
        let modified = std::fs::metadata(self.dir.path().join(latest))
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let revision = latest
            .strip_suffix(".py")
            .unwrap_or(latest)
            .split('_')
            .next()
            .map(str::to_string);
        Ok(Some(BootstrapMarker {
            boot_id: Uuid::nil(),
            revision,
            seeded: false,
            pending: false,
            recorded_at: modified,
            hostname: None,
        }))
    }

    async fn record(&self, _marker: &BootstrapMarker) -> Result<bool> {
        // The generated revision file is the record.
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileMarkerStore::new(dir.path().join("state/bootstrap.yaml"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_first_writer_wins() {
        let dir = TempDir::new().unwrap();
        let store = FileMarkerStore::new(dir.path().join("state/bootstrap.yaml"));

        let first = BootstrapMarker::new(Uuid::new_v4(), Some("1a2b".into()), true);
        let second = BootstrapMarker::new(Uuid::new_v4(), None, false);
        assert!(store.record(&first).await.unwrap());
        assert!(!store.record(&second).await.unwrap());

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.boot_id, first.boot_id);
        assert_eq!(loaded.revision.as_deref(), Some("1a2b"));
        assert!(loaded.seeded);
    }

    #[tokio::test]
    async fn file_store_completes_a_pending_marker() {
        let dir = TempDir::new().unwrap();
        let store = FileMarkerStore::new(dir.path().join("bootstrap.yaml"));

        let boot = Uuid::new_v4();
        assert!(store.record(&BootstrapMarker::pending(boot, None)).await.unwrap());
        assert!(store
            .record(&BootstrapMarker::pending(boot, Some("1a2b".into())))
            .await
            .unwrap());
        let loaded = store.load().await.unwrap().unwrap();
        assert!(loaded.pending);
        assert_eq!(loaded.revision.as_deref(), Some("1a2b"));

        let done = BootstrapMarker::new(Uuid::new_v4(), Some("1a2b".into()), true);
        assert!(store.record(&done).await.unwrap());
        assert!(!store
            .record(&BootstrapMarker::pending(boot, None))
            .await
            .unwrap());
        let loaded = store.load().await.unwrap().unwrap();
        assert!(!loaded.pending);
        assert_eq!(loaded.boot_id, done.boot_id);
    }

    #[tokio::test]
    async fn marker_files_without_pending_field_are_complete() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(
            &path,
            "boot_id: 9b0c7a52-3d0c-4c3e-9a55-1f1f1f1f1f1f\nseeded: true\nrecorded_at: 2026-01-05T10:00:00Z\n",
        )
        .unwrap();
        let marker = FileMarkerStore::new(&path).load().await.unwrap().unwrap();
        assert!(!marker.pending);
        assert!(marker.seeded);
    }

    #[tokio::test]
    async fn corrupt_marker_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bootstrap.yaml");
        std::fs::write(&path, "seeded: [not a bool").unwrap();
        let err = FileMarkerStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StagehandError::Marker(_)));
    }

    #[tokio::test]
    async fn directory_store_follows_revisions() {
        let dir = TempDir::new().unwrap();
        let store = DirectoryMarkerStore::new(MigrationDir::new(dir.path()));
        assert!(store.load().await.unwrap().is_none());

        std::fs::write(dir.path().join("9f8e7d_initial_migration.py"), "").unwrap();
        let marker = store.load().await.unwrap().unwrap();
        assert_eq!(marker.revision.as_deref(), Some("9f8e7d"));
        assert!(marker.boot_id.is_nil());

        let written = store
            .record(&BootstrapMarker::new(Uuid::new_v4(), None, true))
            .await
            .unwrap();
        assert!(!written);
    }
}
