use serde::Serialize;

use crate::marker::BootstrapMarker;
use crate::orchestrator::Orchestrator;
use crate::probe::ProbeOutcome;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub database: DatabaseStatus,
    pub marker: MarkerStatus,
    pub migrations: MigrationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub target: String,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerStatus {
    pub backend: &'static str,
    pub bootstrapped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<BootstrapMarker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub dir: String,
    pub revisions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One-shot snapshot: a single probe attempt, no waiting, no mutation.
pub async fn collect(orchestrator: &Orchestrator) -> StatusReport {
    let probe = orchestrator.probe();
    let (ready, detail) = match probe.check().await {
        Ok(ProbeOutcome::Ready) => (true, None),
        Ok(ProbeOutcome::NotReady(reason)) => (false, Some(reason)),
        Err(e) => (false, Some(e.to_string())),
    };
    let database = DatabaseStatus {
        target: probe.describe(),
        ready,
        detail,
    };

    let markers = orchestrator.markers();
    let needs_db = markers.backend() == crate::config::MarkerBackend::Database;
    let marker = if needs_db && !ready {
        MarkerStatus {
            backend: markers.backend().as_str(),
            bootstrapped: None,
            record: None,
            error: Some("database not reachable".into()),
        }
    } else {
        match markers.load().await {
            Ok(record) => MarkerStatus {
                backend: markers.backend().as_str(),
                bootstrapped: Some(record.as_ref().is_some_and(|m| !m.pending)),
                record,
                error: None,
            },
            Err(e) => MarkerStatus {
                backend: markers.backend().as_str(),
                bootstrapped: None,
                record: None,
                error: Some(e.to_string()),
            },
        }
    };

    let dir = orchestrator.migrations().dir();
    let migrations = match dir.revisions() {
        Ok(revisions) => MigrationStatus {
            dir: dir.path().display().to_string(),
            revisions,
            error: None,
        },
        Err(e) => MigrationStatus {
            dir: dir.path().display().to_string(),
            revisions: Vec::new(),
            error: Some(e.to_string()),
        },
    };

    StatusReport {
        database,
        marker,
        migrations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, MarkerBackend};
    use crate::runner::SystemRunner;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config(dir: &TempDir, probe: &[&str]) -> Config {
        let mut cfg = Config::default();
        cfg.probe.command = probe.iter().map(|s| s.to_string()).collect();
        cfg.migrations.dir = dir.path().join("versions");
        cfg.bootstrap.marker = MarkerBackend::File;
        cfg.bootstrap.marker_file = dir.path().join("bootstrap.yaml");
        cfg.bootstrap.lock = false;
        cfg
    }

    #[tokio::test]
    async fn reports_fresh_deployment() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["true"]);
        let o = Orchestrator::from_config(&cfg, Arc::new(SystemRunner)).unwrap();

        let report = collect(&o).await;
        assert!(report.database.ready);
        assert_eq!(report.marker.backend, "file");
        assert_eq!(report.marker.bootstrapped, Some(false));
        assert!(report.migrations.revisions.is_empty());
    }

    #[tokio::test]
    async fn reports_unready_database_and_existing_revisions() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("versions")).unwrap();
        std::fs::write(dir.path().join("versions/ab12_initial.py"), "").unwrap();
        let cfg = config(&dir, &["sh", "-c", "echo 'no response'; exit 2"]);
        let o = Orchestrator::from_config(&cfg, Arc::new(SystemRunner)).unwrap();

        let report = collect(&o).await;
        assert!(!report.database.ready);
        assert_eq!(report.database.detail.as_deref(), Some("no response"));
        assert_eq!(report.migrations.revisions, vec!["ab12_initial.py"]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["database"]["ready"], false);
        assert_eq!(json["marker"]["bootstrapped"], false);
    }

    #[tokio::test]
    async fn pending_marker_is_not_bootstrapped() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, &["true"]);
        crate::io::atomic_write(
            &cfg.bootstrap.marker_file,
            serde_yaml::to_string(&BootstrapMarker::pending(uuid::Uuid::new_v4(), None))
                .unwrap()
                .as_bytes(),
        )
        .unwrap();
        let o = Orchestrator::from_config(&cfg, Arc::new(SystemRunner)).unwrap();

        let report = collect(&o).await;
        assert_eq!(report.marker.bootstrapped, Some(false));
        assert!(report.marker.record.unwrap().pending);
    }
}
