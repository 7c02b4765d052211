//! The startup sequence: wait for the database, bootstrap on first run,
//! bring the schema to head. The server hand-off lives in [`crate::server`]
//! because it must happen after the async runtime is gone.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::config::{render, Config, MarkerBackend, ProbeMode};
use crate::db::{connect_options, lazy_pool, ConnectProbe, PgAdvisoryLock, PgMarkerStore};
use crate::error::Result;
use crate::lock::{BootstrapLock, NoLock};
use crate::marker::{BootstrapMarker, DirectoryMarkerStore, FileMarkerStore, MarkerStore};
use crate::migrate::{MigrationDir, MigrationTool};
use crate::probe::{wait_for_ready, CommandProbe, ReadinessProbe, WaitReport};
use crate::runner::{CommandRunner, Step, StepCommand};
use crate::seed::Seeder;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    AlreadyBootstrapped {
        revision: Option<String>,
    },
    Bootstrapped {
        revision: Option<String>,
        generated: bool,
        seeded: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepareReport {
    pub boot_id: Uuid,
    pub wait: WaitReport,
    pub bootstrap: BootstrapOutcome,
}

pub struct Orchestrator {
    boot_id: Uuid,
    probe: Box<dyn ReadinessProbe>,
    backoff: Backoff,
    migrations: MigrationTool,
    seeder: Seeder,
    markers: Box<dyn MarkerStore>,
    lock: Box<dyn BootstrapLock>,
    pool: Option<PgPool>,
}

impl Orchestrator {
    pub fn new(
        probe: Box<dyn ReadinessProbe>,
        backoff: Backoff,
        migrations: MigrationTool,
        seeder: Seeder,
        markers: Box<dyn MarkerStore>,
        lock: Box<dyn BootstrapLock>,
    ) -> Self {
        Self {
            boot_id: Uuid::new_v4(),
            probe,
            backoff,
            migrations,
            seeder,
            markers,
            lock,
            pool: None,
        }
    }

    /// Wire every collaborator from configuration.
    ///
    /// Must be called inside a tokio runtime: the database marker store
    /// builds a lazy pool. No connection is opened here.
    pub fn from_config(cfg: &Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        cfg.ensure_valid()?;

        let attempt_timeout = Duration::from_secs(cfg.probe.attempt_timeout_secs.max(1));
        let probe: Box<dyn ReadinessProbe> = match cfg.probe.mode {
            ProbeMode::Command => {
                let cmd = StepCommand::from_argv(
                    Step::Probe,
                    render(&cfg.probe.command, &cfg.template_vars()),
                )?
                .with_env(cfg.child_env());
                Box::new(CommandProbe::new(runner.clone(), cmd, attempt_timeout))
            }
            ProbeMode::Connect => Box::new(ConnectProbe::new(
                connect_options(&cfg.database)?,
                attempt_timeout,
            )),
        };

        let migrations = MigrationTool::from_config(cfg, runner.clone())?;
        let seeder = Seeder::from_config(cfg, runner)?;

        let mut pool = None;
        let (markers, lock): (Box<dyn MarkerStore>, Box<dyn BootstrapLock>) =
            match cfg.bootstrap.marker {
                MarkerBackend::Database => {
                    let options = connect_options(&cfg.database)?;
                    let db = lazy_pool(options.clone());
                    pool = Some(db.clone());
                    let lock: Box<dyn BootstrapLock> = if cfg.bootstrap.lock {
                        Box::new(PgAdvisoryLock::new(options, cfg.bootstrap.lock_key))
                    } else {
                        Box::new(NoLock)
                    };
                    (
                        Box::new(PgMarkerStore::new(
                            db,
                            cfg.bootstrap.marker_schema.clone(),
                            cfg.bootstrap.marker_table.clone(),
                        )?),
                        lock,
                    )
                }
                MarkerBackend::File => (
                    Box::new(FileMarkerStore::new(&cfg.bootstrap.marker_file)),
                    Box::new(NoLock),
                ),
                MarkerBackend::Directory => (
                    Box::new(DirectoryMarkerStore::new(MigrationDir::new(
                        &cfg.migrations.dir,
                    ))),
                    Box::new(NoLock),
                ),
            };

        let mut orchestrator = Self::new(
            probe,
            Backoff::from_config(&cfg.probe),
            migrations,
            seeder,
            markers,
            lock,
        );
        orchestrator.pool = pool;
        Ok(orchestrator)
    }

    pub fn boot_id(&self) -> Uuid {
        self.boot_id
    }

    pub fn probe(&self) -> &dyn ReadinessProbe {
        self.probe.as_ref()
    }

    pub fn markers(&self) -> &dyn MarkerStore {
        self.markers.as_ref()
    }

    pub fn migrations(&self) -> &MigrationTool {
        &self.migrations
    }

    pub async fn wait_for_database(&self) -> Result<WaitReport> {
        wait_for_ready(self.probe.as_ref(), &self.backoff).await
    }

    /// Run the first-run bootstrap unless a marker says it already happened.
    ///
    /// The marker is re-read under the lock so a replica that lost the race
    /// sees the winner's marker and skips.
    pub async fn bootstrap_if_needed(&self) -> Result<BootstrapOutcome> {
        self.lock.acquire().await?;
        let result = self.bootstrap_locked().await;
        let released = self.lock.release().await;
        let outcome = result?;
        released?;
        Ok(outcome)
    }

    /// Seeding happens only on a fresh deployment: one whose migrations
    /// directory was empty when bootstrap first ran. A pending marker carries
    /// that decision across a failed attempt.
    async fn bootstrap_locked(&self) -> Result<BootstrapOutcome> {
        let resumed = match self.markers.load().await? {
            Some(marker) if !marker.pending => {
                tracing::info!(
                    backend = self.markers.backend().as_str(),
                    revision = marker.revision.as_deref().unwrap_or("-"),
                    recorded_at = %marker.recorded_at,
                    "already bootstrapped, skipping first-run steps"
                );
                return Ok(BootstrapOutcome::AlreadyBootstrapped {
                    revision: marker.revision,
                });
            }
            Some(marker) => {
                tracing::info!(
                    started_by = %marker.boot_id,
                    "resuming an interrupted first-run bootstrap"
                );
                Some(marker)
            }
            None => None,
        };

        let generate = self.migrations.dir().is_empty()?;
        let fresh = generate || resumed.is_some();
        let mut revision = resumed.and_then(|m| m.revision);

        if generate {
            tracing::info!(
                backend = self.markers.backend().as_str(),
                "no bootstrap marker and no revisions, running first-run bootstrap"
            );
            self.markers
                .record(&BootstrapMarker::pending(self.boot_id, None))
                .await?;
            revision = self.migrations.generate_revision().await?;
            self.markers
                .record(&BootstrapMarker::pending(self.boot_id, revision.clone()))
                .await?;
        } else if !fresh {
            tracing::info!(
                dir = %self.migrations.dir().path().display(),
                "revisions present without a bootstrap marker; adopting deployment without seeding"
            );
        }

        self.migrations.upgrade_to_latest().await?;
        let seeded = if fresh { self.seeder.run().await? } else { false };

        let marker = BootstrapMarker::new(self.boot_id, revision.clone(), seeded);
        let written = self.markers.record(&marker).await?;
        if !written && self.markers.backend() != MarkerBackend::Directory {
            tracing::warn!("bootstrap marker already present; another instance recorded it first");
        }
        tracing::info!(generated = generate, seeded, "first-run bootstrap complete");

        Ok(BootstrapOutcome::Bootstrapped {
            revision,
            generated: generate,
            seeded,
        })
    }

    /// Apply pending migrations. Runs on every start.
    pub async fn sync_migrations(&self) -> Result<()> {
        self.migrations.upgrade_to_latest().await
    }

    /// Everything short of the server hand-off.
    pub async fn prepare(&self) -> Result<PrepareReport> {
        tracing::info!(boot_id = %self.boot_id, "startup sequence begins");
        let wait = self.wait_for_database().await?;
        let bootstrap = self.bootstrap_if_needed().await?;
        self.sync_migrations().await?;
        Ok(PrepareReport {
            boot_id: self.boot_id,
            wait,
            bootstrap,
        })
    }

    /// Close database connections before the process is replaced.
    pub async fn shutdown(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}
