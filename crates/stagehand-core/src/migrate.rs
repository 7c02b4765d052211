//! Migration directory inspection and the migration tool wrapper.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::config::{render, Config};
use crate::error::Result;
use crate::runner::{CommandRunner, Step, StepCommand};

// ---------------------------------------------------------------------------
// MigrationDir
// ---------------------------------------------------------------------------

/// The directory holding revision files.
#[derive(Debug, Clone)]
pub struct MigrationDir {
    path: PathBuf,
}

impl MigrationDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Revision file names, sorted. Hidden entries (`.gitkeep`) and dunder
    /// entries (`__pycache__`, `__init__.py`) are ignored; a missing directory
    /// has no revisions.
    pub fn revisions(&self) -> Result<Vec<String>> {
        if !self.path.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.starts_with("__") {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.revisions()?.is_empty())
    }
}

// ---------------------------------------------------------------------------
// MigrationTool
// ---------------------------------------------------------------------------

pub struct MigrationTool {
    runner: Arc<dyn CommandRunner>,
    generate: StepCommand,
    upgrade: StepCommand,
    dir: MigrationDir,
}

impl MigrationTool {
    pub fn from_config(cfg: &Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let vars = cfg.template_vars();
        let env = cfg.child_env();
        let generate = StepCommand::from_argv(
            Step::GenerateRevision,
            render(&cfg.migrations.generate, &vars),
        )?
        .with_env(env.clone());
        let upgrade = StepCommand::from_argv(Step::Upgrade, render(&cfg.migrations.upgrade, &vars))?
            .with_env(env);
        Ok(Self {
            runner,
            generate,
            upgrade,
            dir: MigrationDir::new(&cfg.migrations.dir),
        })
    }

    pub fn dir(&self) -> &MigrationDir {
        &self.dir
    }

    /// Autogenerate a revision by diffing the models against the live schema.
    ///
    /// Returns the new revision id when it can be determined from the tool's
    /// output or from the file that appeared in the migrations directory.
    pub async fn generate_revision(&self) -> Result<Option<String>> {
        let before = self.dir.revisions()?;
        tracing::info!(command = %self.generate.command_line(), "generating initial revision");
        let output = self.runner.run(Step::GenerateRevision, &self.generate).await?;

        let revision = parse_revision(output.stdout.iter().chain(output.stderr.iter()))
            .or_else(|| {
                let after = self.dir.revisions().ok()?;
                after
                    .into_iter()
                    .find(|name| !before.contains(name))
                    .map(|name| revision_from_file(&name))
            });
        match &revision {
            Some(rev) => tracing::info!(revision = %rev, "revision generated"),
            None => tracing::warn!("revision generated but its id could not be determined"),
        }
        Ok(revision)
    }

    /// Apply every pending migration. Idempotent when already at head.
    pub async fn upgrade_to_latest(&self) -> Result<()> {
        tracing::info!(command = %self.upgrade.command_line(), "upgrading schema to latest");
        let output = self.runner.run(Step::Upgrade, &self.upgrade).await?;
        tracing::info!(elapsed_ms = output.duration.as_millis() as u64, "schema is current");
        Ok(())
    }
}

static GENERATING_RE: OnceLock<Regex> = OnceLock::new();

fn generating_re() -> &'static Regex {
    GENERATING_RE.get_or_init(|| Regex::new(r"Generating\s+(\S+\.py)").unwrap())
}

/// Pull the revision id out of migration-tool output such as
/// `Generating /app/migrations/versions/1a2b3c4d_initial_migration.py ...  done`.
fn parse_revision<'a>(lines: impl Iterator<Item = &'a String>) -> Option<String> {
    lines
        .filter_map(|line| generating_re().captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            let path = Path::new(m.as_str());
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| m.as_str().to_string());
            revision_from_file(&name)
        })
        .next()
}

fn revision_from_file(name: &str) -> String {
    let stem = name.strip_suffix(".py").unwrap_or(name);
    stem.split('_').next().unwrap_or(stem).to_string()
}
