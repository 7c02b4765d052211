use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{render, Config};
use crate::error::{Result, StagehandError};
use crate::runner::{CommandRunner, Step, StepCommand};

/// Loads initial rows by running the seed script through a database client.
pub struct Seeder {
    runner: Arc<dyn CommandRunner>,
    job: Option<(PathBuf, StepCommand)>,
}

impl Seeder {
    pub fn from_config(cfg: &Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let job = match &cfg.seed.script {
            None => None,
            Some(script) => {
                let cmd = StepCommand::from_argv(
                    Step::Seed,
                    render(&cfg.seed.command, &cfg.template_vars()),
                )?
                .with_env(cfg.child_env());
                Some((script.clone(), cmd))
            }
        };
        Ok(Self { runner, job })
    }

    pub fn is_configured(&self) -> bool {
        self.job.is_some()
    }

    /// Run the seed script. Returns false when no script is configured.
    pub async fn run(&self) -> Result<bool> {
        let Some((script, cmd)) = &self.job else {
            tracing::info!("no seed script configured, skipping seed");
            return Ok(false);
        };
        if !script.is_file() {
            return Err(StagehandError::SeedScriptMissing(script.display().to_string()));
        }
        tracing::info!(script = %script.display(), "seeding database");
        let output = self.runner.run(Step::Seed, cmd).await?;
        tracing::info!(elapsed_ms = output.duration.as_millis() as u64, "seed complete");
        Ok(true)
    }
}
