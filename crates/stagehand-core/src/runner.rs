//! Subprocess invocation for the external collaborators: readiness command,
//! migration tool, seed loader.
//!
//! Every step goes through [`CommandRunner::run`]. The system runner streams
//! the child's stdout/stderr into the log line by line (tagged with the step)
//! and keeps the lines so callers can parse them. A non-zero exit becomes
//! [`StagehandError::StepFailed`] carrying the child's own exit code.

use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, StagehandError};

const TAIL_LINES: usize = 5;
const TAIL_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Probe,
    GenerateRevision,
    Upgrade,
    Seed,
    Serve,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Probe => "probe",
            Step::GenerateRevision => "generate revision",
            Step::Upgrade => "upgrade",
            Step::Seed => "seed",
            Step::Serve => "serve",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepCommand / StepOutput
// ---------------------------------------------------------------------------

/// A fully rendered command line plus extra environment.
#[derive(Debug, Clone, PartialEq)]
pub struct StepCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl StepCommand {
    pub fn from_argv(step: Step, argv: Vec<String>) -> Result<Self> {
        let mut iter = argv.into_iter();
        let program = iter
            .next()
            .filter(|p| !p.trim().is_empty())
            .ok_or(StagehandError::EmptyCommand { step })?;
        Ok(Self {
            program,
            args: iter.collect(),
            env: Vec::new(),
        })
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub duration: Duration,
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion. Non-zero exit is an error.
    async fn run(&self, step: Step, cmd: &StepCommand) -> Result<StepOutput>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, step: Step, cmd: &StepCommand) -> Result<StepOutput> {
        let program = which::which(&cmd.program).map_err(|_| StagehandError::ToolNotFound {
            step,
            program: cmd.program.clone(),
        })?;

        let start = Instant::now();
        let mut child = Command::new(&program)
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StagehandError::SpawnFailed {
                step,
                program: cmd.program.clone(),
                message: e.to_string(),
            })?;

        // Readiness attempts are expected to fail for a while; keep them out
        // of the default log level.
        let quiet = step == Step::Probe;

        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut collected = Vec::new();
            if let Some(out) = stdout {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    forward(step, quiet, "stdout", &line);
                    collected.push(line);
                }
            }
            collected
        });

        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut collected = Vec::new();
            if let Some(err) = stderr {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    forward(step, quiet, "stderr", &line);
                    collected.push(line);
                }
            }
            collected
        });

        let status = child.wait().await?;
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let output = StepOutput {
            stdout,
            stderr,
            duration: start.elapsed(),
        };

        if status.success() {
            Ok(output)
        } else {
            Err(StagehandError::StepFailed {
                step,
                code: exit_code(status),
                tail: tail(&output),
            })
        }
    }
}

fn forward(step: Step, quiet: bool, stream: &'static str, line: &str) {
    if quiet {
        tracing::debug!(step = %step, stream, "{line}");
    } else {
        tracing::info!(step = %step, stream, "{line}");
    }
}

/// Exit code of a finished child; a signal death maps to `128 + signal`.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

fn tail(output: &StepOutput) -> String {
    let source = if output.stderr.is_empty() {
        &output.stdout
    } else {
        &output.stderr
    };
    let start = source.len().saturating_sub(TAIL_LINES);
    let joined = source[start..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    joined.chars().take(TAIL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> StepCommand {
        StepCommand::from_argv(
            Step::Upgrade,
            vec!["sh".into(), "-c".into(), script.into()],
        )
        .unwrap()
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = StepCommand::from_argv(Step::Seed, vec![]).unwrap_err();
        assert!(matches!(err, StagehandError::EmptyCommand { step: Step::Seed }));
        let err = StepCommand::from_argv(Step::Seed, vec!["  ".into()]).unwrap_err();
        assert!(matches!(err, StagehandError::EmptyCommand { .. }));
    }

    #[test]
    fn command_line_joins_args() {
        let cmd = StepCommand::from_argv(
            Step::Upgrade,
            vec!["alembic".into(), "upgrade".into(), "head".into()],
        )
        .unwrap();
        assert_eq!(cmd.command_line(), "alembic upgrade head");
    }

    #[test]
    fn step_names_are_stable() {
        assert_eq!(Step::GenerateRevision.to_string(), "generate revision");
        assert_eq!(Step::Upgrade.as_str(), "upgrade");
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = SystemRunner
            .run(Step::Upgrade, &sh("echo one; echo two >&2"))
            .await
            .unwrap();
        assert_eq!(out.stdout, vec!["one"]);
        assert_eq!(out.stderr, vec!["two"]);
    }

    #[tokio::test]
    async fn nonzero_exit_propagates_code_and_tail() {
        let err = SystemRunner
            .run(Step::Upgrade, &sh("echo 'target database is not up to date' >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            StagehandError::StepFailed { step, code, tail } => {
                assert_eq!(step, Step::Upgrade);
                assert_eq!(code, 3);
                assert_eq!(tail, "target database is not up to date");
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn env_reaches_child() {
        let cmd = sh("echo \"$PGDATABASE\"")
            .with_env(vec![("PGDATABASE".into(), "movies".into())]);
        let out = SystemRunner.run(Step::Seed, &cmd).await.unwrap();
        assert_eq!(out.stdout, vec!["movies"]);
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let cmd = StepCommand::from_argv(
            Step::Probe,
            vec!["__stagehand_missing_tool__".into()],
        )
        .unwrap();
        let err = SystemRunner.run(Step::Probe, &cmd).await.unwrap_err();
        assert!(
            matches!(err, StagehandError::ToolNotFound { ref program, .. } if program == "__stagehand_missing_tool__"),
            "got {err:?}"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_maps_above_128() {
        let err = SystemRunner
            .run(Step::Upgrade, &sh("kill -9 $$"))
            .await
            .unwrap_err();
        assert!(matches!(err, StagehandError::StepFailed { code: 137, .. }), "got {err:?}");
    }
}
