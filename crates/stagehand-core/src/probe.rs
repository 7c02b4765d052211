//! Database readiness: a single-attempt probe and the wait loop around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::error::{Result, StagehandError};
use crate::runner::{CommandRunner, Step, StepCommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ready,
    NotReady(String),
}

#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Human-readable target, for logs.
    fn describe(&self) -> String;

    /// One attempt. `Err` is reserved for conditions retrying cannot fix,
    /// such as the probe tool being absent.
    async fn check(&self) -> Result<ProbeOutcome>;
}

// ---------------------------------------------------------------------------
// CommandProbe
// ---------------------------------------------------------------------------

/// Readiness via an external command such as `pg_isready`: exit 0 means ready.
pub struct CommandProbe {
    runner: Arc<dyn CommandRunner>,
    cmd: StepCommand,
    attempt_timeout: Duration,
}

impl CommandProbe {
    pub fn new(runner: Arc<dyn CommandRunner>, cmd: StepCommand, attempt_timeout: Duration) -> Self {
        Self {
            runner,
            cmd,
            attempt_timeout,
        }
    }
}

#[async_trait]
impl ReadinessProbe for CommandProbe {
    fn describe(&self) -> String {
        self.cmd.command_line()
    }

    async fn check(&self) -> Result<ProbeOutcome> {
        let attempt = self.runner.run(Step::Probe, &self.cmd);
        match tokio::time::timeout(self.attempt_timeout, attempt).await {
            Err(_) => Ok(ProbeOutcome::NotReady(format!(
                "probe timed out after {:?}",
                self.attempt_timeout
            ))),
            Ok(Ok(_)) => Ok(ProbeOutcome::Ready),
            Ok(Err(StagehandError::StepFailed { code, tail, .. })) => {
                let reason = if tail.is_empty() {
                    format!("exit code {code}")
                } else {
                    tail
                };
                Ok(ProbeOutcome::NotReady(reason))
            }
            Ok(Err(e)) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Wait loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitReport {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Probe until ready, sleeping per `backoff` between attempts.
///
/// Without a deadline this blocks until the probe succeeds. With one, the
/// last sleep is shortened so a final attempt lands on the deadline, and a
/// failure at or past the deadline returns [`StagehandError::NotReady`].
pub async fn wait_for_ready(probe: &dyn ReadinessProbe, backoff: &Backoff) -> Result<WaitReport> {
    let start = Instant::now();
    let mut attempts = 0u32;
    tracing::info!(target_db = %probe.describe(), "waiting for database");

    loop {
        attempts += 1;
        let reason = match probe.check().await? {
            ProbeOutcome::Ready => {
                let elapsed = start.elapsed();
                tracing::info!(attempts, elapsed_ms = elapsed.as_millis() as u64, "database is ready");
                return Ok(WaitReport { attempts, elapsed });
            }
            ProbeOutcome::NotReady(reason) => reason,
        };

        let elapsed = start.elapsed();
        let mut delay = backoff.delay(attempts);
        if let Some(deadline) = backoff.deadline() {
            if elapsed >= deadline {
                return Err(StagehandError::NotReady {
                    attempts,
                    elapsed,
                    last: reason,
                });
            }
            delay = delay.min(deadline - elapsed);
        }

        tracing::info!(
            attempt = attempts,
            retry_in_ms = delay.as_millis() as u64,
            %reason,
            "database not ready"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::SystemRunner;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProbe {
        ready_after: u32,
        calls: AtomicU32,
    }

    impl FlakyProbe {
        fn new(ready_after: u32) -> Self {
            Self {
                ready_after,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ReadinessProbe for FlakyProbe {
        fn describe(&self) -> String {
            "flaky".into()
        }

        async fn check(&self) -> Result<ProbeOutcome> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.ready_after {
                Ok(ProbeOutcome::Ready)
            } else {
                Ok(ProbeOutcome::NotReady("connection refused".into()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_ready() {
        let probe = FlakyProbe::new(4);
        let backoff = Backoff::fixed(Duration::from_secs(2));
        let report = wait_for_ready(&probe, &backoff).await.unwrap();
        assert_eq!(report.attempts, 4);
        assert_eq!(report.elapsed, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_attempt_does_not_sleep() {
        let probe = FlakyProbe::new(1);
        let backoff = Backoff::fixed(Duration::from_secs(2));
        let report = wait_for_ready(&probe, &backoff).await.unwrap();
        assert_eq!(report.attempts, 1);
        assert_eq!(report.elapsed, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_the_wait() {
        let probe = FlakyProbe::new(u32::MAX);
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
            .with_deadline(Some(Duration::from_secs(10)));

        let err = wait_for_ready(&probe, &backoff).await.unwrap_err();
        match err {
            // attempts at t = 0, 1, 3, 7, 10
            StagehandError::NotReady {
                attempts,
                elapsed,
                last,
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(elapsed, Duration::from_secs(10));
                assert_eq!(last, "connection refused");
            }
            other => panic!("expected NotReady, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_deadline_keeps_polling() {
        let probe = FlakyProbe::new(200);
        let backoff = Backoff::fixed(Duration::from_secs(2));
        let report = wait_for_ready(&probe, &backoff).await.unwrap();
        assert_eq!(report.attempts, 200);
    }

    fn command_probe(argv: &[&str]) -> CommandProbe {
        let cmd = StepCommand::from_argv(
            Step::Probe,
            argv.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap();
        CommandProbe::new(Arc::new(SystemRunner), cmd, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn command_probe_success_is_ready() {
        let probe = command_probe(&["true"]);
        assert_eq!(probe.check().await.unwrap(), ProbeOutcome::Ready);
    }

    #[tokio::test]
    async fn command_probe_failure_is_not_ready() {
        let probe = command_probe(&["sh", "-c", "echo 'db:5432 - no response'; exit 2"]);
        assert_eq!(
            probe.check().await.unwrap(),
            ProbeOutcome::NotReady("db:5432 - no response".into())
        );
    }

    #[tokio::test]
    async fn command_probe_missing_tool_is_fatal() {
        let probe = command_probe(&["__no_such_pg_isready__"]);
        assert!(matches!(
            probe.check().await,
            Err(StagehandError::ToolNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn command_probe_hang_counts_as_not_ready() {
        let cmd = StepCommand::from_argv(
            Step::Probe,
            vec!["sleep".into(), "10".into()],
        )
        .unwrap();
        let probe = CommandProbe::new(Arc::new(SystemRunner), cmd, Duration::from_millis(100));
        assert!(matches!(
            probe.check().await.unwrap(),
            ProbeOutcome::NotReady(_)
        ));
    }
}
