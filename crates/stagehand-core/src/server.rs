use crate::config::{render, Config};
use crate::error::{Result, StagehandError};
use crate::runner::{Step, StepCommand};

/// The application server the orchestrator hands the process over to.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    cmd: StepCommand,
}

impl ServerCommand {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let cmd = StepCommand::from_argv(Step::Serve, render(&cfg.server.command, &cfg.template_vars()))?
            .with_env(cfg.child_env());
        Ok(Self { cmd })
    }

    pub fn command(&self) -> &StepCommand {
        &self.cmd
    }

    /// Replace the current process image with the server so it receives
    /// signals directly. Returns only if the replacement failed.
    ///
    /// Callers must have shut down their async runtime and pools first:
    /// nothing after this point runs on success.
    pub fn exec(self) -> StagehandError {
        let program = match which::which(&self.cmd.program) {
            Ok(p) => p,
            Err(_) => {
                return StagehandError::ToolNotFound {
                    step: Step::Serve,
                    program: self.cmd.program,
                }
            }
        };

        tracing::info!(command = %self.cmd.command_line(), "handing off to server");

        let mut command = std::process::Command::new(&program);
        command
            .args(&self.cmd.args)
            .envs(self.cmd.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let err = replace_process(command);
        StagehandError::Exec {
            program: self.cmd.program,
            message: err.to_string(),
        }
    }
}

#[cfg(unix)]
fn replace_process(mut command: std::process::Command) -> std::io::Error {
    use std::os::unix::process::CommandExt;
    command.exec()
}

#[cfg(not(unix))]
fn replace_process(mut command: std::process::Command) -> std::io::Error {
    // No exec(2): run the server as a child and mirror its exit code.
    match command.status() {
        Ok(status) => std::process::exit(crate::runner::exit_code(status)),
        Err(err) => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_binds_all_interfaces() {
        let server = ServerCommand::from_config(&Config::default()).unwrap();
        assert_eq!(
            server.command().command_line(),
            "uvicorn app.main:app --host 0.0.0.0 --port 8000"
        );
    }

    #[test]
    fn port_follows_config() {
        let mut cfg = Config::default();
        cfg.server.port = 9000;
        let server = ServerCommand::from_config(&cfg).unwrap();
        assert!(server.command().args.contains(&"9000".to_string()));
    }

    #[test]
    fn missing_server_binary_is_reported() {
        let mut cfg = Config::default();
        cfg.server.command = vec!["__stagehand_no_server__".into()];
        let err = ServerCommand::from_config(&cfg).unwrap().exec();
        assert!(matches!(err, StagehandError::ToolNotFound { step: Step::Serve, .. }));
    }
}
