use std::time::Duration;

use thiserror::Error;

use crate::runner::Step;

/// `EX_UNAVAILABLE` from sysexits.h.
pub const EXIT_UNAVAILABLE: i32 = 69;
/// `EX_CONFIG` from sysexits.h.
pub const EXIT_CONFIG: i32 = 78;
/// Shell convention for "command not found".
pub const EXIT_NOT_FOUND: i32 = 127;

#[derive(Debug, Error)]
pub enum StagehandError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("{step}: command is empty")]
    EmptyCommand { step: Step },

    #[error("{step}: '{program}' not found on PATH")]
    ToolNotFound { step: Step, program: String },

    #[error("{step}: failed to spawn '{program}': {message}")]
    SpawnFailed {
        step: Step,
        program: String,
        message: String,
    },

    #[error("{step} failed with exit code {code}{}", tail_suffix(.tail))]
    StepFailed { step: Step, code: i32, tail: String },

    #[error("database not ready after {attempts} attempts ({elapsed:?}): {last}")]
    NotReady {
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    #[error("seed script not found: {0}")]
    SeedScriptMissing(String),

    #[error("server hand-off failed for '{program}': {message}")]
    Exec { program: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("marker store error: {0}")]
    Marker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn tail_suffix(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

impl StagehandError {
    /// Process exit code the CLI should terminate with for this error.
    ///
    /// A failing step's own code is passed through untouched.
    pub fn exit_code(&self) -> i32 {
        match self {
            StagehandError::StepFailed { code, .. } => *code,
            StagehandError::ToolNotFound { .. } => EXIT_NOT_FOUND,
            StagehandError::NotReady { .. } => EXIT_UNAVAILABLE,
            StagehandError::InvalidConfig(_)
            | StagehandError::ConfigNotFound(_)
            | StagehandError::EmptyCommand { .. }
            | StagehandError::SeedScriptMissing(_)
            | StagehandError::Yaml(_) => EXIT_CONFIG,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, StagehandError>;
