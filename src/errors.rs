use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Why a submission was turned away. Reported synchronously to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("already running")]
    Busy,
    #[error("worker unavailable")]
    WorkerUnavailable,
}

/// Failure of a single admitted job. Terminal for that job only.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to {action} stdin of {}: {source}", .program.display())]
    Pipe {
        action: &'static str,
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} exited with {status}{}", .program.display(), stderr_suffix(.stderr))]
    Execution {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },
    #[error("tactics document {}: {reason}", .path.display())]
    Tactics { path: PathBuf, reason: String },
}

impl JobError {
    pub(crate) fn filesystem(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        JobError::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
