use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PolicyViolation,
    GenericFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PolicyViolation => "policy-violation",
            FailureKind::GenericFailure => "failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{0}")]
    Validation(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("Checksum mismatch. Expected {expected} but got {actual}")]
    Integrity { expected: String, actual: String },
    #[error("invalid checksum manifest: {0}")]
    ChecksumManifest(String),
    #[error("installation failed: {0}")]
    Install(String),
    #[error("failed to launch pipeline-enforcer: {0}")]
    Launch(String),
    #[error("Timeout waiting for pipeline-enforcer to initialize ({0})")]
    Timeout(String),
    #[error("pipeline-enforcer reported an error ({0})")]
    Scan(String),
    #[error("pipeline-enforcer was not found at {0}; did the start step run?")]
    BinaryNotFound(String),
    #[error("{message}")]
    CommandFailure {
        kind: FailureKind,
        exit_code: i32,
        message: String,
    },
    #[error("settings error: {0}")]
    Settings(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ActionError {
    /// Process exit code for this error. Command failures mirror the tool's own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ActionError::CommandFailure { exit_code, .. } => *exit_code,
            _ => 1,
        }
    }

    pub fn result_label(&self) -> &'static str {
        match self {
            ActionError::CommandFailure { kind, .. } => kind.as_str(),
            _ => "failure",
        }
    }
}
