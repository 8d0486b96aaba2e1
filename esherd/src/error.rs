//! Error types shared by every agent

use thiserror::Error;

/// How the control loops treat an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inputs violate a precondition; reported, never retried
    Validation,
    /// Network or server-side failure; the next iteration retries
    Transient,
    /// Observed state contradicts an assumption; terminal for the message
    StateConflict,
    /// Setup failure; the process exits
    Fatal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("node stats sample {sample} does not match instance {instance}")]
    InconsistentNodes { sample: String, instance: String },

    #[error("invalid CloudWatch event: {0}")]
    InvalidCloudWatchEvent(String),

    #[error("unexpected event: {0}")]
    UnexpectedEvent(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("cloud API error: {0}")]
    Cloud(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tag}: {source}")]
    Context {
        tag: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap with a short cause tag, e.g. `"get settings"`
    pub fn context(self, tag: impl Into<String>) -> Self {
        Error::Context {
            tag: tag.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping any context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Error::InconsistentNodes { .. }
            | Error::InvalidCloudWatchEvent(_)
            | Error::UnexpectedEvent(_)
            | Error::Validation(_)
            | Error::Json(_) => ErrorKind::Validation,
            Error::Http(_) | Error::Remote { .. } | Error::Cloud(_) | Error::Timeout(_) => {
                ErrorKind::Transient
            }
            Error::StateConflict(_) => ErrorKind::StateConflict,
            Error::Config(_) | Error::Toml(_) | Error::Io(_) => ErrorKind::Fatal,
            Error::Context { .. } => unreachable!("root() never returns a context wrapper"),
        }
    }

    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self.root() {
            Error::InconsistentNodes { .. } => "inconsistent_nodes",
            Error::InvalidCloudWatchEvent(_) => "invalid_event",
            Error::UnexpectedEvent(_) => "unexpected_event",
            Error::Validation(_) => "validation",
            Error::Http(_) => "http",
            Error::Remote { .. } => "remote",
            Error::Cloud(_) => "cloud",
            Error::Timeout(_) => "timeout",
            Error::StateConflict(_) => "state_conflict",
            Error::Config(_) => "config",
            Error::Json(_) => "json",
            Error::Toml(_) => "toml",
            Error::Io(_) => "io",
            Error::Context { .. } => "context",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a cause tag to the error of a `Result`
pub trait ResultExt<T> {
    fn context(self, tag: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, tag: &str) -> Result<T> {
        self.map_err(|e| e.context(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_keeps_kind() {
        let err = Error::StateConflict("hook expired".into()).context("complete hook");
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.error_type(), "state_conflict");
        assert_eq!(err.to_string(), "complete hook: state conflict: hook expired");
    }

    #[test]
    fn test_remote_is_transient() {
        let err = Error::Remote {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_inconsistent_nodes_is_validation() {
        let err = Error::InconsistentNodes {
            sample: "i-a".into(),
            instance: "i-b".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
