//! Error types for the compute engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised deep
//! inside a computation step are never swallowed by the step: they travel up to
//! the [`StepExecutor`](crate::pipeline::StepExecutor), which wraps them in
//! [`CeError::Step`] and is the only place that turns them into a FAILED task.
//!
//! # Categories
//!
//! - `State`: programming or catalog defects (unknown metric, measure added
//!   twice, invalid rule parameter). Never retryable.
//! - `Configuration`: malformed settings or configuration files.
//! - `Report`: the submitted scanner report is inconsistent.
//! - `Storage`: the storage collaborator rejected a read or a write.
//! - `Queue`: illegal queue transition (cancel in progress task, submit while
//!   paused, ...).
//! - `Step`: a computation step failed; carries the step description.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for compute engine operations
#[derive(Debug, Error)]
pub enum CeError {
    /// Illegal state, e.g. unknown metric key or duplicated measure
    #[error("{0}")]
    State(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file errors
    #[error("Configuration error: {message} (file: {})", path.display())]
    ConfigurationFile { message: String, path: PathBuf },

    /// Scanner report is inconsistent
    #[error("Invalid report: {0}")]
    Report(String),

    /// Storage collaborator errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Illegal queue operation
    #[error("Queue error: {0}")]
    Queue(String),

    /// A computation step failed
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<CeError>,
    },

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// TOML errors
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    /// Pattern errors
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl CeError {
    /// Create an illegal state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a report error
    pub fn report(message: impl Into<String>) -> Self {
        Self::Report(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Wrap an error raised by a computation step
    pub fn step(step: impl Into<String>, source: CeError) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::State(_) => "State",
            Self::Configuration(_) | Self::ConfigurationFile { .. } => "Config",
            Self::Report(_) => "Report",
            Self::Storage(_) => "Storage",
            Self::Queue(_) => "Queue",
            Self::Step { source, .. } => source.category(),
            Self::Io(_) => "I/O",
            Self::Json(_) | Self::TomlDe(_) => "Parse",
            Self::Pattern(_) => "Config",
        }
    }

    /// Innermost error, skipping step wrappers.
    pub fn root_cause(&self) -> &CeError {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Check if this error is potentially transient and retryable.
    ///
    /// Only storage and I/O failures can succeed on a later attempt. State,
    /// configuration and report errors are defects of the input and never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(message) => {
                let msg_lower = message.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("timed out")
                    || msg_lower.contains("deadlock")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
            }
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            Self::Step { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, CeError>;
