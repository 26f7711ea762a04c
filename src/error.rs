//! Error types shared across the pipeline.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad invocation, reported before any object is processed.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The tool's output for one object did not have the expected layout.
    #[error("Unexpected output format for {object}: {reason}")]
    ParseFormat { object: String, reason: String },

    /// The tool could not be started, exited abnormally or timed out.
    #[error("Coverage tool failed for {object}: {reason}")]
    ToolInvocation { object: String, reason: String },

    #[error("Unsupported platform: {0}")]
    PlatformUnsupported(String),

    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn parse_format(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ParseFormat {
            object: object.into(),
            reason: reason.into(),
        }
    }

    pub fn tool(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ToolInvocation {
            object: object.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors confined to a single object; the run can continue without it.
    pub fn is_per_object(&self) -> bool {
        matches!(
            self,
            Error::ParseFormat { .. } | Error::ToolInvocation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
