//! Error types for the screenshot pipeline

use serde::Serialize;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the screenshot pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// The batch request itself is malformed; nothing was dispatched
    #[error("Invalid batch request: {0}")]
    InvalidBatchRequest(String),

    /// The insertion index does not point at a message in the conversation
    #[error("Insertion index {index} out of range for conversation of {len} messages")]
    InvalidInsertionIndex { index: usize, len: usize },

    /// No template registered under the requested platform identifier
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    /// A render did not produce a capture within the allotted time
    #[error("Render timed out after {0}ms")]
    RenderTimeout(u64),

    /// The browser context died or returned garbage mid-render
    #[error("Browser crashed: {0}")]
    BrowserCrash(String),

    /// The job was cancelled before it acquired a pool slot
    #[error("Job cancelled before dispatch")]
    Cancelled,

    /// Every job in the batch failed; no archive was produced
    #[error("All {0} jobs in the batch failed")]
    BatchFailed(usize),

    /// An evidence image could not be validated at ingestion
    #[error("Invalid evidence image: {0}")]
    Image(String),

    /// Archive assembly failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Corpus or request payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-job failure classification reported in the batch manifest.
///
/// This is the serializable projection of `Error` for errors recorded
/// against a single job rather than failing the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobErrorKind {
    InvalidInsertionIndex,
    UnknownPlatform,
    RenderTimeout,
    BrowserCrash,
    Cancelled,
    Render,
}

impl From<&Error> for JobErrorKind {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidInsertionIndex { .. } => JobErrorKind::InvalidInsertionIndex,
            Error::UnknownPlatform(_) => JobErrorKind::UnknownPlatform,
            Error::RenderTimeout(_) => JobErrorKind::RenderTimeout,
            Error::BrowserCrash(_) => JobErrorKind::BrowserCrash,
            Error::Cancelled => JobErrorKind::Cancelled,
            _ => JobErrorKind::Render,
        }
    }
}
