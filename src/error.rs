//! Error type shared by every pipeline stage.
//!
//! Each variant carries enough context (URL or path) to be logged on its own.
//! None of them is fatal to the process: the orchestrator logs the error and
//! moves on to the next feed or the next tick.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while polling, fetching, writing or forwarding.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request could not be sent or its body could not be read.
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The downloaded payload is not a readable zip container.
    #[error("archive from {url} could not be opened: {source}")]
    Zip {
        url: String,
        #[source]
        source: zip::result::ZipError,
    },

    /// The zip container opened fine but holds nothing to read.
    #[error("archive from {url} contains no entries")]
    EmptyArchive { url: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// The archive on disk was written with a different column layout.
    #[error("archive {path} has header {found:?}, expected {expected:?}")]
    SchemaMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("sink rejected records: {0}")]
    Sink(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn http(url: &str, source: reqwest::Error) -> Self {
        PipelineError::Http {
            url: url.to_string(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PipelineError::Csv {
            path: path.into(),
            source,
        }
    }

    /// Network-level failures are expected to clear up by the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Http { .. } | PipelineError::Status { .. }
        )
    }
}
