// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while merging profiles.
///
/// Only `NoInputData`, `UnknownRank` and `Io` are fatal. The other variants
/// are produced per file or per row and are logged and recovered from by the
/// ingestion code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no usable input data ({0})")]
    NoInputData(String),

    #[error("unreadable file {}: {reason}", .path.display())]
    UnreadableFile { path: PathBuf, reason: String },

    #[error("malformed lineage '{lineage}': {reason}")]
    MalformedLineage { lineage: String, reason: String },

    #[error("non-numeric abundance '{value}'")]
    NonNumericAbundance { value: String },

    #[error("unknown rank '{0}'")]
    UnknownRank(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(lineage: &str, reason: impl Into<String>) -> Self {
        Error::MalformedLineage {
            lineage: lineage.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::UnreadableFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
