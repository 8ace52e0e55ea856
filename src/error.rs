//! Error types for deck generation

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for deck generation operations
pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Error, Debug)]
pub enum ExportError {
    /// ElmerGrid ran but reported failure; no deck files are written in this case
    #[error("ElmerGrid exited with status {status}: {stderr}")]
    MeshConvert { status: i32, stderr: String },

    /// ElmerGrid could not be spawned (usually: not on PATH)
    #[error("failed to launch mesh converter `{command}`: {source}")]
    MeshConverterUnavailable {
        command: String,
        source: std::io::Error,
    },

    /// A `$ NAME = ID` entry in mesh.names did not parse
    #[error("{}:{line}: malformed mesh.names entry: {reason}", .path.display())]
    MeshNames {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The machine description is missing data the deck needs
    #[error("missing machine data: {0}")]
    MissingData(&'static str),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("template error: {source}")]
    Template {
        #[from]
        source: minijinja::Error,
    },
}
