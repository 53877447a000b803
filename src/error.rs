use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DerepError {
    #[error("invalid genome accession: {0}")]
    InvalidAccession(String),

    #[error("invalid accession pattern: {0}")]
    InvalidAccessionPattern(String),

    #[error("identity cutoff must be in (0, 100], got {0}")]
    InvalidCutoff(f64),

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("input table not found: {0}")]
    InputNotFound(PathBuf),

    #[error("input table is not usable: {0}")]
    MalformedTable(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("failed to unpack sequence bundle: {0}")]
    Unpack(String),

    #[error("clustering failed: {0}")]
    ClusteringFailed(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("failed to write artifact {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
