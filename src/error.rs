//! Error types shared by the harness and the speedup analysis.
//!
//! Everything except [`BenchError::MissingVersion`] and the per-run markers is
//! fatal for a harness invocation: it is reported once and the run stops
//! before any further results are written.

use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for the harness.
pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    /// A required anchor is missing from the command line (launcher, benchmark build dir).
    #[error("{0}")]
    Structural(String),

    /// A declared value disagrees with what the descriptor requires.
    #[error("{0}")]
    Validation(String),

    /// The caller tried to preset a variable that this tool owns.
    #[error("{variable} must not be set on the launcher command line: {reason}")]
    ConfigConflict { variable: String, reason: String },

    /// The descriptor names a collective outside the known table.
    #[error("Unsupported collective `{0}` (expected one of: allreduce, allgather, alltoall)")]
    UnsupportedAlgorithm(String),

    /// The launcher could not be found or is not executable.
    #[error("{0} must be a valid executable for the launcher command")]
    ExecutableNotFound(String),

    /// Malformed or incomplete algorithm descriptor.
    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    /// An output file carried no version marker line.
    #[error("No `NCCL version` line found in {}", .0.display())]
    MissingVersion(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

impl BenchError {
    /// Whether this error only invalidates one output file rather than the whole run.
    pub fn is_soft(&self) -> bool {
        matches!(self, BenchError::MissingVersion(_))
    }
}
