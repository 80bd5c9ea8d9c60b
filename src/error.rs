//! Error types for cohort assembly.
//!
//! Absence of an optional extract is not an error and never reaches this
//! type; every variant here aborts the run before a cohort is produced.

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::{Cycle, SourceKind};

/// Errors that can occur while building a cohort.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The extract exists but could not be read as a table.
    #[error("Malformed {kind} extract for cycle {cycle} ({}): {reason}", .path.display())]
    Malformed {
        kind: SourceKind,
        cycle: Cycle,
        path: PathBuf,
        reason: String,
    },

    /// Reading the extract failed after all retry attempts.
    #[error("I/O error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No cycle at all is available for a source the cohort cannot be built without.
    #[error("No {0} extracts found for any cycle; the cohort cannot be constructed")]
    MandatorySourceMissing(SourceKind),

    /// A subject id occurs more than once on the right-hand side of a join.
    #[error("Subject id {subject_id} occurs {occurrences} times in the {table} table; refusing to join")]
    DuplicateSubject {
        table: String,
        subject_id: i64,
        occurrences: usize,
    },

    /// A column the stage depends on is not present.
    #[error("Column '{column}' not found in the {table} table")]
    MissingColumn { table: String, column: String },

    /// Configuration is internally inconsistent.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
