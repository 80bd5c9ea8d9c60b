//! phenocohort: exposure cohort assembly with phenotypic-age scoring
//!
//! Loads multi-cycle survey extracts, harmonizes names and units, applies
//! cohort eligibility rules with an exclusion ledger, and scores each
//! subject's biological age from nine clinical biomarkers.

pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use config::{PipelineConfig, Preset};
pub use error::{PipelineError, Result};
pub use pipeline::{run_pipeline, PipelineOutput};
