//! Report module - summarizing the assembled cohort

pub mod audit;
pub mod summary;

pub use audit::*;
pub use summary::*;
