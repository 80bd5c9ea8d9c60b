//! Command-line argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{PipelineConfig, Preset};
use crate::error::Result;
use crate::pipeline::{CompletenessPolicy, ImputationPolicy};

/// phenocohort - Assemble an exposure / biological-age cohort from survey extracts
#[derive(Parser, Debug)]
#[command(name = "phenocohort")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the `<STEM>_<CYCLE>.csv` extracts.
    /// Overrides the data directory of --config.
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// JSON configuration file. Fields left out take preset defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Configuration preset used when no --config is given.
    /// Options: "canonical" (default) or "legacy"
    #[arg(long, default_value = "canonical")]
    pub preset: Preset,

    /// Minimum chronological age in years
    #[arg(long)]
    pub min_age: Option<f64>,

    /// Outlier threshold - drop rows whose |z| exceeds this value
    #[arg(long, value_parser = validate_z_threshold)]
    pub z_threshold: Option<f64>,

    /// Biomarker completeness rule.
    /// Options: "all-nine" (every biomarker present) or "relaxed" (7 of 11 source inputs)
    #[arg(long, value_parser = parse_completeness)]
    pub completeness: Option<CompletenessPolicy>,

    /// Imputation of missing biomarkers.
    /// Options: "cohort-median" or "literature-default"
    #[arg(long)]
    pub imputation: Option<ImputationPolicy>,

    /// Number of rows to use for schema inference (CSV only).
    /// Use 0 for full table scan.
    #[arg(long)]
    pub infer_schema_length: Option<usize>,

    /// Only print the final summary
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the resolved configuration as JSON and exit
    PrintConfig,
}

impl Cli {
    /// Merge preset, configuration file and command-line overrides, in that order.
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::from_preset(self.preset),
        };

        if let Some(dir) = &self.data_dir {
            config.loader.data_dir = dir.clone();
        }
        if let Some(min_age) = self.min_age {
            config.eligibility.min_age = min_age;
        }
        if let Some(z) = self.z_threshold {
            config.eligibility.outlier_z = z;
        }
        if let Some(policy) = &self.completeness {
            config.eligibility.completeness = policy.clone();
        }
        if let Some(policy) = self.imputation {
            config.imputation = policy;
        }
        if let Some(n) = self.infer_schema_length {
            config.loader.infer_schema_length = n;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Validator for z_threshold parameter
fn validate_z_threshold(s: &str) -> std::result::Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;

    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(format!("z_threshold must be a positive number, got {}", value))
    }
}

fn parse_completeness(s: &str) -> std::result::Result<CompletenessPolicy, String> {
    match s.to_lowercase().as_str() {
        "all-nine" | "strict" => Ok(CompletenessPolicy::AllNine),
        "relaxed" => Ok(CompletenessPolicy::relaxed()),
        _ => Err(format!(
            "Invalid completeness '{}'. Use 'all-nine' or 'relaxed'",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply_on_top_of_preset() {
        let cli = Cli::parse_from([
            "phenocohort",
            "--preset",
            "legacy",
            "--min-age",
            "20",
            "--completeness",
            "all-nine",
            "--data-dir",
            "/tmp/extracts",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.eligibility.min_age, 20.0);
        assert!(config.eligibility.completeness.is_strict());
        assert_eq!(config.clipping.score.hi, 120.0, "legacy clipping kept");
        assert_eq!(config.loader.data_dir, PathBuf::from("/tmp/extracts"));
    }

    #[test]
    fn test_rejects_non_positive_z() {
        assert!(Cli::try_parse_from(["phenocohort", "--z-threshold", "0"]).is_err());
        assert!(Cli::try_parse_from(["phenocohort", "--completeness", "most"]).is_err());
    }

    #[test]
    fn test_print_config_subcommand() {
        let cli = Cli::parse_from(["phenocohort", "print-config"]);
        assert!(matches!(cli.command, Some(Commands::PrintConfig)));
    }
}
