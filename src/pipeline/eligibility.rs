//! Cohort eligibility and the exclusion ledger
//!
//! Predicates run in a fixed order, each only removing rows. The surviving
//! count after every step is appended to the [`ExclusionLedger`].

use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::fields;
use super::units::Biomarker;
use crate::error::{PipelineError, Result};

pub const STAGE_INITIAL: &str = "initial";
pub const STAGE_EXPOSURE: &str = "after_exposure_missing";
pub const STAGE_AGE: &str = "after_age";
pub const STAGE_PREGNANCY: &str = "after_pregnancy";
pub const STAGE_BIOMARKERS: &str = "after_biomarkers";
pub const STAGE_OUTLIERS: &str = "after_outliers";

/// Source-level inputs counted by the relaxed completeness policy
pub const RELAXED_INPUTS: [&str; 11] = [
    "LBXSAT", "LBXSAL", "LBXSCR", "LBXGLU", "LBXGH", "LBXCRP", "LBXLYPCT", "LBXMCVSI", "LBXRBWSI",
    "LBXSAPSI", "LBXWBCSI",
];

/// How complete a subject's biomarker panel must be
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CompletenessPolicy {
    /// Every canonical biomarker present
    AllNine,
    /// At least `min_present` of `columns` present; absent columns count as missing
    AtLeast {
        min_present: usize,
        columns: Vec<String>,
    },
}

impl Default for CompletenessPolicy {
    fn default() -> Self {
        CompletenessPolicy::AllNine
    }
}

impl CompletenessPolicy {
    /// Seven of the eleven source-level inputs
    pub fn relaxed() -> Self {
        CompletenessPolicy::AtLeast {
            min_present: 7,
            columns: RELAXED_INPUTS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, CompletenessPolicy::AllNine)
    }
}

impl std::fmt::Display for CompletenessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletenessPolicy::AllNine => write!(f, "all nine biomarkers"),
            CompletenessPolicy::AtLeast {
                min_present,
                columns,
            } => write!(f, "at least {} of {} inputs", min_present, columns.len()),
        }
    }
}

/// Eligibility thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    pub min_age: f64,
    /// Rows with |z| above this are dropped
    pub outlier_z: f64,
    pub completeness: CompletenessPolicy,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            min_age: 18.0,
            outlier_z: 4.0,
            completeness: CompletenessPolicy::AllNine,
        }
    }
}

/// One stage of the exclusion flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub stage: String,
    pub count: usize,
}

/// Ordered (stage, surviving count) audit trail
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionLedger {
    entries: Vec<LedgerEntry>,
}

impl ExclusionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: &str, count: usize) {
        info!("Exclusion flow {}: {}", stage, count);
        self.entries.push(LedgerEntry {
            stage: stage.to_string(),
            count,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn initial_count(&self) -> Option<usize> {
        self.entries.first().map(|e| e.count)
    }

    pub fn final_count(&self) -> Option<usize> {
        self.entries.last().map(|e| e.count)
    }

    pub fn count_at(&self, stage: &str) -> Option<usize> {
        self.entries.iter().find(|e| e.stage == stage).map(|e| e.count)
    }

    /// Rows removed by each stage after the first
    pub fn removed_per_stage(&self) -> Vec<(String, usize)> {
        self.entries
            .windows(2)
            .map(|w| (w[1].stage.clone(), w[0].count.saturating_sub(w[1].count)))
            .collect()
    }

    pub fn is_non_increasing(&self) -> bool {
        self.entries.windows(2).all(|w| w[1].count <= w[0].count)
    }
}

/// Per-variable outcome of the outlier pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierPass {
    pub variable: String,
    pub mean: f64,
    pub sd: f64,
    pub removed: usize,
}

/// The eligible rows plus the audit of how they were reached
#[derive(Debug, Clone)]
pub struct EligibilityOutcome {
    pub cohort: DataFrame,
    pub ledger: ExclusionLedger,
    pub outliers: Vec<OutlierPass>,
}

fn float_values(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let values = column.cast(&DataType::Float64)?;
    Ok(Some(values.f64()?.into_iter().collect()))
}

fn filter_rows(df: DataFrame, keep: Vec<bool>) -> Result<DataFrame> {
    let mask: BooleanChunked = keep.into_iter().collect();
    Ok(df.filter(&mask)?)
}

fn exposure_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let mut keep = vec![false; df.height()];
    let mut available = 0;
    for analyte in fields::EXPOSURES {
        if let Some(values) = float_values(df, analyte)? {
            available += 1;
            for (row, value) in values.iter().enumerate() {
                keep[row] |= value.is_some();
            }
        }
    }
    if available == 0 {
        warn!("No exposure analyte columns present; every subject lacks exposure data");
    }
    Ok(keep)
}

fn age_mask(df: &DataFrame, min_age: f64) -> Result<Vec<bool>> {
    let ages = float_values(df, fields::AGE)?.ok_or_else(|| PipelineError::MissingColumn {
        table: "merged".to_string(),
        column: fields::AGE.to_string(),
    })?;
    Ok(ages
        .iter()
        .map(|age| age.map(|a| a >= min_age).unwrap_or(false))
        .collect())
}

fn is_pregnant_label(value: &str) -> bool {
    let value = value.trim();
    value == "Yes" || value.parse::<f64>().map(|code| code == 1.0).unwrap_or(false)
}

/// Only an explicit "Yes" (code 1) excludes; unknown or missing status is kept.
fn pregnancy_mask(df: &DataFrame) -> Result<Vec<bool>> {
    let Ok(column) = df.column(fields::PREGNANT) else {
        return Ok(vec![true; df.height()]);
    };

    if column.dtype() == &DataType::String {
        Ok(column
            .str()?
            .into_iter()
            .map(|v| !v.map(is_pregnant_label).unwrap_or(false))
            .collect())
    } else {
        let codes = column.cast(&DataType::Float64)?;
        Ok(codes
            .f64()?
            .into_iter()
            .map(|v| v != Some(1.0))
            .collect())
    }
}

fn completeness_mask(df: &DataFrame, policy: &CompletenessPolicy) -> Result<Vec<bool>> {
    let height = df.height();
    match policy {
        CompletenessPolicy::AllNine => {
            let mut keep = vec![true; height];
            for biomarker in Biomarker::ALL {
                match float_values(df, biomarker.column())? {
                    Some(values) => {
                        for (row, value) in values.iter().enumerate() {
                            keep[row] &= value.is_some();
                        }
                    }
                    None => {
                        warn!("Biomarker {} is absent from this run", biomarker);
                        return Ok(vec![false; height]);
                    }
                }
            }
            Ok(keep)
        }
        CompletenessPolicy::AtLeast {
            min_present,
            columns,
        } => {
            let mut present = vec![0usize; height];
            for name in columns {
                if let Some(values) = float_values(df, name)? {
                    for (row, value) in values.iter().enumerate() {
                        if value.is_some() {
                            present[row] += 1;
                        }
                    }
                }
            }
            Ok(present.into_iter().map(|n| n >= *min_present).collect())
        }
    }
}

/// Mean and sample standard deviation of the non-missing values
fn mean_sd(values: &[Option<f64>]) -> Option<(f64, f64)> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    let n = observed.len();
    if n < 2 {
        return None;
    }
    let mean = observed.iter().sum::<f64>() / n as f64;
    let var = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some((mean, var.sqrt()))
}

/// Variables screened for outliers, in order
pub fn outlier_variables(policy: &CompletenessPolicy) -> Vec<&'static str> {
    let mut vars = vec![fields::AGE];
    vars.extend(fields::EXPOSURES);
    if policy.is_strict() {
        vars.extend(Biomarker::ALL.iter().map(|b| b.column()));
    }
    vars
}

fn remove_outliers(
    mut df: DataFrame,
    variables: &[&str],
    z_limit: f64,
) -> Result<(DataFrame, Vec<OutlierPass>)> {
    let mut passes = Vec::new();

    for variable in variables {
        let Some(values) = float_values(&df, variable)? else {
            continue;
        };
        let Some((mean, sd)) = mean_sd(&values) else {
            continue;
        };
        if !(sd > 0.0) || !sd.is_finite() {
            continue;
        }

        let keep: Vec<bool> = values
            .iter()
            .map(|v| v.map(|x| ((x - mean) / sd).abs() <= z_limit).unwrap_or(true))
            .collect();
        let removed = keep.iter().filter(|k| !**k).count();
        if removed > 0 {
            info!("Outliers on {}: {} removed (mean {:.3}, sd {:.3})", variable, removed, mean, sd);
            df = filter_rows(df, keep)?;
        }
        passes.push(OutlierPass {
            variable: variable.to_string(),
            mean,
            sd,
            removed,
        });
    }

    Ok((df, passes))
}

/// Apply every eligibility predicate in order.
pub fn apply_eligibility(df: DataFrame, config: &EligibilityConfig) -> Result<EligibilityOutcome> {
    let mut ledger = ExclusionLedger::new();
    ledger.record(STAGE_INITIAL, df.height());

    let keep = exposure_mask(&df)?;
    let df = filter_rows(df, keep)?;
    ledger.record(STAGE_EXPOSURE, df.height());

    let keep = age_mask(&df, config.min_age)?;
    let df = filter_rows(df, keep)?;
    ledger.record(STAGE_AGE, df.height());

    let keep = pregnancy_mask(&df)?;
    let df = filter_rows(df, keep)?;
    ledger.record(STAGE_PREGNANCY, df.height());

    let keep = completeness_mask(&df, &config.completeness)?;
    let df = filter_rows(df, keep)?;
    ledger.record(STAGE_BIOMARKERS, df.height());

    let variables = outlier_variables(&config.completeness);
    let (df, outliers) = remove_outliers(df, &variables, config.outlier_z)?;
    ledger.record(STAGE_OUTLIERS, df.height());

    Ok(EligibilityOutcome {
        cohort: df,
        ledger,
        outliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_sd_uses_sample_variance() {
        let (mean, sd) = mean_sd(&[Some(2.0), Some(4.0), None, Some(6.0)]).unwrap();
        assert!((mean - 4.0).abs() < 1e-12);
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_sd_needs_two_observations() {
        assert!(mean_sd(&[Some(1.0), None]).is_none());
    }

    #[test]
    fn test_pregnancy_unknown_is_kept() {
        let df = df! {
            "pregnant" => [Some("Yes"), Some("No"), Some("Unknown"), None],
        }
        .unwrap();
        assert_eq!(pregnancy_mask(&df).unwrap(), vec![false, true, true, true]);
    }

    #[test]
    fn test_pregnancy_raw_codes() {
        let df = df! {
            "pregnant" => [Some(1.0f64), Some(2.0), Some(3.0), None],
        }
        .unwrap();
        assert_eq!(pregnancy_mask(&df).unwrap(), vec![false, true, true, true]);
    }

    #[test]
    fn test_pregnancy_codes_stored_as_text() {
        let df = df! {
            "pregnant" => [Some("1.0"), Some("1"), Some("2.0"), Some("No"), None],
        }
        .unwrap();
        assert_eq!(
            pregnancy_mask(&df).unwrap(),
            vec![false, false, true, true, true]
        );
    }

    #[test]
    fn test_outlier_variables_follow_policy() {
        let strict = outlier_variables(&CompletenessPolicy::AllNine);
        assert_eq!(strict.len(), 14);
        assert_eq!(strict[0], "age");

        let relaxed = outlier_variables(&CompletenessPolicy::relaxed());
        assert_eq!(relaxed, vec!["age", "PFOA", "PFOS", "PFHxS", "PFNA"]);
    }

    #[test]
    fn test_outlier_missing_values_survive() {
        let mut values: Vec<Option<f64>> = (0..30).map(|i| Some(10.0 + (i % 3) as f64)).collect();
        values.push(Some(1000.0));
        values.push(None);
        let df = df! { "PFOA" => values }.unwrap();

        let (out, passes) = remove_outliers(df, &["PFOA"], 4.0).unwrap();
        assert_eq!(out.height(), 31);
        assert_eq!(passes[0].removed, 1);
        assert_eq!(out.column("PFOA").unwrap().null_count(), 1);
    }

    #[test]
    fn test_ledger_removed_per_stage() {
        let mut ledger = ExclusionLedger::new();
        ledger.record(STAGE_INITIAL, 10);
        ledger.record(STAGE_AGE, 7);
        ledger.record(STAGE_OUTLIERS, 7);
        assert!(ledger.is_non_increasing());
        assert_eq!(
            ledger.removed_per_stage(),
            vec![(STAGE_AGE.to_string(), 3), (STAGE_OUTLIERS.to_string(), 0)]
        );
        assert_eq!(ledger.final_count(), Some(7));
    }
}
