//! Missing-biomarker imputation ahead of scoring

use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::units::Biomarker;
use crate::error::Result;

/// Where fill values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationPolicy {
    /// Median of the surviving cohort, falling back to the literature value
    /// for a column that is absent or entirely missing
    #[default]
    CohortMedian,
    /// Always the published population reference value
    LiteratureDefault,
}

impl std::fmt::Display for ImputationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImputationPolicy::CohortMedian => write!(f, "cohort-median"),
            ImputationPolicy::LiteratureDefault => write!(f, "literature-default"),
        }
    }
}

impl std::str::FromStr for ImputationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cohort-median" | "median" => Ok(ImputationPolicy::CohortMedian),
            "literature-default" | "literature" => Ok(ImputationPolicy::LiteratureDefault),
            _ => Err(format!(
                "Invalid imputation policy '{}'. Use 'cohort-median' or 'literature-default'",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSource {
    /// Nothing was missing
    NotNeeded,
    CohortMedian,
    LiteratureDefault,
}

impl std::fmt::Display for FillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FillSource::NotNeeded => "not needed",
            FillSource::CohortMedian => "cohort median",
            FillSource::LiteratureDefault => "literature default",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputationRecord {
    pub biomarker: Biomarker,
    pub source: FillSource,
    /// Value written into missing cells, in formula units
    pub fill_value: Option<f64>,
    pub cells_filled: usize,
}

/// Per-biomarker audit of one imputation call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputationReport {
    pub records: Vec<ImputationRecord>,
}

impl ImputationReport {
    pub fn total_filled(&self) -> usize {
        self.records.iter().map(|r| r.cells_filled).sum()
    }

    pub fn record(&self, biomarker: Biomarker) -> Option<&ImputationRecord> {
        self.records.iter().find(|r| r.biomarker == biomarker)
    }
}

fn fill_value(
    values: Option<&Float64Chunked>,
    biomarker: Biomarker,
    policy: ImputationPolicy,
) -> (FillSource, f64) {
    if policy == ImputationPolicy::CohortMedian {
        if let Some(median) = values.and_then(|ca| ca.median()) {
            return (FillSource::CohortMedian, median);
        }
    }
    (FillSource::LiteratureDefault, biomarker.literature_default())
}

/// Fill every missing canonical biomarker cell.
///
/// Columns absent from `df` are created and filled entirely. The returned
/// frame has no missing value in any of the nine biomarker columns.
pub fn impute_biomarkers(
    mut df: DataFrame,
    policy: ImputationPolicy,
) -> Result<(DataFrame, ImputationReport)> {
    let height = df.height();
    let mut report = ImputationReport::default();

    for biomarker in Biomarker::ALL {
        let name = biomarker.column();
        let values = match df.column(name) {
            Ok(column) => Some(column.cast(&DataType::Float64)?.f64()?.clone()),
            Err(_) => None,
        };

        let missing = values.as_ref().map(|ca| ca.null_count()).unwrap_or(height);
        if missing == 0 {
            report.records.push(ImputationRecord {
                biomarker,
                source: FillSource::NotNeeded,
                fill_value: None,
                cells_filled: 0,
            });
            continue;
        }

        let (source, value) = fill_value(values.as_ref(), biomarker, policy);
        if values.is_none() {
            warn!("{} is absent; filling with {} {:.3}", name, source, value);
        }

        let filled: Float64Chunked = match &values {
            Some(ca) => ca.into_iter().map(|v| Some(v.unwrap_or(value))).collect(),
            None => std::iter::repeat(Some(value)).take(height).collect(),
        };
        df.with_column(filled.with_name(name.into()).into_series())?;

        info!("Imputed {} cell(s) of {} with {} {:.3}", missing, name, source, value);
        report.records.push(ImputationRecord {
            biomarker,
            source,
            fill_value: Some(value),
            cells_filled: missing,
        });
    }

    Ok((df, report))
}
