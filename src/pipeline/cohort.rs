//! Cohort table assembly: derived exposure features and schema projection

use log::info;
use polars::prelude::*;

use super::fields;
use super::merge::ensure_unique_subjects;
use super::units::Biomarker;
use crate::error::Result;

/// Added to an exposure concentration before the logarithm
pub const EXPOSURE_LOG_OFFSET: f64 = 0.01;

pub const QUARTILE_LABELS: [&str; 4] = ["Q1 (Low)", "Q2", "Q3", "Q4 (High)"];

/// Linear-interpolated quantile of sorted values
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

/// Label each value with its quartile of the observed distribution.
///
/// Bins are right-closed: a value equal to a cut point falls in the lower
/// bin. Missing values stay missing.
pub fn quartile_labels(values: &[Option<f64>]) -> Vec<Option<&'static str>> {
    let mut sorted: Vec<f64> = values.iter().flatten().copied().collect();
    if sorted.is_empty() {
        return vec![None; values.len()];
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let cuts = [
        quantile_sorted(&sorted, 0.25),
        quantile_sorted(&sorted, 0.50),
        quantile_sorted(&sorted, 0.75),
    ];

    values
        .iter()
        .map(|v| {
            v.map(|x| {
                let bin = cuts.iter().position(|cut| x <= *cut).unwrap_or(3);
                QUARTILE_LABELS[bin]
            })
        })
        .collect()
}

/// Add `log_<analyte>`, `total_exposure` and `exposure_quartile`.
pub fn add_exposure_features(mut df: DataFrame) -> Result<DataFrame> {
    let height = df.height();
    let mut total: Vec<Option<f64>> = vec![None; height];

    for analyte in fields::EXPOSURES {
        let Ok(column) = df.column(analyte) else {
            continue;
        };
        let values = column.cast(&DataType::Float64)?;
        let values = values.f64()?;

        let logged: Float64Chunked = values
            .into_iter()
            .map(|v| v.map(|x| (x + EXPOSURE_LOG_OFFSET).ln()))
            .collect();
        for (row, v) in values.into_iter().enumerate() {
            if let Some(x) = v {
                total[row] = Some(total[row].unwrap_or(0.0) + x);
            }
        }

        let name = fields::log_exposure(analyte);
        df.with_column(logged.with_name(name.as_str().into()).into_series())?;
    }

    let quartiles = quartile_labels(&total);
    df.with_column(Series::new(fields::TOTAL_EXPOSURE.into(), total))?;
    df.with_column(Series::new(fields::EXPOSURE_QUARTILE.into(), quartiles))?;
    Ok(df)
}

/// Cohort columns in output order; optional fields absent from a run are
/// skipped at projection time.
pub fn cohort_schema() -> Vec<String> {
    let mut schema: Vec<String> = [fields::SUBJECT_ID, fields::CYCLE, fields::CYCLE_YEARS]
        .iter()
        .map(|s| s.to_string())
        .collect();
    schema.extend(fields::EXPOSURES.iter().map(|s| s.to_string()));
    schema.extend(fields::EXPOSURE_DETECT_FLAGS.iter().map(|s| s.to_string()));
    schema.extend(fields::DEMOGRAPHICS.iter().map(|s| s.to_string()));
    schema.extend(Biomarker::ALL.iter().map(|b| b.column().to_string()));
    schema.push(fields::PHENOAGE.to_string());
    schema.push(fields::PHENOAGE_ACCEL.to_string());
    schema.extend(fields::EXPOSURES.iter().map(|a| fields::log_exposure(a)));
    schema.push(fields::TOTAL_EXPOSURE.to_string());
    schema.push(fields::EXPOSURE_QUARTILE.to_string());
    schema
}

/// Build the final cohort table from a scored frame.
pub fn build_cohort_table(df: DataFrame) -> Result<DataFrame> {
    let df = add_exposure_features(df)?;

    let columns: Vec<String> = cohort_schema()
        .into_iter()
        .filter(|name| df.column(name).is_ok())
        .collect();
    let cohort = df
        .select(columns)?
        .sort([fields::SUBJECT_ID], SortMultipleOptions::default())?;

    ensure_unique_subjects(&cohort, "cohort")?;
    info!(
        "Cohort table: {} subjects x {} columns",
        cohort.height(),
        cohort.width()
    );
    Ok(cohort)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quartile_labels_right_closed() {
        let values: Vec<Option<f64>> = (1..=8).map(|v| Some(v as f64)).collect();
        let labels = quartile_labels(&values);
        assert_eq!(labels[0], Some("Q1 (Low)"));
        assert_eq!(labels[2], Some("Q2"));
        assert_eq!(labels[7], Some("Q4 (High)"));
    }

    #[test]
    fn test_quartile_labels_keep_missing() {
        let labels = quartile_labels(&[None, Some(1.0)]);
        assert_eq!(labels[0], None);
        assert_eq!(labels[1], Some("Q1 (Low)"));
        assert!(quartile_labels(&[None, None]).iter().all(|l| l.is_none()));
    }

    #[test]
    fn test_exposure_features() {
        let df = df! {
            "PFOA" => [Some(1.0f64), None, Some(3.0)],
            "PFOS" => [Some(2.0f64), Some(4.0), None],
        }
        .unwrap();
        let out = add_exposure_features(df).unwrap();

        let total = out.column("total_exposure").unwrap().f64().unwrap();
        assert_eq!(total.get(0), Some(3.0));
        assert_eq!(total.get(1), Some(4.0));
        assert_eq!(total.get(2), Some(3.0));

        let log_pfoa = out.column("log_PFOA").unwrap().f64().unwrap();
        assert!((log_pfoa.get(0).unwrap() - 1.01f64.ln()).abs() < 1e-12);
        assert!(log_pfoa.get(1).is_none());
        assert!(out.column("log_PFNA").is_err());
    }

    #[test]
    fn test_build_cohort_projects_schema() {
        let df = df! {
            "SEQN" => [2i64, 1],
            "subject_id" => [2i64, 1],
            "PFOA" => [1.0f64, 2.0],
            "phenoage" => [40.0f64, 50.0],
        }
        .unwrap();
        let cohort = build_cohort_table(df).unwrap();
        let names: Vec<String> = cohort
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "subject_id",
                "PFOA",
                "phenoage",
                "log_PFOA",
                "total_exposure",
                "exposure_quartile"
            ]
        );
        let ids = cohort.column("subject_id").unwrap().i64().unwrap();
        assert_eq!(ids.get(0), Some(1));
    }
}
