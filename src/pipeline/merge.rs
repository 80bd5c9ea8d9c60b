//! Cohort merger: link standardized source tables on subject id
//!
//! Join order is fixed: exposure ⋈ demographics (inner), then each biomarker
//! source as a left join in `SourceKind` order. Every right-hand table must
//! hold each subject at most once.

use std::collections::HashMap;

use log::info;
use polars::prelude::*;

use super::cycle::SourceKind;
use super::fields;
use super::standardize::coalesce_aliases;
use crate::error::{PipelineError, Result};

/// Suffix given to colliding right-hand columns while a join is in flight
const RIGHT_SUFFIX: &str = "__right";

/// Fail if any subject id occurs more than once in `df`.
///
/// The smallest offending id is reported so the diagnostic is stable.
pub fn ensure_unique_subjects(df: &DataFrame, table: &str) -> Result<()> {
    let ids = df
        .column(fields::SUBJECT_ID)
        .map_err(|_| PipelineError::MissingColumn {
            table: table.to_string(),
            column: fields::SUBJECT_ID.to_string(),
        })?
        .cast(&DataType::Int64)?;

    let mut counts: HashMap<i64, usize> = HashMap::with_capacity(ids.len());
    for id in ids.i64()?.into_iter().flatten() {
        *counts.entry(id).or_insert(0) += 1;
    }

    let duplicate = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .min_by_key(|(id, _)| *id);

    match duplicate {
        Some((subject_id, occurrences)) => Err(PipelineError::DuplicateSubject {
            table: table.to_string(),
            subject_id,
            occurrences,
        }),
        None => Ok(()),
    }
}

/// Join `right` onto `left` by subject id.
///
/// Columns present on both sides keep the left value and fall back to the
/// right value where the left cell is missing.
fn join_on_subject(
    left: DataFrame,
    mut right: DataFrame,
    how: JoinType,
    table: &str,
) -> Result<DataFrame> {
    ensure_unique_subjects(&right, table)?;

    let left_names: Vec<String> = left
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let collisions: Vec<String> = right
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .filter(|name| name != fields::SUBJECT_ID && left_names.contains(name))
        .collect();

    for name in &collisions {
        right.rename(name, format!("{}{}", name, RIGHT_SUFFIX).into())?;
    }

    let mut joined = left
        .lazy()
        .join(
            right.lazy(),
            [col(fields::SUBJECT_ID)],
            [col(fields::SUBJECT_ID)],
            JoinArgs::new(how),
        )
        .collect()?;

    for name in &collisions {
        let renamed = format!("{}{}", name, RIGHT_SUFFIX);
        let (merged, used) = coalesce_aliases(&joined, name, &[name.as_str(), renamed.as_str()])?;
        joined.with_column(merged)?;
        joined.drop_in_place(&renamed)?;

        let filled = used.get(1).map(|u| u.cells).unwrap_or(0);
        if filled > 0 {
            info!("{}: {} cell(s) of {} filled from the {} table", table, filled, name, table);
        }
    }

    Ok(joined)
}

/// Build the denormalized cohort table.
///
/// `biomarkers` may be in any order; they are joined in `SourceKind` order.
pub fn merge_sources(
    exposure: DataFrame,
    demographics: DataFrame,
    mut biomarkers: Vec<(SourceKind, DataFrame)>,
) -> Result<DataFrame> {
    ensure_unique_subjects(&exposure, "exposure")?;

    let mut merged = join_on_subject(exposure, demographics, JoinType::Inner, "demographics")?;
    info!("After demographics merge: {} subjects", merged.height());

    biomarkers.sort_by_key(|(kind, _)| *kind);
    for (kind, table) in biomarkers {
        let before = merged.height();
        merged = join_on_subject(merged, table, JoinType::Left, &kind.to_string())?;
        debug_assert_eq!(before, merged.height(), "left join must not change the subject set");
        info!("After {} merge: {} subjects", kind, merged.height());
    }

    let merged = merged.sort([fields::SUBJECT_ID], SortMultipleOptions::default())?;
    Ok(merged)
}
