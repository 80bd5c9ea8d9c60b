//! Tests for the cohort merger

use phenocohort::pipeline::{merge_sources, SourceKind};
use phenocohort::PipelineError;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

fn exposure() -> DataFrame {
    df! {
        "subject_id" => [3i64, 1, 2],
        "cycle" => ["D", "D", "D"],
        "PFOA" => [1.0f64, 2.0, 3.0],
    }
    .unwrap()
}

fn demographics() -> DataFrame {
    df! {
        "subject_id" => [1i64, 2, 4],
        "cycle" => ["D", "D", "D"],
        "age" => [40.0f64, 50.0, 60.0],
    }
    .unwrap()
}

#[test]
fn test_exposure_and_demographics_inner_join() {
    let merged = merge_sources(exposure(), demographics(), Vec::new()).unwrap();
    assert_eq!(common::subject_ids(&merged), vec![1, 2], "sorted, intersection only");
    assert!(merged.column("cycle__right").is_err());
}

#[test]
fn test_biomarker_tables_left_join() {
    let crp = df! {
        "subject_id" => [2i64, 99],
        "crp" => [0.4f64, 0.1],
    }
    .unwrap();
    let merged = merge_sources(
        exposure(),
        demographics(),
        vec![(SourceKind::Crp, crp)],
    )
    .unwrap();

    assert_eq!(merged.height(), 2, "left joins never add subjects");
    assert_eq!(common::float_column(&merged, "crp"), vec![None, Some(0.4)]);
}

#[test]
fn test_overlapping_biomarker_prefers_earlier_source() {
    let biochemistry = df! {
        "subject_id" => [1i64, 2],
        "glucose" => [Some(95.0f64), None],
    }
    .unwrap();
    let fasting = df! {
        "subject_id" => [1i64, 2],
        "glucose" => [Some(130.0f64), Some(101.0)],
    }
    .unwrap();

    // Supplied out of order on purpose; join order follows the source kind
    let merged = merge_sources(
        exposure(),
        demographics(),
        vec![
            (SourceKind::Glucose, fasting),
            (SourceKind::Biochemistry, biochemistry),
        ],
    )
    .unwrap();
    assert_eq!(
        common::float_column(&merged, "glucose"),
        vec![Some(95.0), Some(101.0)]
    );
}

#[test]
fn test_duplicate_subject_in_biomarker_table_fails() {
    let cbc = df! {
        "subject_id" => [1i64, 1],
        "rdw" => [12.0f64, 13.0],
    }
    .unwrap();
    let err = merge_sources(
        exposure(),
        demographics(),
        vec![(SourceKind::BloodCount, cbc)],
    )
    .unwrap_err();

    match err {
        PipelineError::DuplicateSubject {
            table, subject_id, ..
        } => {
            assert_eq!(table, "blood count");
            assert_eq!(subject_id, 1);
        }
        other => panic!("expected duplicate subject, got {:?}", other),
    }
}

#[test]
fn test_duplicate_subject_in_exposure_fails() {
    let dup = df! {
        "subject_id" => [1i64, 1],
        "PFOA" => [1.0f64, 2.0],
    }
    .unwrap();
    assert!(matches!(
        merge_sources(dup, demographics(), Vec::new()),
        Err(PipelineError::DuplicateSubject { .. })
    ));
}
