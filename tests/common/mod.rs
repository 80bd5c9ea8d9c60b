//! Shared test utilities and fixture generators
//!
//! The standard fixture writes two survey cycles (D and E) of raw extracts
//! into a temporary directory. Forty subjects are linked across exposure
//! and demographics; a handful are planted to trip each eligibility rule:
//!
//! - 3: age 16 (excluded by age)
//! - 5: pregnant (excluded by pregnancy)
//! - 7: no exposure measurement at all
//! - 9: no CRP record (incomplete biomarker panel)
//! - 11: biochemistry glucose missing, fasting glucose present
//! - 104: extreme PFOA (outlier)
//! - 106: age missing
#![allow(dead_code)]

use polars::prelude::*;
use std::path::Path;
use tempfile::TempDir;

pub const CYCLE_D_IDS: std::ops::RangeInclusive<i64> = 1..=20;
pub const CYCLE_E_IDS: std::ops::RangeInclusive<i64> = 101..=120;

pub const TOO_YOUNG: i64 = 3;
pub const PREGNANT: i64 = 5;
pub const NO_EXPOSURE: i64 = 7;
pub const NO_CRP: i64 = 9;
pub const FASTING_GLUCOSE_ONLY: i64 = 11;
pub const EXPOSURE_OUTLIER: i64 = 104;
pub const AGE_MISSING: i64 = 106;

/// Subjects every eligibility rule should let through
pub const EXPECTED_COHORT_SIZE: usize = 34;

/// Write a frame as `<dir>/<name>`
pub fn write_csv(dir: &Path, name: &str, df: &mut DataFrame) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
}

fn wobble(id: i64, period: i64) -> f64 {
    (id % period) as f64
}

/// PFC extract. Cycle D reports `LBXPF*`, cycle E the `LBDPF*` variant.
pub fn exposure_frame(ids: &[i64], lbd_names: bool) -> DataFrame {
    let value = |id: i64, base: f64| -> Option<f64> {
        if id == NO_EXPOSURE {
            None
        } else {
            Some(base + 0.3 * wobble(id, 5))
        }
    };
    let pfoa: Vec<Option<f64>> = ids
        .iter()
        .map(|&id| if id == EXPOSURE_OUTLIER { Some(500.0) } else { value(id, 2.0) })
        .collect();
    let pfos: Vec<Option<f64>> = ids.iter().map(|&id| value(id, 6.0)).collect();
    let pfhxs: Vec<Option<f64>> = ids.iter().map(|&id| value(id, 1.5)).collect();
    let pfna: Vec<Option<f64>> = ids.iter().map(|&id| value(id, 0.8)).collect();

    let prefix = if lbd_names { "LBD" } else { "LBX" };
    DataFrame::new(vec![
        Column::new("SEQN".into(), ids),
        Column::new(format!("{}PFOA", prefix).into(), pfoa),
        Column::new(format!("{}PFOS", prefix).into(), pfos),
        Column::new(format!("{}PFHS", prefix).into(), pfhxs),
        Column::new(format!("{}PFNA", prefix).into(), pfna),
    ])
    .unwrap()
}

pub fn demographics_frame(ids: &[i64]) -> DataFrame {
    let ages: Vec<Option<f64>> = ids
        .iter()
        .map(|&id| match id {
            TOO_YOUNG => Some(16.0),
            PREGNANT => Some(30.0),
            AGE_MISSING => None,
            _ => Some(20.0 + ((id * 7) % 60) as f64),
        })
        .collect();
    let sex: Vec<i64> = ids
        .iter()
        .map(|&id| if id == PREGNANT || id % 2 == 0 { 2 } else { 1 })
        .collect();
    let pregnant: Vec<Option<i64>> = ids
        .iter()
        .map(|&id| {
            if id == PREGNANT {
                Some(1)
            } else if id % 2 == 0 {
                Some(2)
            } else {
                None
            }
        })
        .collect();
    let race: Vec<i64> = ids.iter().map(|&id| 1 + id % 5).collect();
    let education: Vec<i64> = ids.iter().map(|&id| 1 + id % 5).collect();
    let pir: Vec<f64> = ids.iter().map(|&id| 0.5 + 0.4 * wobble(id, 10)).collect();
    let weight: Vec<f64> = ids.iter().map(|&id| 10000.0 + 250.0 * wobble(id, 8)).collect();
    let psu: Vec<i64> = ids.iter().map(|&id| 1 + id % 2).collect();
    let strata: Vec<i64> = ids.iter().map(|&id| 80 + id % 15).collect();

    df! {
        "SEQN" => ids,
        "RIAGENDR" => sex,
        "RIDAGEYR" => ages,
        "RIDRETH1" => race,
        "DMDEDUC2" => education,
        "INDFMPIR" => pir,
        "RIDEXPRG" => pregnant,
        "WTMEC2YR" => weight,
        "SDMVPSU" => psu,
        "SDMVSTRA" => strata,
    }
    .unwrap()
}

/// Standard biochemistry profile in native units
pub fn biochemistry_frame(ids: &[i64]) -> DataFrame {
    let albumin: Vec<f64> = ids.iter().map(|&id| 4.0 + 0.1 * wobble(id, 5)).collect();
    let creatinine: Vec<f64> = ids.iter().map(|&id| 0.8 + 0.05 * wobble(id, 6)).collect();
    let glucose: Vec<Option<f64>> = ids
        .iter()
        .map(|&id| {
            if id == FASTING_GLUCOSE_ONLY {
                None
            } else {
                Some(90.0 + 2.0 * wobble(id, 7))
            }
        })
        .collect();
    let alp: Vec<f64> = ids.iter().map(|&id| 65.0 + 3.0 * wobble(id, 6)).collect();
    let alt: Vec<f64> = ids.iter().map(|&id| 18.0 + wobble(id, 9)).collect();

    df! {
        "SEQN" => ids,
        "LBXSAL" => albumin,
        "LBXSCR" => creatinine,
        "LBXSGL" => glucose,
        "LBXSAPSI" => alp,
        "LBXSAT" => alt,
    }
    .unwrap()
}

pub fn crp_frame(ids: &[i64]) -> DataFrame {
    let kept: Vec<i64> = ids.iter().copied().filter(|&id| id != NO_CRP).collect();
    let crp: Vec<f64> = kept.iter().map(|&id| 0.1 + 0.05 * wobble(id, 6)).collect();
    df! {
        "SEQN" => kept,
        "LBXCRP" => crp,
    }
    .unwrap()
}

pub fn blood_count_frame(ids: &[i64]) -> DataFrame {
    let lymph: Vec<f64> = ids.iter().map(|&id| 28.0 + wobble(id, 6)).collect();
    let mcv: Vec<f64> = ids.iter().map(|&id| 88.0 + 0.5 * wobble(id, 7)).collect();
    let rdw: Vec<f64> = ids.iter().map(|&id| 12.5 + 0.2 * wobble(id, 5)).collect();
    let wbc: Vec<f64> = ids.iter().map(|&id| 6.0 + 0.2 * wobble(id, 6)).collect();
    df! {
        "SEQN" => ids,
        "LBXLYPCT" => lymph,
        "LBXMCVSI" => mcv,
        "LBXRDW" => rdw,
        "LBXWBCSI" => wbc,
    }
    .unwrap()
}

/// Fasting subsample glucose
pub fn glucose_frame(ids: &[i64]) -> DataFrame {
    let fasting: Vec<i64> = ids.iter().copied().filter(|id| id % 2 == 1).collect();
    let glucose: Vec<f64> = fasting.iter().map(|&id| 92.0 + wobble(id, 4)).collect();
    df! {
        "SEQN" => fasting,
        "LBXGLU" => glucose,
    }
    .unwrap()
}

/// Write the standard two-cycle fixture and return its directory.
pub fn create_standard_fixture() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();

    for (letter, ids) in [("D", CYCLE_D_IDS), ("E", CYCLE_E_IDS)] {
        let ids: Vec<i64> = ids.collect();
        write_csv(dir, &format!("PFC_{}.csv", letter), &mut exposure_frame(&ids, letter == "E"));
        write_csv(dir, &format!("DEMO_{}.csv", letter), &mut demographics_frame(&ids));
        write_csv(dir, &format!("BIOPRO_{}.csv", letter), &mut biochemistry_frame(&ids));
        write_csv(dir, &format!("CRP_{}.csv", letter), &mut crp_frame(&ids));
        write_csv(dir, &format!("CBC_{}.csv", letter), &mut blood_count_frame(&ids));
    }
    // Fasting glucose only exists for the first cycle
    let ids: Vec<i64> = CYCLE_D_IDS.collect();
    write_csv(dir, "GLU_D.csv", &mut glucose_frame(&ids));

    temp_dir
}

/// Column values as `Option<f64>`
pub fn float_column(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

pub fn subject_ids(df: &DataFrame) -> Vec<i64> {
    df.column("subject_id")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .flatten()
        .collect()
}
