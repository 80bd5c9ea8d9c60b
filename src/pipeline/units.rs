//! Canonical biomarkers and their unit conversions
//!
//! Every conversion used anywhere in the crate comes from
//! [`Biomarker::conversion`]; no other module multiplies biomarker values.

use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// g/dL to g/L
pub const ALBUMIN_G_DL_TO_G_L: f64 = 10.0;
/// mg/dL to µmol/L
pub const CREATININE_MG_DL_TO_UMOL_L: f64 = 88.4;
/// mg/dL to mmol/L
pub const GLUCOSE_MG_DL_TO_MMOL_L: f64 = 0.0555;
/// mg/dL to mg/L
pub const CRP_MG_DL_TO_MG_L: f64 = 10.0;
/// Added to CRP (mg/L) before the logarithm so a zero reading stays finite
pub const CRP_LOG_FLOOR_MG_L: f64 = 0.01;

/// The nine biomarker inputs of the scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biomarker {
    Crp,
    Albumin,
    Creatinine,
    Glucose,
    LymphocytePct,
    Mcv,
    Rdw,
    Alp,
    Wbc,
}

/// How a biomarker moves from its reporting unit to the formula unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Identity,
    /// `formula = native * factor`
    Scale(f64),
    /// `formula = ln(native * factor + floor)`
    ScaleThenLog { factor: f64, floor: f64 },
}

impl Conversion {
    pub fn to_formula(&self, native: f64) -> f64 {
        match *self {
            Conversion::Identity => native,
            Conversion::Scale(factor) => native * factor,
            Conversion::ScaleThenLog { factor, floor } => (native * factor + floor).ln(),
        }
    }

    /// Exact inverse of [`Conversion::to_formula`]
    pub fn to_native(&self, formula: f64) -> f64 {
        match *self {
            Conversion::Identity => formula,
            Conversion::Scale(factor) => formula / factor,
            Conversion::ScaleThenLog { factor, floor } => (formula.exp() - floor) / factor,
        }
    }
}

impl Biomarker {
    pub const ALL: [Biomarker; 9] = [
        Biomarker::Crp,
        Biomarker::Albumin,
        Biomarker::Creatinine,
        Biomarker::Glucose,
        Biomarker::LymphocytePct,
        Biomarker::Mcv,
        Biomarker::Rdw,
        Biomarker::Alp,
        Biomarker::Wbc,
    ];

    /// Canonical column name
    pub fn column(&self) -> &'static str {
        match self {
            Biomarker::Crp => "crp",
            Biomarker::Albumin => "albumin",
            Biomarker::Creatinine => "creatinine",
            Biomarker::Glucose => "glucose",
            Biomarker::LymphocytePct => "lymphocyte_pct",
            Biomarker::Mcv => "mcv",
            Biomarker::Rdw => "rdw",
            Biomarker::Alp => "alp",
            Biomarker::Wbc => "wbc",
        }
    }

    pub fn native_unit(&self) -> &'static str {
        match self {
            Biomarker::Crp => "mg/dL",
            Biomarker::Albumin => "g/dL",
            Biomarker::Creatinine => "mg/dL",
            Biomarker::Glucose => "mg/dL",
            Biomarker::LymphocytePct => "%",
            Biomarker::Mcv => "fL",
            Biomarker::Rdw => "%",
            Biomarker::Alp => "U/L",
            Biomarker::Wbc => "1000 cells/uL",
        }
    }

    pub fn formula_unit(&self) -> &'static str {
        match self {
            Biomarker::Crp => "ln(mg/L)",
            Biomarker::Albumin => "g/L",
            Biomarker::Creatinine => "umol/L",
            Biomarker::Glucose => "mmol/L",
            Biomarker::LymphocytePct => "%",
            Biomarker::Mcv => "fL",
            Biomarker::Rdw => "%",
            Biomarker::Alp => "U/L",
            Biomarker::Wbc => "10^9/L",
        }
    }

    pub fn conversion(&self) -> Conversion {
        match self {
            Biomarker::Crp => Conversion::ScaleThenLog {
                factor: CRP_MG_DL_TO_MG_L,
                floor: CRP_LOG_FLOOR_MG_L,
            },
            Biomarker::Albumin => Conversion::Scale(ALBUMIN_G_DL_TO_G_L),
            Biomarker::Creatinine => Conversion::Scale(CREATININE_MG_DL_TO_UMOL_L),
            Biomarker::Glucose => Conversion::Scale(GLUCOSE_MG_DL_TO_MMOL_L),
            Biomarker::LymphocytePct
            | Biomarker::Mcv
            | Biomarker::Rdw
            | Biomarker::Alp
            | Biomarker::Wbc => Conversion::Identity,
        }
    }

    /// Published population reference value in formula units, used when
    /// the biomarker is entirely absent from a run.
    pub fn literature_default(&self) -> f64 {
        match self {
            Biomarker::Crp => 0.5,
            Biomarker::Albumin => 42.0,
            Biomarker::Creatinine => 80.0,
            Biomarker::Glucose => 5.5,
            Biomarker::LymphocytePct => 30.0,
            Biomarker::Mcv => 90.0,
            Biomarker::Rdw => 13.0,
            Biomarker::Alp => 80.0,
            Biomarker::Wbc => 6.5,
        }
    }

    pub fn from_column(name: &str) -> Option<Biomarker> {
        Biomarker::ALL.iter().copied().find(|b| b.column() == name)
    }
}

impl std::fmt::Display for Biomarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.column())
    }
}

/// Convert every canonical biomarker column present in `df` from its
/// native unit to the formula unit, in place. Absent columns stay absent.
pub fn normalize_units(mut df: DataFrame) -> Result<DataFrame> {
    for biomarker in Biomarker::ALL {
        let name = biomarker.column();
        if df.column(name).is_err() {
            continue;
        }

        let conversion = biomarker.conversion();
        if conversion == Conversion::Identity {
            continue;
        }

        let native = df.column(name)?.cast(&DataType::Float64)?;
        let converted: Float64Chunked = native
            .f64()?
            .into_iter()
            .map(|v| v.map(|x| conversion.to_formula(x)))
            .collect();

        df.with_column(converted.with_name(name.into()).into_series())?;
        debug!(
            "Converted {} from {} to {}",
            name,
            biomarker.native_unit(),
            biomarker.formula_unit()
        );
    }

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_every_biomarker() {
        let natives = [0.3, 4.2, 0.9, 100.0, 30.0, 90.0, 13.0, 80.0, 6.5];
        for (biomarker, native) in Biomarker::ALL.iter().zip(natives) {
            let conversion = biomarker.conversion();
            let back = conversion.to_native(conversion.to_formula(native));
            assert!(
                (back - native).abs() < 1e-9,
                "{} did not round-trip: {} -> {}",
                biomarker,
                native,
                back
            );
        }
    }

    #[test]
    fn test_zero_crp_is_finite() {
        let value = Biomarker::Crp.conversion().to_formula(0.0);
        assert!(value.is_finite());
        assert!((value - CRP_LOG_FLOOR_MG_L.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_units_scales_in_place() {
        let df = df! {
            "albumin" => [Some(4.2f64), None],
            "creatinine" => [Some(1.0f64), Some(0.5)],
            "mcv" => [Some(90.0f64), Some(88.0)],
        }
        .unwrap();

        let out = normalize_units(df).unwrap();
        let albumin = out.column("albumin").unwrap().f64().unwrap();
        assert!((albumin.get(0).unwrap() - 42.0).abs() < 1e-9);
        assert!(albumin.get(1).is_none(), "missing cells stay missing");

        let creatinine = out.column("creatinine").unwrap().f64().unwrap();
        assert!((creatinine.get(0).unwrap() - 88.4).abs() < 1e-9);

        let mcv = out.column("mcv").unwrap().f64().unwrap();
        assert_eq!(mcv.get(0), Some(90.0));
        assert!(out.column("glucose").is_err(), "absent columns are not invented");
    }
}
