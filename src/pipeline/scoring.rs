//! Biological-age scoring engine (Levine 2018 phenotypic age)
//!
//! [`phenoage`] maps nine biomarkers in formula units plus chronological age
//! to a score in years via a linear predictor, a Gompertz mortality transform
//! and its inversion. Every numerical guard is a bound in [`ClipPolicy`] and
//! every guard that engages is reported back to the caller.

use std::collections::BTreeMap;

use log::{info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::fields;
use super::units::Biomarker;
use crate::error::{PipelineError, Result};

pub const INTERCEPT: f64 = -19.90667;
pub const COEF_ALBUMIN: f64 = -0.03359355;
pub const COEF_CREATININE: f64 = 0.009506491;
pub const COEF_GLUCOSE: f64 = 0.1953192;
pub const COEF_LOG_CRP: f64 = 0.09536762;
pub const COEF_LYMPHOCYTE_PCT: f64 = -0.01199984;
pub const COEF_MCV: f64 = 0.02676401;
pub const COEF_RDW: f64 = 0.3306156;
pub const COEF_ALP: f64 = 0.001868778;
pub const COEF_WBC: f64 = 0.05542406;
pub const COEF_AGE: f64 = 0.08035356;

/// Gompertz shape parameter
pub const GAMMA: f64 = 0.007692696;
/// Multiplier of `exp(xb) / GAMMA` in the mortality exponent
pub const MORTALITY_SCALE: f64 = -1.51714;
/// Multiplier of `ln(1 - m)` inside the inversion
pub const INVERSION_SCALE: f64 = -0.0055305;
pub const SCORE_INTERCEPT: f64 = 141.50225;
pub const SCORE_DIVISOR: f64 = 0.09165;

/// Closed interval used by one numerical guard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lo: f64,
    pub hi: f64,
}

impl Bounds {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// Clamp `value`, returning whether the bound engaged.
    /// NaN maps to `lo`.
    pub fn apply(&self, value: f64) -> (f64, bool) {
        if value.is_nan() {
            (self.lo, true)
        } else if value < self.lo {
            (self.lo, true)
        } else if value > self.hi {
            (self.hi, true)
        } else {
            (value, false)
        }
    }
}

/// Guarded steps of the transform, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipStage {
    LinearPredictor,
    MortalityExponent,
    Mortality,
    Survival,
    InversionTerm,
    Score,
}

impl ClipStage {
    pub const ALL: [ClipStage; 6] = [
        ClipStage::LinearPredictor,
        ClipStage::MortalityExponent,
        ClipStage::Mortality,
        ClipStage::Survival,
        ClipStage::InversionTerm,
        ClipStage::Score,
    ];
}

impl std::fmt::Display for ClipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ClipStage::LinearPredictor => "linear predictor",
            ClipStage::MortalityExponent => "mortality exponent",
            ClipStage::Mortality => "mortality",
            ClipStage::Survival => "survival",
            ClipStage::InversionTerm => "inversion term",
            ClipStage::Score => "score",
        };
        write!(f, "{}", label)
    }
}

/// Every bound the scoring transform applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipPolicy {
    pub linear_predictor: Bounds,
    pub mortality_exponent: Bounds,
    pub mortality: Bounds,
    pub survival: Bounds,
    pub inversion_term: Bounds,
    pub score: Bounds,
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ClipPolicy {
    pub fn canonical() -> Self {
        Self {
            linear_predictor: Bounds::new(-20.0, 5.0),
            mortality_exponent: Bounds::new(-700.0, 0.0),
            mortality: Bounds::new(1e-10, 1.0 - 1e-10),
            survival: Bounds::new(1e-100, 1.0),
            inversion_term: Bounds::new(1e-100, 1e100),
            score: Bounds::new(10.0, 110.0),
        }
    }

    /// Wider predictor and score range used by earlier analysis runs
    pub fn legacy() -> Self {
        Self {
            linear_predictor: Bounds::new(-10.0, 10.0),
            score: Bounds::new(0.0, 120.0),
            ..Self::canonical()
        }
    }

    pub fn bounds(&self, stage: ClipStage) -> Bounds {
        match stage {
            ClipStage::LinearPredictor => self.linear_predictor,
            ClipStage::MortalityExponent => self.mortality_exponent,
            ClipStage::Mortality => self.mortality,
            ClipStage::Survival => self.survival,
            ClipStage::InversionTerm => self.inversion_term,
            ClipStage::Score => self.score,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for stage in ClipStage::ALL {
            let b = self.bounds(stage);
            if !(b.lo <= b.hi) {
                return Err(format!("{} bounds are inverted: [{}, {}]", stage, b.lo, b.hi));
            }
        }
        Ok(())
    }
}

/// One subject's scoring inputs, all in formula units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomarkerPanel {
    /// g/L
    pub albumin: f64,
    /// µmol/L
    pub creatinine: f64,
    /// mmol/L
    pub glucose: f64,
    /// ln(mg/L)
    pub log_crp: f64,
    pub lymphocyte_pct: f64,
    pub mcv: f64,
    pub rdw: f64,
    pub alp: f64,
    pub wbc: f64,
    /// years
    pub age: f64,
}

impl BiomarkerPanel {
    /// Unclipped weighted sum
    pub fn linear_predictor(&self) -> f64 {
        INTERCEPT
            + COEF_ALBUMIN * self.albumin
            + COEF_CREATININE * self.creatinine
            + COEF_GLUCOSE * self.glucose
            + COEF_LOG_CRP * self.log_crp
            + COEF_LYMPHOCYTE_PCT * self.lymphocyte_pct
            + COEF_MCV * self.mcv
            + COEF_RDW * self.rdw
            + COEF_ALP * self.alp
            + COEF_WBC * self.wbc
            + COEF_AGE * self.age
    }

    fn set(&mut self, biomarker: Biomarker, value: f64) {
        match biomarker {
            Biomarker::Crp => self.log_crp = value,
            Biomarker::Albumin => self.albumin = value,
            Biomarker::Creatinine => self.creatinine = value,
            Biomarker::Glucose => self.glucose = value,
            Biomarker::LymphocytePct => self.lymphocyte_pct = value,
            Biomarker::Mcv => self.mcv = value,
            Biomarker::Rdw => self.rdw = value,
            Biomarker::Alp => self.alp = value,
            Biomarker::Wbc => self.wbc = value,
        }
    }

    /// Population reference panel at the given age
    pub fn reference(age: f64) -> Self {
        let mut panel = BiomarkerPanel {
            albumin: 0.0,
            creatinine: 0.0,
            glucose: 0.0,
            log_crp: 0.0,
            lymphocyte_pct: 0.0,
            mcv: 0.0,
            rdw: 0.0,
            alp: 0.0,
            wbc: 0.0,
            age,
        };
        for biomarker in Biomarker::ALL {
            panel.set(biomarker, biomarker.literature_default());
        }
        panel
    }
}

/// Output of [`phenoage`] for one subject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhenoAgeResult {
    pub score: f64,
    /// `score - age`
    pub acceleration: f64,
    /// Clipped linear predictor
    pub linear_predictor: f64,
    /// Clamped 10-year mortality probability
    pub mortality: f64,
    /// Which guards engaged, indexed like [`ClipStage::ALL`]
    pub clipped: [bool; 6],
}

impl PhenoAgeResult {
    pub fn was_clipped(&self, stage: ClipStage) -> bool {
        self.clipped[stage as usize]
    }
}

/// Score one panel.
///
/// The result is finite for any finite input and always lies inside the
/// policy's score bounds.
pub fn phenoage(panel: &BiomarkerPanel, policy: &ClipPolicy) -> PhenoAgeResult {
    let mut clipped = [false; 6];

    let (xb, c) = policy.linear_predictor.apply(panel.linear_predictor());
    clipped[ClipStage::LinearPredictor as usize] = c;

    let (exponent, c) = policy
        .mortality_exponent
        .apply(MORTALITY_SCALE * xb.exp() / GAMMA);
    clipped[ClipStage::MortalityExponent as usize] = c;

    let (mortality, c) = policy.mortality.apply(1.0 - exponent.exp());
    clipped[ClipStage::Mortality as usize] = c;

    let (survival, c) = policy.survival.apply(1.0 - mortality);
    clipped[ClipStage::Survival as usize] = c;

    let (term, c) = policy.inversion_term.apply(INVERSION_SCALE * survival.ln());
    clipped[ClipStage::InversionTerm as usize] = c;

    let (score, c) = policy.score.apply(SCORE_INTERCEPT + term.ln() / SCORE_DIVISOR);
    clipped[ClipStage::Score as usize] = c;

    PhenoAgeResult {
        score,
        acceleration: score - panel.age,
        linear_predictor: xb,
        mortality,
        clipped,
    }
}

/// How often each guard engaged over a scored cohort
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClipReport {
    pub rows: usize,
    pub counts: BTreeMap<ClipStage, usize>,
}

impl ClipReport {
    pub fn observe(&mut self, result: &PhenoAgeResult) {
        self.rows += 1;
        for stage in ClipStage::ALL {
            if result.was_clipped(stage) {
                *self.counts.entry(stage).or_insert(0) += 1;
            }
        }
    }

    pub fn count(&self, stage: ClipStage) -> usize {
        self.counts.get(&stage).copied().unwrap_or(0)
    }

    pub fn fraction(&self, stage: ClipStage) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.count(stage) as f64 / self.rows as f64
        }
    }

    pub fn any_clipped(&self) -> bool {
        self.counts.values().any(|n| *n > 0)
    }
}

fn input_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df.column(name).map_err(|_| PipelineError::MissingColumn {
        table: "cohort".to_string(),
        column: name.to_string(),
    })?;
    let values = column.cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

/// Append `phenoage` and `phenoage_accel` columns.
///
/// Rows with any missing input receive a missing score.
pub fn score_cohort(mut df: DataFrame, policy: &ClipPolicy) -> Result<(DataFrame, ClipReport)> {
    let ages = input_values(&df, fields::AGE)?;
    let mut inputs = Vec::with_capacity(Biomarker::ALL.len());
    for biomarker in Biomarker::ALL {
        inputs.push((biomarker, input_values(&df, biomarker.column())?));
    }

    let mut report = ClipReport::default();
    let mut scores = Vec::with_capacity(df.height());
    let mut accels = Vec::with_capacity(df.height());
    let mut unscored = 0usize;

    for (row, age) in ages.iter().enumerate() {
        let Some(age) = *age else {
            unscored += 1;
            scores.push(None);
            accels.push(None);
            continue;
        };

        let mut panel = BiomarkerPanel::reference(age);
        let mut complete = true;
        for (biomarker, values) in &inputs {
            match values[row] {
                Some(v) => panel.set(*biomarker, v),
                None => complete = false,
            }
        }

        if complete {
            let result = phenoage(&panel, policy);
            report.observe(&result);
            scores.push(Some(result.score));
            accels.push(Some(result.acceleration));
        } else {
            unscored += 1;
            scores.push(None);
            accels.push(None);
        }
    }

    if unscored > 0 {
        warn!("{} subject(s) left unscored due to missing inputs", unscored);
    }
    for stage in ClipStage::ALL {
        let n = report.count(stage);
        if n > 0 {
            info!(
                "Clip on {} engaged for {} row(s) ({:.2}%)",
                stage,
                n,
                100.0 * report.fraction(stage)
            );
        }
    }

    df.with_column(Series::new(fields::PHENOAGE.into(), scores))?;
    df.with_column(Series::new(fields::PHENOAGE_ACCEL.into(), accels))?;
    Ok((df, report))
}
