//! Canonical column vocabulary shared by every stage

/// Join key, canonical name of the raw `SEQN`
pub const SUBJECT_ID: &str = "subject_id";
/// Cycle letter injected at load time
pub const CYCLE: &str = "cycle";
/// Calendar span of the cycle
pub const CYCLE_YEARS: &str = "cycle_years";

pub const AGE: &str = "age";
pub const SEX: &str = "sex";
pub const RACE_ETHNICITY: &str = "race_ethnicity";
pub const EDUCATION: &str = "education";
pub const PIR: &str = "pir";
pub const PREGNANT: &str = "pregnant";
pub const SURVEY_WEIGHT: &str = "survey_weight";
pub const PSU: &str = "psu";
pub const STRATA: &str = "strata";

/// Demographic fields carried into the cohort, in output order
pub const DEMOGRAPHICS: [&str; 9] = [
    AGE,
    SEX,
    RACE_ETHNICITY,
    EDUCATION,
    PIR,
    PREGNANT,
    SURVEY_WEIGHT,
    PSU,
    STRATA,
];

/// The four exposure analytes
pub const EXPOSURES: [&str; 4] = ["PFOA", "PFOS", "PFHxS", "PFNA"];

/// Detection-limit flags paired with [`EXPOSURES`]
pub const EXPOSURE_DETECT_FLAGS: [&str; 4] =
    ["PFOA_detect", "PFOS_detect", "PFHxS_detect", "PFNA_detect"];

pub const PHENOAGE: &str = "phenoage";
pub const PHENOAGE_ACCEL: &str = "phenoage_accel";

pub const TOTAL_EXPOSURE: &str = "total_exposure";
pub const EXPOSURE_QUARTILE: &str = "exposure_quartile";

/// Name of the log-transformed column for an exposure analyte
pub fn log_exposure(analyte: &str) -> String {
    format!("log_{}", analyte)
}
