//! Variable standardization: raw cycle-specific names to canonical fields
//!
//! The alias table is the only place where a raw column is bound to a
//! canonical field. Each canonical field is filled per cell from the first
//! of its aliases that holds a value, so naming drift between cycles
//! (one cycle reports `LBXGLU`, another `LBXSGL`) resolves without averaging.
//! Raw columns are kept under their raw names.

use std::collections::{HashMap, HashSet};

use log::info;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::fields;
use crate::error::{PipelineError, Result};

/// One canonical field and the raw columns that may supply it, highest
/// priority first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasRule {
    pub canonical: String,
    pub aliases: Vec<String>,
}

impl AliasRule {
    pub fn new(canonical: &str, aliases: &[&str]) -> Self {
        Self {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Declarative raw-name to canonical-name mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasTable {
    pub rules: Vec<AliasRule>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::canonical()
    }
}

impl AliasTable {
    /// The reference alias set. RDW comes from `LBXRDW` only and albumin
    /// from `LBXSAL` only (`LBXSAT` is alanine aminotransferase).
    pub fn canonical() -> Self {
        let mut rules = vec![AliasRule::new(fields::SUBJECT_ID, &["SEQN"])];

        rules.extend([
            AliasRule::new("PFOA", &["LBXPFOA", "LBDPFOA", "LBPFOA", "EPFPFOA"]),
            AliasRule::new("PFOS", &["LBXPFOS", "LBDPFOS", "LBPFOS", "EPFPFOS"]),
            AliasRule::new("PFHxS", &["LBXPFHS", "LBDPFHS", "LBPFHS", "EPFPFHXS"]),
            AliasRule::new("PFNA", &["LBXPFNA", "LBDPFNA", "LBPFNA", "EPFPFNA"]),
            AliasRule::new("PFOA_detect", &["LBDPFOL"]),
            AliasRule::new("PFOS_detect", &["LBDPFOSL"]),
            AliasRule::new("PFHxS_detect", &["LBDPFHSL"]),
            AliasRule::new("PFNA_detect", &["LBDPFNAL"]),
        ]);

        rules.extend([
            AliasRule::new(fields::AGE, &["RIDAGEYR"]),
            AliasRule::new(fields::SEX, &["RIAGENDR"]),
            AliasRule::new(fields::RACE_ETHNICITY, &["RIDRETH1"]),
            AliasRule::new(fields::EDUCATION, &["DMDEDUC2"]),
            AliasRule::new(fields::PIR, &["INDFMPIR"]),
            AliasRule::new(fields::PREGNANT, &["RIDEXPRG"]),
            AliasRule::new(fields::SURVEY_WEIGHT, &["WTMEC2YR"]),
            AliasRule::new(fields::PSU, &["SDMVPSU"]),
            AliasRule::new(fields::STRATA, &["SDMVSTRA"]),
        ]);

        rules.extend([
            AliasRule::new("albumin", &["LBXSAL"]),
            AliasRule::new("creatinine", &["LBXSCR"]),
            AliasRule::new("glucose", &["LBXSGL", "LBXGLU"]),
            AliasRule::new("crp", &["LBXCRP"]),
            AliasRule::new("lymphocyte_pct", &["LBXLYPCT"]),
            AliasRule::new("mcv", &["LBXMCVSI"]),
            AliasRule::new("rdw", &["LBXRDW"]),
            AliasRule::new("alp", &["LBXSAPSI"]),
            AliasRule::new("wbc", &["LBXWBCSI"]),
        ]);

        Self { rules }
    }

    /// Older analysis variants that fall back to `LBXRBWSI` when
    /// `LBXRDW` is not reported.
    pub fn legacy() -> Self {
        let mut table = Self::canonical();
        if let Some(rule) = table.rules.iter_mut().find(|r| r.canonical == "rdw") {
            rule.aliases = vec!["LBXRDW".to_string(), "LBXRBWSI".to_string()];
        }
        table
    }

    /// Check that every raw alias feeds exactly one canonical field and
    /// every canonical field is declared once.
    pub fn validate(&self) -> Result<()> {
        let mut canonicals = HashSet::new();
        let mut owner: HashMap<&str, &str> = HashMap::new();

        for rule in &self.rules {
            if !canonicals.insert(rule.canonical.as_str()) {
                return Err(PipelineError::Config(format!(
                    "canonical field '{}' is declared more than once",
                    rule.canonical
                )));
            }
            if rule.aliases.is_empty() {
                return Err(PipelineError::Config(format!(
                    "canonical field '{}' has no raw aliases",
                    rule.canonical
                )));
            }
            for alias in &rule.aliases {
                if let Some(previous) = owner.insert(alias.as_str(), rule.canonical.as_str()) {
                    if previous != rule.canonical {
                        return Err(PipelineError::Config(format!(
                            "raw column '{}' maps to both '{}' and '{}'",
                            alias, previous, rule.canonical
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn rule(&self, canonical: &str) -> Option<&AliasRule> {
        self.rules.iter().find(|r| r.canonical == canonical)
    }
}

/// Cells supplied by one alias
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasUsage {
    pub alias: String,
    pub cells: usize,
}

/// Which aliases actually populated a canonical field in one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AliasResolution {
    pub table: String,
    pub canonical: String,
    pub used: Vec<AliasUsage>,
}

impl AliasResolution {
    /// The alias that supplied the most cells, if any supplied one
    pub fn dominant_alias(&self) -> Option<&str> {
        self.used
            .iter()
            .filter(|u| u.cells > 0)
            .max_by_key(|u| u.cells)
            .map(|u| u.alias.as_str())
    }

    pub fn total_cells(&self) -> usize {
        self.used.iter().map(|u| u.cells).sum()
    }
}

/// Add a canonical column for every rule with at least one alias present.
///
/// `table` names the source in the audit records.
pub fn standardize(
    mut df: DataFrame,
    aliases: &AliasTable,
    table: &str,
) -> Result<(DataFrame, Vec<AliasResolution>)> {
    let mut resolutions = Vec::new();

    for rule in &aliases.rules {
        let present: Vec<&str> = rule
            .aliases
            .iter()
            .map(|a| a.as_str())
            .filter(|a| df.column(a).is_ok())
            .collect();

        if present.is_empty() {
            continue;
        }

        let (column, used) = coalesce_aliases(&df, &rule.canonical, &present)?;
        df.with_column(column)?;

        let resolution = AliasResolution {
            table: table.to_string(),
            canonical: rule.canonical.clone(),
            used,
        };
        log_resolution(&resolution);
        resolutions.push(resolution);
    }

    Ok((df, resolutions))
}

fn log_resolution(resolution: &AliasResolution) {
    let detail = resolution
        .used
        .iter()
        .map(|u| format!("{}={}", u.alias, u.cells))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "[{}] {} <- {} ({})",
        resolution.table,
        resolution.canonical,
        resolution.dominant_alias().unwrap_or("none"),
        detail
    );
}

/// Per-cell first-available merge of `present` aliases into one column.
pub(crate) fn coalesce_aliases(
    df: &DataFrame,
    canonical: &str,
    present: &[&str],
) -> Result<(Series, Vec<AliasUsage>)> {
    let height = df.height();
    let first_dtype = df.column(present[0])?.dtype().clone();

    // Index into `present` of the alias chosen for each row
    let mut chosen: Vec<Option<usize>> = vec![None; height];
    let mut used: Vec<AliasUsage> = present
        .iter()
        .map(|a| AliasUsage {
            alias: a.to_string(),
            cells: 0,
        })
        .collect();

    for (idx, alias) in present.iter().enumerate() {
        let nulls = df.column(alias)?.is_null();
        for (row, is_null) in nulls.into_iter().enumerate() {
            if chosen[row].is_none() && is_null == Some(false) {
                chosen[row] = Some(idx);
                used[idx].cells += 1;
            }
        }
    }

    let column = if first_dtype == DataType::String {
        let sources: Vec<Column> = present
            .iter()
            .map(|a| df.column(a).and_then(|c| c.cast(&DataType::String)))
            .collect::<PolarsResult<_>>()?;
        let views: Vec<&StringChunked> = sources
            .iter()
            .map(|c| c.str())
            .collect::<PolarsResult<_>>()?;
        let values: StringChunked = chosen
            .iter()
            .enumerate()
            .map(|(row, pick)| pick.and_then(|i| views[i].get(row)))
            .collect();
        values.with_name(canonical.into()).into_series()
    } else {
        let sources: Vec<Column> = present
            .iter()
            .map(|a| df.column(a).and_then(|c| c.cast(&DataType::Float64)))
            .collect::<PolarsResult<_>>()?;
        let views: Vec<&Float64Chunked> = sources
            .iter()
            .map(|c| c.f64())
            .collect::<PolarsResult<_>>()?;
        let values: Float64Chunked = chosen
            .iter()
            .enumerate()
            .map(|(row, pick)| pick.and_then(|i| views[i].get(row)))
            .collect();
        let column = values.with_name(canonical.into()).into_series();
        if first_dtype.is_integer() {
            column.cast(&first_dtype)?
        } else {
            column
        }
    };

    Ok((column, used))
}

fn decode_code(code: Option<f64>, labels: &[(i64, &'static str)]) -> Option<&'static str> {
    let code = code?;
    labels
        .iter()
        .find(|(c, _)| (*c as f64 - code).abs() < 1e-9)
        .map(|(_, label)| *label)
}

const SEX_LABELS: [(i64, &str); 2] = [(1, "Male"), (2, "Female")];

const RACE_LABELS: [(i64, &str); 5] = [
    (1, "Mexican American"),
    (2, "Other Hispanic"),
    (3, "Non-Hispanic White"),
    (4, "Non-Hispanic Black"),
    (5, "Other Race"),
];

const EDUCATION_LABELS: [(i64, &str); 5] = [
    (1, "Less than 9th grade"),
    (2, "9-11th grade"),
    (3, "High school graduate"),
    (4, "Some college"),
    (5, "College graduate or above"),
];

const PREGNANCY_LABELS: [(i64, &str); 3] = [(1, "Yes"), (2, "No"), (3, "Unknown")];

/// Numeric codes of a column, including codes stored as text. `None` when
/// the column holds labels rather than codes.
fn numeric_codes(column: &Column) -> PolarsResult<Option<Column>> {
    let codes = column.cast(&DataType::Float64)?;
    if column.dtype() == &DataType::String && codes.null_count() != column.null_count() {
        return Ok(None);
    }
    Ok(Some(codes))
}

/// Replace coded demographic fields with their labels. Unrecognized codes
/// become missing; fields already holding labels are left alone.
pub fn decode_demographics(mut df: DataFrame) -> Result<DataFrame> {
    let codebooks: [(&str, &[(i64, &'static str)]); 4] = [
        (fields::SEX, &SEX_LABELS),
        (fields::RACE_ETHNICITY, &RACE_LABELS),
        (fields::EDUCATION, &EDUCATION_LABELS),
        (fields::PREGNANT, &PREGNANCY_LABELS),
    ];

    for (name, labels) in codebooks {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let Some(codes) = numeric_codes(column)? else {
            continue;
        };
        let decoded: StringChunked = codes
            .f64()?
            .into_iter()
            .map(|code| decode_code(code, labels))
            .collect();
        df.with_column(decoded.with_name(name.into()).into_series())?;
    }

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_table_is_valid() {
        AliasTable::canonical().validate().unwrap();
        AliasTable::legacy().validate().unwrap();
    }

    #[test]
    fn test_albumin_never_reads_alt() {
        let rule = AliasTable::canonical().rule("albumin").cloned().unwrap();
        assert_eq!(rule.aliases, vec!["LBXSAL".to_string()]);
    }

    #[test]
    fn test_legacy_rdw_keeps_lbxrdw_first() {
        let rule = AliasTable::legacy().rule("rdw").cloned().unwrap();
        assert_eq!(rule.aliases, vec!["LBXRDW".to_string(), "LBXRBWSI".to_string()]);
    }

    #[test]
    fn test_shared_alias_rejected() {
        let table = AliasTable {
            rules: vec![
                AliasRule::new("glucose", &["LBXGLU"]),
                AliasRule::new("hba1c", &["LBXGLU"]),
            ],
        };
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("LBXGLU"));
    }

    #[test]
    fn test_decode_codes_stored_as_text() {
        let df = df! {
            "sex" => [Some("1.0"), Some("2"), None],
            "pregnant" => [Some("1.0"), Some("2.0"), None],
            "education" => [Some("Some college"), None, None],
        }
        .unwrap();
        let decoded = decode_demographics(df).unwrap();

        let sex: Vec<Option<&str>> = decoded
            .column("sex")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(sex, vec![Some("Male"), Some("Female"), None]);
        let pregnant: Vec<Option<&str>> = decoded
            .column("pregnant")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(pregnant, vec![Some("Yes"), Some("No"), None]);
        let education = decoded.column("education").unwrap().str().unwrap().get(0);
        assert_eq!(education, Some("Some college"));
    }

    #[test]
    fn test_decode_unknown_code_is_missing() {
        assert_eq!(decode_code(Some(7.0), &SEX_LABELS), None);
        assert_eq!(decode_code(Some(2.0), &SEX_LABELS), Some("Female"));
        assert_eq!(decode_code(None, &SEX_LABELS), None);
    }
}
