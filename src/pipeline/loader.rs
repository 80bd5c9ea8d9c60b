//! Source table loading and cross-cycle aggregation
//!
//! One extract per (source kind, cycle) pair. A missing file means the
//! cycle is not available for that source; a file that exists but cannot be
//! parsed aborts the run.

use std::collections::BTreeMap;
use std::io::{Cursor, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info, warn};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::cycle::{Cycle, SourceKind};
use super::fields;
use crate::error::{PipelineError, Result};

/// Where one kind of extract lives and which cycles to look for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLayout {
    pub kind: SourceKind,
    /// File stem; the file name is `<stem>_<cycle>.<extension>`
    pub stem: String,
    pub cycles: Vec<Cycle>,
}

impl SourceLayout {
    pub fn default_for(kind: SourceKind) -> Self {
        Self {
            kind,
            stem: kind.default_stem().to_string(),
            cycles: kind.default_cycles(),
        }
    }
}

/// Loader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub data_dir: PathBuf,
    /// Raw subject identifier column present in every extract
    pub id_column: String,
    /// File extension: `csv` or `parquet`
    pub extension: String,
    pub sources: Vec<SourceLayout>,
    /// Rows used for CSV schema inference (0 = full scan)
    pub infer_schema_length: usize,
    /// Read attempts on transient I/O failure
    pub max_read_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            id_column: "SEQN".to_string(),
            extension: "csv".to_string(),
            sources: SourceKind::ALL
                .iter()
                .map(|k| SourceLayout::default_for(*k))
                .collect(),
            infer_schema_length: 10000,
            max_read_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}

impl LoaderConfig {
    pub fn layout(&self, kind: SourceKind) -> Option<&SourceLayout> {
        self.sources.iter().find(|s| s.kind == kind)
    }

    pub fn path_for(&self, kind: SourceKind, cycle: Cycle) -> PathBuf {
        let stem = self
            .layout(kind)
            .map(|l| l.stem.as_str())
            .unwrap_or_else(|| kind.default_stem());
        self.data_dir
            .join(format!("{}_{}.{}", stem, cycle.letter(), self.extension))
    }
}

/// One source kind concatenated across its available cycles
#[derive(Debug, Clone)]
pub struct AggregatedSource {
    pub kind: SourceKind,
    pub frame: DataFrame,
    /// Rows contributed by each cycle, chronological
    pub rows_per_cycle: Vec<(Cycle, usize)>,
}

/// Result of aggregating one source kind.
///
/// `Absent` is returned instead of an empty frame so that a source with no
/// cycles at all cannot pass for a valid zero-row table.
#[derive(Debug, Clone)]
pub enum SourceTable {
    Present(AggregatedSource),
    Absent(SourceKind),
}

impl SourceTable {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceTable::Present(source) => source.kind,
            SourceTable::Absent(kind) => *kind,
        }
    }

    /// Unwrap a source the cohort cannot be built without
    pub fn require(self) -> Result<AggregatedSource> {
        match self {
            SourceTable::Present(source) => Ok(source),
            SourceTable::Absent(kind) => Err(PipelineError::MandatorySourceMissing(kind)),
        }
    }

    pub fn into_present(self) -> Option<AggregatedSource> {
        match self {
            SourceTable::Present(source) => Some(source),
            SourceTable::Absent(_) => None,
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}

/// Read a file, retrying transient failures. `Ok(None)` when it does not exist.
fn read_with_retry(path: &Path, attempts: u32, backoff_ms: u64) -> Result<Option<Vec<u8>>> {
    read_with_retry_using(path, attempts, backoff_ms, |p| std::fs::read(p))
}

fn read_with_retry_using<F>(
    path: &Path,
    attempts: u32,
    backoff_ms: u64,
    mut read: F,
) -> Result<Option<Vec<u8>>>
where
    F: FnMut(&Path) -> std::io::Result<Vec<u8>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match read(path) {
            Ok(bytes) => return Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) if is_transient(&err) && attempt < attempts => {
                warn!(
                    "Transient error reading {} (attempt {}/{}): {}",
                    path.display(),
                    attempt,
                    attempts,
                    err
                );
                std::thread::sleep(Duration::from_millis(backoff_ms * attempt as u64));
                attempt += 1;
            }
            Err(err) => {
                return Err(PipelineError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

fn parse_table(
    bytes: Vec<u8>,
    extension: &str,
    infer_schema_length: usize,
) -> PolarsResult<DataFrame> {
    match extension {
        "parquet" => ParquetReader::new(Cursor::new(bytes)).finish(),
        _ => {
            let schema_length = if infer_schema_length == 0 {
                None
            } else {
                Some(infer_schema_length)
            };
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(schema_length)
                .into_reader_with_file_handle(Cursor::new(bytes))
                .finish()
        }
    }
}

/// Cast the id column to Int64 and every other numeric column to Float64 so
/// that the same column from different cycles has one dtype.
fn harmonize_dtypes(mut df: DataFrame, id_column: &str) -> PolarsResult<DataFrame> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    for name in names {
        let column = df.column(&name)?;
        let target = if name == id_column {
            DataType::Int64
        } else if column.dtype().is_primitive_numeric() {
            DataType::Float64
        } else {
            continue;
        };
        if column.dtype() != &target {
            let cast = column.cast(&target)?;
            df.with_column(cast)?;
        }
    }

    Ok(df)
}

/// Load the extract for one (kind, cycle) pair.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_source_table(
    config: &LoaderConfig,
    kind: SourceKind,
    cycle: Cycle,
) -> Result<Option<DataFrame>> {
    let path = config.path_for(kind, cycle);
    let malformed = |reason: String| PipelineError::Malformed {
        kind,
        cycle,
        path: path.clone(),
        reason,
    };

    let extension = config.extension.to_lowercase();
    if extension != "csv" && extension != "parquet" {
        return Err(malformed(format!(
            "Unsupported file format: {}. Supported formats: csv, parquet",
            extension
        )));
    }

    let Some(bytes) = read_with_retry(&path, config.max_read_attempts, config.retry_backoff_ms)?
    else {
        debug!("{} cycle {}: no extract at {}", kind, cycle, path.display());
        return Ok(None);
    };

    let df = parse_table(bytes, &extension, config.infer_schema_length)
        .map_err(|e| malformed(e.to_string()))?;

    let id = df
        .column(&config.id_column)
        .map_err(|_| malformed(format!("subject id column '{}' not found", config.id_column)))?;
    let raw_nulls = id.null_count();
    if id.dtype().is_float() {
        let values = id.cast(&DataType::Float64)?;
        let fractional = values
            .f64()?
            .into_iter()
            .flatten()
            .any(|v| v.fract() != 0.0);
        if fractional {
            return Err(malformed(format!(
                "subject id column '{}' contains fractional values",
                config.id_column
            )));
        }
    }

    let df = harmonize_dtypes(df, &config.id_column).map_err(|e| malformed(e.to_string()))?;
    if raw_nulls > 0 || df.column(&config.id_column)?.null_count() > 0 {
        return Err(malformed(format!(
            "subject id column '{}' contains missing or non-integer values",
            config.id_column
        )));
    }

    debug!("{} cycle {}: {} rows from {}", kind, cycle, df.height(), path.display());
    Ok(Some(df))
}

/// Concatenate per-cycle tables of one kind in chronological order.
///
/// Every row gets `cycle` and `cycle_years`; columns missing from a cycle
/// are filled with nulls.
pub fn aggregate_cycles(
    kind: SourceKind,
    mut tables: Vec<(Cycle, DataFrame)>,
) -> Result<SourceTable> {
    if tables.is_empty() {
        return Ok(SourceTable::Absent(kind));
    }
    tables.sort_by_key(|(cycle, _)| *cycle);

    // Column union in order of first appearance. A column that is entirely
    // blank in a cycle carries no type of its own; the first cycle with
    // values decides.
    let mut union: Vec<(String, DataType)> = Vec::new();
    let mut typed_by_blank: Vec<bool> = Vec::new();
    let mut tagged = Vec::with_capacity(tables.len());
    let mut rows_per_cycle = Vec::with_capacity(tables.len());

    for (cycle, mut df) in tables {
        let height = df.height();
        df.with_column(Series::new(fields::CYCLE.into(), vec![cycle.letter(); height]))?;
        df.with_column(Series::new(fields::CYCLE_YEARS.into(), vec![cycle.years(); height]))?;

        for column in df.get_columns() {
            let name = column.name().to_string();
            let blank = column.null_count() == column.len();
            match union.iter().position(|(n, _)| n == &name) {
                Some(idx) if typed_by_blank[idx] && !blank => {
                    union[idx].1 = column.dtype().clone();
                    typed_by_blank[idx] = false;
                }
                Some(_) => {}
                None => {
                    union.push((name, column.dtype().clone()));
                    typed_by_blank.push(blank);
                }
            }
        }
        rows_per_cycle.push((cycle, height));
        tagged.push(df);
    }

    let mut combined: Option<DataFrame> = None;
    for mut df in tagged {
        let height = df.height();
        for (name, dtype) in &union {
            let existing = df.column(name).ok().map(|c| c.dtype().clone());
            match existing {
                Some(found) if &found != dtype => {
                    warn!(
                        "{}: column {} has mixed types across cycles, casting to {}",
                        kind, name, dtype
                    );
                    let cast = df.column(name)?.cast(dtype)?;
                    df.with_column(cast)?;
                }
                Some(_) => {}
                None => {
                    df.with_column(Series::full_null(name.as_str().into(), height, dtype))?;
                }
            }
        }
        let df = df.select(union.iter().map(|(n, _)| n.as_str()))?;

        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&df)?;
            }
            None => combined = Some(df),
        }
    }

    let frame = combined.unwrap_or_default();
    info!(
        "{}: {} rows across {} cycle(s)",
        kind,
        frame.height(),
        rows_per_cycle.len()
    );

    Ok(SourceTable::Present(AggregatedSource {
        kind,
        frame,
        rows_per_cycle,
    }))
}

/// Load every configured (kind, cycle) pair in parallel and aggregate per
/// kind. Output order follows `SourceKind` declaration order and does not
/// depend on scheduling.
pub fn load_all_sources(config: &LoaderConfig) -> Result<Vec<SourceTable>> {
    let jobs: Vec<(SourceKind, Cycle)> = SourceKind::ALL
        .iter()
        .filter_map(|kind| config.layout(*kind))
        .flat_map(|layout| layout.cycles.iter().map(move |c| (layout.kind, *c)))
        .collect();

    let loaded: Vec<(SourceKind, Cycle, Option<DataFrame>)> = jobs
        .par_iter()
        .map(|(kind, cycle)| load_source_table(config, *kind, *cycle).map(|t| (*kind, *cycle, t)))
        .collect::<Result<Vec<_>>>()?;

    let mut by_kind: BTreeMap<SourceKind, Vec<(Cycle, DataFrame)>> = BTreeMap::new();
    for (kind, cycle, df) in loaded {
        if let Some(df) = df {
            by_kind.entry(kind).or_default().push((cycle, df));
        }
    }

    let mut tables = Vec::new();
    for kind in SourceKind::ALL {
        if config.layout(kind).is_none() {
            continue;
        }
        let per_cycle = by_kind.remove(&kind).unwrap_or_default();
        let table = aggregate_cycles(kind, per_cycle)?;
        if let SourceTable::Absent(kind) = &table {
            if kind.is_mandatory() {
                warn!("No {} extracts found", kind);
            } else {
                info!("No {} extracts found; continuing without them", kind);
            }
        }
        tables.push(table);
    }

    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_uses_stem_and_cycle() {
        let config = LoaderConfig {
            data_dir: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(
            config.path_for(SourceKind::UrineAlbuminCreatinine, Cycle::H),
            PathBuf::from("/data/ALB_CR_H.csv")
        );
    }

    #[test]
    fn test_aggregate_no_cycles_is_absent() {
        let table = aggregate_cycles(SourceKind::Crp, Vec::new()).unwrap();
        assert!(matches!(table, SourceTable::Absent(SourceKind::Crp)));
        assert!(matches!(
            table.require(),
            Err(PipelineError::MandatorySourceMissing(SourceKind::Crp))
        ));
    }

    #[test]
    fn test_aggregate_sorts_cycles_and_unions_columns() {
        let later = df! {
            "SEQN" => [3i64],
            "LBXRDW" => [13.5f64],
        }
        .unwrap();
        let earlier = df! {
            "SEQN" => [1i64, 2],
            "LBXRBWSI" => [12.0f64, 14.0],
        }
        .unwrap();

        let table = aggregate_cycles(
            SourceKind::BloodCount,
            vec![(Cycle::G, later), (Cycle::D, earlier)],
        )
        .unwrap();
        let source = table.into_present().unwrap();

        assert_eq!(source.rows_per_cycle, vec![(Cycle::D, 2), (Cycle::G, 1)]);
        let df = source.frame;
        assert_eq!(df.height(), 3);

        let cycles: Vec<Option<&str>> = df
            .column("cycle")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(cycles, vec![Some("D"), Some("D"), Some("G")]);

        let rdw = df.column("LBXRDW").unwrap();
        assert_eq!(rdw.null_count(), 2, "absent columns are null, not zero");
    }

    #[test]
    fn test_blank_column_takes_type_of_later_cycle() {
        let blank = DataFrame::new(vec![
            Column::new("SEQN".into(), [1i64, 2]),
            Column::new("RIDEXPRG".into(), [None::<&str>, None]),
        ])
        .unwrap();
        let coded = df! {
            "SEQN" => [101i64],
            "RIDEXPRG" => [1.0f64],
        }
        .unwrap();

        let source = aggregate_cycles(
            SourceKind::Demographics,
            vec![(Cycle::D, blank), (Cycle::E, coded)],
        )
        .unwrap()
        .into_present()
        .unwrap();

        let pregnant = source.frame.column("RIDEXPRG").unwrap();
        assert_eq!(pregnant.dtype(), &DataType::Float64);
        let codes: Vec<Option<f64>> = pregnant.f64().unwrap().into_iter().collect();
        assert_eq!(codes, vec![None, None, Some(1.0)]);
    }

    #[test]
    fn test_retry_recovers_from_transient_errors() {
        let mut calls = 0;
        let bytes = read_with_retry_using(Path::new("CRP_D.csv"), 3, 0, |_| {
            calls += 1;
            if calls < 3 {
                Err(std::io::Error::from(ErrorKind::Interrupted))
            } else {
                Ok(b"SEQN\n1\n".to_vec())
            }
        })
        .unwrap();
        assert_eq!(bytes, Some(b"SEQN\n1\n".to_vec()));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_gives_up_after_attempt_limit() {
        let mut calls = 0;
        let err = read_with_retry_using(Path::new("CRP_D.csv"), 3, 0, |_| {
            calls += 1;
            Err(std::io::Error::from(ErrorKind::TimedOut))
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_skips_missing_and_content_errors() {
        let mut calls = 0;
        let missing = read_with_retry_using(Path::new("CRP_D.csv"), 3, 0, |_| {
            calls += 1;
            Err(std::io::Error::from(ErrorKind::NotFound))
        })
        .unwrap();
        assert!(missing.is_none());
        assert_eq!(calls, 1);

        let mut calls = 0;
        let err = read_with_retry_using(Path::new("CRP_D.csv"), 3, 0, |_| {
            calls += 1;
            Err(std::io::Error::from(ErrorKind::InvalidData))
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert_eq!(calls, 1);
    }
}
