//! Pipeline module - orchestrates cohort assembly
//!
//! Loader → Aggregator → Standardizer → Merger → Unit Normalizer →
//! Eligibility Filter → Imputation → Scoring → Cohort Table.

pub mod cohort;
pub mod cycle;
pub mod eligibility;
pub mod fields;
pub mod imputation;
pub mod loader;
pub mod merge;
pub mod scoring;
pub mod standardize;
pub mod units;

pub use cohort::*;
pub use cycle::*;
pub use eligibility::*;
pub use imputation::*;
pub use loader::*;
pub use merge::*;
pub use scoring::*;
pub use standardize::*;
pub use units::*;

use std::collections::BTreeMap;

use log::info;
use polars::prelude::DataFrame;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Steps reported to a progress observer, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Loading,
    Standardizing,
    Merging,
    Normalizing,
    Filtering,
    Imputing,
    Scoring,
    Assembling,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PipelineStage::Loading => "Loading source extracts",
            PipelineStage::Standardizing => "Standardizing variable names",
            PipelineStage::Merging => "Merging sources on subject id",
            PipelineStage::Normalizing => "Converting biomarker units",
            PipelineStage::Filtering => "Applying eligibility criteria",
            PipelineStage::Imputing => "Imputing missing biomarkers",
            PipelineStage::Scoring => "Computing PhenoAge",
            PipelineStage::Assembling => "Assembling cohort table",
        };
        write!(f, "{}", label)
    }
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub cohort: DataFrame,
    pub ledger: ExclusionLedger,
    pub outliers: Vec<OutlierPass>,
    pub alias_resolutions: Vec<AliasResolution>,
    pub imputation: ImputationReport,
    pub clipping: ClipReport,
    /// Rows contributed by each cycle of each source that was found
    pub source_rows: Vec<(SourceKind, Vec<(Cycle, usize)>)>,
}

/// Run the whole pipeline.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutput> {
    run_pipeline_with(config, |_| {})
}

/// Run the whole pipeline, calling `on_stage` as each step begins.
pub fn run_pipeline_with<F>(config: &PipelineConfig, mut on_stage: F) -> Result<PipelineOutput>
where
    F: FnMut(PipelineStage),
{
    config.validate()?;

    on_stage(PipelineStage::Loading);
    let mut present: BTreeMap<SourceKind, AggregatedSource> = load_all_sources(&config.loader)?
        .into_iter()
        .filter_map(SourceTable::into_present)
        .map(|s| (s.kind, s))
        .collect();

    let source_rows = present
        .values()
        .map(|s| (s.kind, s.rows_per_cycle.clone()))
        .collect();

    let exposure = present
        .remove(&SourceKind::Exposure)
        .ok_or(PipelineError::MandatorySourceMissing(SourceKind::Exposure))?;
    let demographics = present
        .remove(&SourceKind::Demographics)
        .ok_or(PipelineError::MandatorySourceMissing(SourceKind::Demographics))?;

    on_stage(PipelineStage::Standardizing);
    let mut alias_resolutions = Vec::new();
    let (exposure, mut used) = standardize(exposure.frame, &config.aliases, "exposure")?;
    alias_resolutions.append(&mut used);

    let (demographics, mut used) =
        standardize(demographics.frame, &config.aliases, "demographics")?;
    alias_resolutions.append(&mut used);
    let demographics = decode_demographics(demographics)?;

    let mut biomarkers = Vec::with_capacity(present.len());
    for (kind, source) in present {
        let (frame, mut used) = standardize(source.frame, &config.aliases, &kind.to_string())?;
        alias_resolutions.append(&mut used);
        biomarkers.push((kind, frame));
    }

    on_stage(PipelineStage::Merging);
    let merged = merge_sources(exposure, demographics, biomarkers)?;

    on_stage(PipelineStage::Normalizing);
    let normalized = normalize_units(merged)?;

    on_stage(PipelineStage::Filtering);
    let eligible = apply_eligibility(normalized, &config.eligibility)?;

    on_stage(PipelineStage::Imputing);
    let (imputed, imputation) = impute_biomarkers(eligible.cohort, config.imputation)?;

    on_stage(PipelineStage::Scoring);
    let (scored, clipping) = score_cohort(imputed, &config.clipping)?;

    on_stage(PipelineStage::Assembling);
    let cohort = build_cohort_table(scored)?;
    info!("Final cohort: {} subjects", cohort.height());

    Ok(PipelineOutput {
        cohort,
        ledger: eligible.ledger,
        outliers: eligible.outliers,
        alias_resolutions,
        imputation,
        clipping,
        source_rows,
    })
}
