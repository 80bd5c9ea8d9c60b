//! Pipeline configuration and named presets

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::{
    AliasTable, ClipPolicy, CompletenessPolicy, EligibilityConfig, ImputationPolicy, LoaderConfig,
};

/// Named configuration preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    #[default]
    Canonical,
    /// Wider clipping, RDW fallback alias and relaxed completeness
    Legacy,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::Canonical => write!(f, "canonical"),
            Preset::Legacy => write!(f, "legacy"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "canonical" => Ok(Preset::Canonical),
            "legacy" => Ok(Preset::Legacy),
            _ => Err(format!(
                "Invalid preset '{}'. Use 'canonical' or 'legacy'",
                s
            )),
        }
    }
}

/// Everything a run needs; all fields default to the canonical preset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub loader: LoaderConfig,
    pub aliases: AliasTable,
    pub eligibility: EligibilityConfig,
    pub imputation: ImputationPolicy,
    pub clipping: ClipPolicy,
}

impl PipelineConfig {
    pub fn canonical() -> Self {
        Self::default()
    }

    pub fn legacy() -> Self {
        Self {
            aliases: AliasTable::legacy(),
            eligibility: EligibilityConfig {
                completeness: CompletenessPolicy::relaxed(),
                ..EligibilityConfig::default()
            },
            clipping: ClipPolicy::legacy(),
            ..Self::default()
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Canonical => Self::canonical(),
            Preset::Legacy => Self::legacy(),
        }
    }

    /// Read a JSON configuration; omitted fields take canonical defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.aliases.validate()?;
        self.clipping.validate().map_err(PipelineError::Config)?;

        if !(self.eligibility.outlier_z > 0.0) {
            return Err(PipelineError::Config(format!(
                "outlier z threshold must be positive, got {}",
                self.eligibility.outlier_z
            )));
        }
        if let CompletenessPolicy::AtLeast {
            min_present,
            columns,
        } = &self.eligibility.completeness
        {
            if *min_present > columns.len() {
                return Err(PipelineError::Config(format!(
                    "completeness requires {} of only {} columns",
                    min_present,
                    columns.len()
                )));
            }
        }
        if self.loader.max_read_attempts == 0 {
            return Err(PipelineError::Config(
                "max_read_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
