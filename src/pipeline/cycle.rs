//! Collection cycles and source extract kinds

use serde::{Deserialize, Serialize};

/// A survey data-collection wave. Variants are declared in chronological
/// order, so the derived `Ord` is the aggregation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Cycle {
    D,
    E,
    F,
    G,
    H,
    I,
    J,
}

impl Cycle {
    pub const ALL: [Cycle; 7] = [
        Cycle::D,
        Cycle::E,
        Cycle::F,
        Cycle::G,
        Cycle::H,
        Cycle::I,
        Cycle::J,
    ];

    /// File-name suffix and value of the `cycle` column
    pub fn letter(&self) -> &'static str {
        match self {
            Cycle::D => "D",
            Cycle::E => "E",
            Cycle::F => "F",
            Cycle::G => "G",
            Cycle::H => "H",
            Cycle::I => "I",
            Cycle::J => "J",
        }
    }

    /// Calendar span of the wave, e.g. `2005-2006`
    pub fn years(&self) -> &'static str {
        match self {
            Cycle::D => "2005-2006",
            Cycle::E => "2007-2008",
            Cycle::F => "2009-2010",
            Cycle::G => "2011-2012",
            Cycle::H => "2013-2014",
            Cycle::I => "2015-2016",
            Cycle::J => "2017-2018",
        }
    }
}

impl std::fmt::Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl std::str::FromStr for Cycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Cycle::ALL
            .iter()
            .copied()
            .find(|c| c.letter().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown cycle: '{}'. Use one of D, E, F, G, H, I, J.", s))
    }
}

/// The kind of tabular extract a file holds.
///
/// Declaration order is the fixed join order used by the merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Exposure,
    Demographics,
    Biochemistry,
    Crp,
    BloodCount,
    Glucose,
    Hba1c,
    UrineAlbuminCreatinine,
}

impl SourceKind {
    pub const ALL: [SourceKind; 8] = [
        SourceKind::Exposure,
        SourceKind::Demographics,
        SourceKind::Biochemistry,
        SourceKind::Crp,
        SourceKind::BloodCount,
        SourceKind::Glucose,
        SourceKind::Hba1c,
        SourceKind::UrineAlbuminCreatinine,
    ];

    /// Biomarker sources, in join order
    pub const BIOMARKER_SOURCES: [SourceKind; 6] = [
        SourceKind::Biochemistry,
        SourceKind::Crp,
        SourceKind::BloodCount,
        SourceKind::Glucose,
        SourceKind::Hba1c,
        SourceKind::UrineAlbuminCreatinine,
    ];

    /// Exposure and demographic extracts are required; biomarker
    /// extracts may be legitimately absent.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, SourceKind::Exposure | SourceKind::Demographics)
    }

    /// Default file stem, joined with `_<cycle>.csv`
    pub fn default_stem(&self) -> &'static str {
        match self {
            SourceKind::Exposure => "PFC",
            SourceKind::Demographics => "DEMO",
            SourceKind::Biochemistry => "BIOPRO",
            SourceKind::Crp => "CRP",
            SourceKind::BloodCount => "CBC",
            SourceKind::Glucose => "GLU",
            SourceKind::Hba1c => "GHB",
            SourceKind::UrineAlbuminCreatinine => "ALB_CR",
        }
    }

    /// Cycles released for this kind of extract
    pub fn default_cycles(&self) -> Vec<Cycle> {
        use Cycle::*;
        match self {
            SourceKind::Exposure | SourceKind::Demographics => vec![D, E, F, G],
            SourceKind::Biochemistry => vec![D, F, G, H, I, J],
            SourceKind::Crp => vec![D, E, F],
            SourceKind::BloodCount
            | SourceKind::Glucose
            | SourceKind::Hba1c
            | SourceKind::UrineAlbuminCreatinine => vec![D, E, F, G, H, I, J],
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SourceKind::Exposure => "exposure",
            SourceKind::Demographics => "demographics",
            SourceKind::Biochemistry => "biochemistry",
            SourceKind::Crp => "crp",
            SourceKind::BloodCount => "blood count",
            SourceKind::Glucose => "glucose",
            SourceKind::Hba1c => "hba1c",
            SourceKind::UrineAlbuminCreatinine => "urine albumin/creatinine",
        };
        write!(f, "{}", name)
    }
}
