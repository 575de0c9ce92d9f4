//! Tabular datasets and their typed records
//!
//! A [`Table`] is the raw relation as loaded (column names plus cells that
//! may be missing, numeric or text). Typed records ([`MskEpisode`],
//! [`OncEpisode`], [`QualityMeasure`], [`DrugLine`]) are projected from a
//! table once, with every optional field an explicit `Option`.

pub mod records;
pub mod table;

pub use records::{
    CancerType, DrugLine, EolDirection, EolMeasure, Episode, EpisodeCore, FromRow, MeasureCode,
    MskEpisode, MskEpisodeType, OncEpisode, QualityMeasure,
};
pub use table::{Cell, Row, Table};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five input datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    MskEpisodes,
    MskQuality,
    OncEpisodes,
    OncQuality,
    OncDrugDetail,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::MskEpisodes,
        DatasetKind::MskQuality,
        DatasetKind::OncEpisodes,
        DatasetKind::OncQuality,
        DatasetKind::OncDrugDetail,
    ];

    /// Dataset name as used in flag narratives
    pub fn name(&self) -> &'static str {
        match self {
            DatasetKind::MskEpisodes => "msk_episodes",
            DatasetKind::MskQuality => "msk_quality",
            DatasetKind::OncEpisodes => "onc_episodes",
            DatasetKind::OncQuality => "onc_quality",
            DatasetKind::OncDrugDetail => "onc_drug_detail",
        }
    }

    /// Input file name inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            DatasetKind::MskEpisodes => "msk_episodes.csv",
            DatasetKind::MskQuality => "msk_quality.csv",
            DatasetKind::OncEpisodes => "onc_episodes.csv",
            DatasetKind::OncQuality => "onc_quality.csv",
            DatasetKind::OncDrugDetail => "onc_drug_detail.csv",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
