//! Input loading
//!
//! Reads the five CSV datasets and the two JSON configuration documents from
//! the resolved data/config directories, then projects the tables into typed
//! records once for the checkers and the report.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use vbc_common::config::ResolvedConfig;
use vbc_common::dataset::{DatasetKind, DrugLine, MskEpisode, OncEpisode, QualityMeasure, Table};
use vbc_common::models::{ContractMetadata, ReferenceRanges};

use crate::validators::SpecialtyData;

/// Raw tables plus configuration documents
#[derive(Debug, Clone)]
pub struct Inputs {
    pub msk_episodes: Table,
    pub msk_quality: Table,
    pub onc_episodes: Table,
    pub onc_quality: Table,
    pub onc_drugs: Table,
    pub contracts: ContractMetadata,
    pub ranges: ReferenceRanges,
}

impl Inputs {
    /// Load every input named by the configuration.
    ///
    /// Unreadable files and malformed JSON/CSV abort the run.
    pub fn load(config: &ResolvedConfig) -> Result<Self> {
        let contracts_path = config.contract_metadata_path();
        let contracts = ContractMetadata::load(&contracts_path)
            .with_context(|| format!("Failed to load {}", contracts_path.display()))?;
        info!(
            path = %contracts_path.display(),
            contracts = contracts.contracts.len(),
            "Loaded contract metadata"
        );

        let ranges_path = config.reference_ranges_path();
        let ranges = ReferenceRanges::load(&ranges_path)
            .with_context(|| format!("Failed to load {}", ranges_path.display()))?;
        info!(path = %ranges_path.display(), "Loaded reference ranges");

        let table = |kind: DatasetKind| load_table(&config.dataset_path(kind), kind);

        Ok(Self {
            msk_episodes: table(DatasetKind::MskEpisodes)?,
            msk_quality: table(DatasetKind::MskQuality)?,
            onc_episodes: table(DatasetKind::OncEpisodes)?,
            onc_quality: table(DatasetKind::OncQuality)?,
            onc_drugs: table(DatasetKind::OncDrugDetail)?,
            contracts,
            ranges,
        })
    }

    pub fn table(&self, kind: DatasetKind) -> &Table {
        match kind {
            DatasetKind::MskEpisodes => &self.msk_episodes,
            DatasetKind::MskQuality => &self.msk_quality,
            DatasetKind::OncEpisodes => &self.onc_episodes,
            DatasetKind::OncQuality => &self.onc_quality,
            DatasetKind::OncDrugDetail => &self.onc_drugs,
        }
    }
}

fn load_table(path: &Path, kind: DatasetKind) -> Result<Table> {
    let table = Table::from_csv_path(path)
        .with_context(|| format!("Failed to load {} from {}", kind, path.display()))?;
    info!(
        dataset = %kind,
        rows = table.len(),
        columns = table.columns().len(),
        "Loaded dataset"
    );
    Ok(table)
}

/// Typed projection of [`Inputs`]
#[derive(Debug, Clone, Default)]
pub struct Records {
    pub msk_episodes: Vec<MskEpisode>,
    pub msk_quality: Vec<QualityMeasure>,
    pub onc_episodes: Vec<OncEpisode>,
    pub onc_quality: Vec<QualityMeasure>,
    pub onc_drugs: Vec<DrugLine>,
}

impl Records {
    pub fn from_inputs(inputs: &Inputs) -> Self {
        Self {
            msk_episodes: inputs.msk_episodes.records(),
            msk_quality: inputs.msk_quality.records(),
            onc_episodes: inputs.onc_episodes.records(),
            onc_quality: inputs.onc_quality.records(),
            onc_drugs: inputs.onc_drugs.records(),
        }
    }

    pub fn msk(&self) -> SpecialtyData<'_> {
        SpecialtyData::Msk {
            episodes: &self.msk_episodes,
            quality: &self.msk_quality,
        }
    }

    pub fn oncology(&self) -> SpecialtyData<'_> {
        SpecialtyData::Oncology {
            episodes: &self.onc_episodes,
            quality: &self.onc_quality,
            drugs: &self.onc_drugs,
        }
    }
}
