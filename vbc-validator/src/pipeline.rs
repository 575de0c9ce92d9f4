//! Validation pipeline
//!
//! Sequences the checkers for each contract: the per-table schema pass, then
//! arithmetic, range, cross-metric and specialty rules. MSK runs first, then
//! Oncology. One [`FlagSequence`] spans the whole run, so flag ids keep
//! counting across contracts and a fresh run starts again at `-001`.

use tracing::{debug, info};
use vbc_common::dataset::{DatasetKind, Table};
use vbc_common::models::{
    sorted_by_severity, Contract, Flag, FlagSequence, SeverityCounts, SpecialtyRanges,
};
use vbc_common::Result;

use crate::loader::{Inputs, Records};
use crate::validators::schema::validate_schema;
use crate::validators::{record_checkers, SpecialtyData, ValidationContext};

/// Tables to schema-check for one contract, in order
pub struct ContractTables<'a> {
    pub episodes: (&'a Table, DatasetKind),
    pub quality: (&'a Table, DatasetKind),
    pub drugs: Option<&'a Table>,
}

/// Outcome of one pipeline execution
#[derive(Debug, Clone, Default)]
pub struct ValidationRun {
    /// Flags in emission order
    pub flags: Vec<Flag>,
    pub counts: SeverityCounts,
}

impl ValidationRun {
    pub fn new(flags: Vec<Flag>) -> Self {
        let counts = SeverityCounts::tally(&flags);
        Self { flags, counts }
    }

    /// RED, then YELLOW, then GREEN; emission order within a severity
    pub fn sorted(&self) -> Vec<&Flag> {
        sorted_by_severity(&self.flags)
    }

    pub fn for_contract<'a>(&'a self, contract_id: &'a str) -> impl Iterator<Item = &'a Flag> + 'a {
        self.flags.iter().filter(move |f| f.contract_id == contract_id)
    }
}

/// Run every checker for one contract.
pub fn validate_contract(
    contract: &Contract,
    ranges: &SpecialtyRanges,
    tables: &ContractTables<'_>,
    data: SpecialtyData<'_>,
    ids: &mut FlagSequence,
) -> Vec<Flag> {
    let contract_id = contract.contract_id.as_str();
    let mut flags = Vec::new();

    let (episodes, episodes_kind) = tables.episodes;
    let (quality, quality_kind) = tables.quality;
    flags.extend(validate_schema(episodes, episodes_kind, contract_id, ids));
    flags.extend(validate_schema(quality, quality_kind, contract_id, ids));
    if let Some(drugs) = tables.drugs {
        flags.extend(validate_schema(drugs, DatasetKind::OncDrugDetail, contract_id, ids));
    }

    let ctx = ValidationContext {
        contract,
        ranges,
        data,
    };
    for checker in record_checkers() {
        let found = checker.validate(&ctx, ids);
        debug!(contract_id, checker = checker.name(), flags = found.len(), "Checker ran");
        flags.extend(found);
    }

    let counts = SeverityCounts::tally(&flags);
    info!(
        contract_id,
        red = counts.red,
        yellow = counts.yellow,
        green = counts.green,
        "Contract validated"
    );
    flags
}

/// Validate the configured MSK and Oncology contracts.
///
/// Fails only when a contract id is absent from the metadata.
pub fn run(inputs: &Inputs, records: &Records, msk_id: &str, oncology_id: &str) -> Result<ValidationRun> {
    let mut ids = FlagSequence::new();
    let mut flags = Vec::new();

    info!("Running MSK validation");
    let msk = inputs.contracts.require(msk_id)?;
    flags.extend(validate_contract(
        msk,
        &inputs.ranges.msk,
        &ContractTables {
            episodes: (&inputs.msk_episodes, DatasetKind::MskEpisodes),
            quality: (&inputs.msk_quality, DatasetKind::MskQuality),
            drugs: None,
        },
        records.msk(),
        &mut ids,
    ));

    info!("Running Oncology validation");
    let oncology = inputs.contracts.require(oncology_id)?;
    flags.extend(validate_contract(
        oncology,
        &inputs.ranges.oncology,
        &ContractTables {
            episodes: (&inputs.onc_episodes, DatasetKind::OncEpisodes),
            quality: (&inputs.onc_quality, DatasetKind::OncQuality),
            drugs: Some(&inputs.onc_drugs),
        },
        records.oncology(),
        &mut ids,
    ));

    Ok(ValidationRun::new(flags))
}
