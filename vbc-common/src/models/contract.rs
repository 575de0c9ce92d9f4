//! Contract metadata (loaded, never built by the rule engine)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Pathway adherence target used when a contract does not set one
pub const DEFAULT_PATHWAY_ADHERENCE_TARGET: f64 = 0.80;

/// Novel-therapy approval lookback used when a contract does not set one
pub const DEFAULT_NOVEL_THERAPY_LOOKBACK_MONTHS: u32 = 18;

/// Data as-of date used when a contract does not set one
pub const DEFAULT_DATA_AS_OF: &str = "2025-01-15";

/// Line of business a contract covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Specialty {
    #[serde(rename = "MSK")]
    Msk,
    Oncology,
    #[serde(other)]
    Other,
}

impl Specialty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Msk => "MSK",
            Specialty::Oncology => "Oncology",
            Specialty::Other => "Other",
        }
    }
}

/// One value-based-care contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: String,
    pub specialty: Specialty,

    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub contract_type: Option<String>,
    #[serde(default)]
    pub lob: Option<String>,
    #[serde(default)]
    pub performance_period: Option<String>,

    /// Members attributed to the provider for the performance period
    #[serde(default)]
    pub attributed_members: f64,
    /// Reported member months, reconciled against `attributed_members × 12`
    #[serde(default)]
    pub member_months: Option<f64>,

    /// Provider share of savings (0-1)
    #[serde(default)]
    pub sharing_rate_savings: f64,
    /// Provider share of losses (0-1)
    #[serde(default)]
    pub sharing_rate_losses: f64,
    /// Minimum composite quality percentage required to share savings
    #[serde(default)]
    pub quality_gate_minimum: f64,

    #[serde(default = "default_pathway_target")]
    pub pathway_adherence_target: f64,
    #[serde(default)]
    pub novel_therapy_carveout: bool,
    #[serde(default = "default_lookback_months")]
    pub novel_therapy_lookback_months: u32,
    #[serde(default = "default_data_as_of")]
    pub data_as_of: String,
}

fn default_pathway_target() -> f64 {
    DEFAULT_PATHWAY_ADHERENCE_TARGET
}

fn default_lookback_months() -> u32 {
    DEFAULT_NOVEL_THERAPY_LOOKBACK_MONTHS
}

fn default_data_as_of() -> String {
    DEFAULT_DATA_AS_OF.to_string()
}

impl Contract {
    /// Minimal contract for a specialty; remaining fields take their defaults.
    pub fn new(contract_id: impl Into<String>, specialty: Specialty) -> Self {
        Self {
            contract_id: contract_id.into(),
            specialty,
            contract_name: None,
            contract_type: None,
            lob: None,
            performance_period: None,
            attributed_members: 0.0,
            member_months: None,
            sharing_rate_savings: 0.0,
            sharing_rate_losses: 0.0,
            quality_gate_minimum: 0.0,
            pathway_adherence_target: DEFAULT_PATHWAY_ADHERENCE_TARGET,
            novel_therapy_carveout: false,
            novel_therapy_lookback_months: DEFAULT_NOVEL_THERAPY_LOOKBACK_MONTHS,
            data_as_of: DEFAULT_DATA_AS_OF.to_string(),
        }
    }

    /// Attributed members, for per-1000 arithmetic
    pub fn members(&self) -> f64 {
        self.attributed_members
    }
}

/// `contract_metadata.json` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractMetadata {
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

impl ContractMetadata {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Look up a contract by identifier.
    pub fn get(&self, contract_id: &str) -> Option<&Contract> {
        self.contracts.iter().find(|c| c.contract_id == contract_id)
    }

    /// Look up a contract by identifier, failing when it is absent.
    pub fn require(&self, contract_id: &str) -> Result<&Contract> {
        self.get(contract_id)
            .ok_or_else(|| Error::NotFound(format!("Contract {} not found", contract_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"{
        "contracts": [
            {
                "contract_id": "MSK-2024-001",
                "specialty": "MSK",
                "lob": "Medicare Advantage",
                "attributed_members": 45000,
                "member_months": 540000.0,
                "sharing_rate_savings": 0.5,
                "sharing_rate_losses": 0.3,
                "quality_gate_minimum": 80
            },
            {
                "contract_id": "ONC-2024-001",
                "specialty": "Oncology",
                "attributed_members": 60000,
                "quality_gate_minimum": 85,
                "pathway_adherence_target": 0.85,
                "novel_therapy_carveout": true,
                "novel_therapy_lookback_months": 12,
                "data_as_of": "2025-03-31"
            }
        ]
    }"#;

    #[test]
    fn test_parse_contract_metadata_with_defaults() {
        let metadata = ContractMetadata::from_json_str(METADATA).unwrap();
        assert_eq!(metadata.contracts.len(), 2);

        let msk = metadata.get("MSK-2024-001").unwrap();
        assert_eq!(msk.specialty, Specialty::Msk);
        assert_eq!(msk.attributed_members, 45000.0);
        assert_eq!(msk.pathway_adherence_target, DEFAULT_PATHWAY_ADHERENCE_TARGET);
        assert!(!msk.novel_therapy_carveout);
        assert_eq!(msk.data_as_of, DEFAULT_DATA_AS_OF);
        assert_eq!(msk.member_months, Some(540000.0));

        let onc = metadata.get("ONC-2024-001").unwrap();
        assert_eq!(onc.specialty, Specialty::Oncology);
        assert_eq!(onc.novel_therapy_lookback_months, 12);
        assert!(onc.novel_therapy_carveout);
        assert!(onc.member_months.is_none());
    }

    #[test]
    fn test_counts_accept_float_literals() {
        let metadata = ContractMetadata::from_json_str(
            r#"{"contracts": [{
                "contract_id": "MSK-1",
                "specialty": "MSK",
                "attributed_members": 45000.0,
                "member_months": 540000
            }]}"#,
        )
        .unwrap();
        let msk = metadata.require("MSK-1").unwrap();
        assert_eq!(msk.members(), 45000.0);
        assert_eq!(msk.member_months, Some(540000.0));
    }

    #[test]
    fn test_unknown_specialty_maps_to_other() {
        let metadata = ContractMetadata::from_json_str(
            r#"{"contracts": [{"contract_id": "CARD-1", "specialty": "Cardiology"}]}"#,
        )
        .unwrap();
        assert_eq!(metadata.contracts[0].specialty, Specialty::Other);
    }

    #[test]
    fn test_require_missing_contract_is_not_found() {
        let metadata = ContractMetadata::from_json_str(METADATA).unwrap();
        let err = metadata.require("NOPE").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
