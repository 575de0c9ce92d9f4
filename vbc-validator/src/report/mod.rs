//! Validation report
//!
//! [`ValidationReport`] gathers everything the HTML page shows: severity
//! counts, per-contract financial summaries and quality-gate status, the
//! sorted flags, and any diagnostic narratives.

pub mod html;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use vbc_common::dataset::{Episode, EpisodeCore, QualityMeasure};
use vbc_common::models::{Contract, Flag, SeverityCounts};

use crate::diagnosis::DiagnosticNarrative;
use crate::pipeline::ValidationRun;
use crate::validators::common::QualityGate;
use crate::validators::SpecialtyData;

/// Portfolio totals for one contract
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialSummary {
    pub total_episodes: f64,
    pub total_cost: f64,
    pub total_target: f64,
    /// `total_cost − total_target`
    pub variance: f64,
    pub variance_pct: f64,
    /// `total_target − total_cost`; negative means losses
    pub savings: f64,
    /// Savings rate when there are savings, losses rate otherwise
    pub sharing_rate: f64,
    /// Provider share after any gate forfeiture
    pub provider_share: f64,
    /// Share withheld because the quality gate failed
    pub forfeited_share: f64,
    pub quality_gate: Option<QualityGate>,
}

impl FinancialSummary {
    pub fn compute(data: SpecialtyData<'_>, contract: &Contract) -> Self {
        match data {
            SpecialtyData::Msk { episodes, quality } => Self::from_episodes(episodes, quality, contract),
            SpecialtyData::Oncology {
                episodes, quality, ..
            } => Self::from_episodes(episodes, quality, contract),
        }
    }

    fn from_episodes<E: Episode>(
        episodes: &[E],
        quality: &[QualityMeasure],
        contract: &Contract,
    ) -> Self {
        let total_cost = total(episodes, |c| c.total_cost);
        let total_target = total(episodes, |c| c.total_target);
        let total_episodes = total(episodes, |c| c.episode_count);

        let variance = total_cost - total_target;
        let variance_pct = if total_target > 0.0 {
            variance / total_target
        } else {
            0.0
        };
        let savings = total_target - total_cost;
        let sharing_rate = if savings > 0.0 {
            contract.sharing_rate_savings
        } else {
            contract.sharing_rate_losses
        };
        let mut provider_share = savings * sharing_rate;

        let quality_gate = QualityGate::evaluate(quality, contract);
        let mut forfeited_share = 0.0;
        if quality_gate.is_some_and(|g| !g.passes()) && savings > 0.0 {
            forfeited_share = provider_share;
            provider_share = 0.0;
        }

        Self {
            total_episodes,
            total_cost,
            total_target,
            variance,
            variance_pct,
            savings,
            sharing_rate,
            provider_share,
            forfeited_share,
            quality_gate,
        }
    }
}

/// Sum of a per-row value over rows reporting it
fn total<E: Episode>(episodes: &[E], field: impl Fn(&EpisodeCore) -> Option<f64>) -> f64 {
    episodes.iter().filter_map(|e| field(e.core())).sum()
}

/// One contract's section of the report
#[derive(Debug)]
pub struct ContractSection<'a> {
    pub contract: &'a Contract,
    pub flags: Vec<&'a Flag>,
    pub counts: SeverityCounts,
    pub financial: FinancialSummary,
}

impl<'a> ContractSection<'a> {
    pub fn new(contract: &'a Contract, run: &'a ValidationRun, data: SpecialtyData<'_>) -> Self {
        let flags = vbc_common::models::sorted_by_severity(run.for_contract(&contract.contract_id));
        let counts = SeverityCounts::tally(flags.iter().copied());
        Self {
            contract,
            flags,
            counts,
            financial: FinancialSummary::compute(data, contract),
        }
    }
}

#[derive(Debug)]
pub struct ValidationReport<'a> {
    pub generated_at: String,
    pub counts: SeverityCounts,
    pub sections: Vec<ContractSection<'a>>,
    /// All flags, RED first
    pub flags: Vec<&'a Flag>,
    pub narratives: &'a [DiagnosticNarrative],
}

impl<'a> ValidationReport<'a> {
    pub fn new(
        run: &'a ValidationRun,
        sections: Vec<ContractSection<'a>>,
        narratives: &'a [DiagnosticNarrative],
    ) -> Self {
        Self {
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            counts: run.counts,
            sections,
            flags: run.sorted(),
            narratives,
        }
    }

    /// Render and write the report, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let page = html::render(self);
        std::fs::write(path, page).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::*;

    #[test]
    fn test_savings_with_failed_gate_are_forfeited() {
        let contract = onc_contract();
        let episodes = vec![onc_episode("Breast", "Early", "1L", 100.0, 9_000.0, 10_000.0)];
        let quality = vec![scored("ONC-COMP", "Composite", 100.0, 60.0)];
        let summary = FinancialSummary::compute(
            SpecialtyData::Oncology {
                episodes: &episodes,
                quality: &quality,
                drugs: &[],
            },
            &contract,
        );
        assert_eq!(summary.savings, 100_000.0);
        assert_eq!(summary.sharing_rate, 0.5);
        assert_eq!(summary.provider_share, 0.0);
        assert_eq!(summary.forfeited_share, 50_000.0);
    }

    #[test]
    fn test_losses_use_loss_rate_and_are_not_forfeited() {
        let contract = msk_contract();
        let episodes = vec![msk_episode("TKR", 10.0, 12_000.0, 10_000.0)];
        let summary = FinancialSummary::compute(
            SpecialtyData::Msk {
                episodes: &episodes,
                quality: &[],
            },
            &contract,
        );
        assert_eq!(summary.savings, -20_000.0);
        assert_eq!(summary.sharing_rate, 0.3);
        assert_eq!(summary.provider_share, -6_000.0);
        assert_eq!(summary.forfeited_share, 0.0);
        assert!(summary.quality_gate.is_none());
        assert!((summary.variance_pct - 0.2).abs() < 1e-12);
    }
}
