// Rule engine: schema, arithmetic, range, cross-metric and specialty checkers
//
// Every checker is a pure function of its inputs plus the run's flag-id
// sequence. Missing or degenerate values skip the affected check; nothing
// here returns an error.

pub mod arithmetic;
pub mod common;
pub mod cross_metric;
pub mod msk_rules;
pub mod onc_rules;
pub mod range;
pub mod schema;

use vbc_common::dataset::{DrugLine, MskEpisode, OncEpisode, QualityMeasure};
use vbc_common::models::{Contract, Flag, FlagSequence, SpecialtyRanges};

/// Typed rows for one contract's specialty
#[derive(Debug, Clone, Copy)]
pub enum SpecialtyData<'a> {
    Msk {
        episodes: &'a [MskEpisode],
        quality: &'a [QualityMeasure],
    },
    Oncology {
        episodes: &'a [OncEpisode],
        quality: &'a [QualityMeasure],
        drugs: &'a [DrugLine],
    },
}

impl<'a> SpecialtyData<'a> {
    pub fn quality(&self) -> &'a [QualityMeasure] {
        match self {
            SpecialtyData::Msk { quality, .. } => quality,
            SpecialtyData::Oncology { quality, .. } => quality,
        }
    }
}

/// Everything a checker may read for one contract
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub contract: &'a Contract,
    pub ranges: &'a SpecialtyRanges,
    pub data: SpecialtyData<'a>,
}

/// A checker over one contract's typed data
pub trait Validator {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run every check, drawing flag ids from `ids`.
    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag>;
}

/// Checkers that run after the per-table schema pass, in execution order
pub fn record_checkers() -> Vec<Box<dyn Validator + Send + Sync>> {
    vec![
        Box::new(arithmetic::ArithmeticChecker),
        Box::new(range::RangeChecker),
        Box::new(cross_metric::CrossMetricChecker),
        Box::new(msk_rules::MskRules),
        Box::new(onc_rules::OncologyRules),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for checker unit tests

    use vbc_common::dataset::{
        CancerType, DrugLine, EpisodeCore, MeasureCode, MskEpisode, MskEpisodeType, OncEpisode,
        QualityMeasure,
    };
    use vbc_common::models::{Contract, Specialty};

    pub fn msk_contract() -> Contract {
        let mut contract = Contract::new("MSK-T", Specialty::Msk);
        contract.attributed_members = 10_000.0;
        contract.sharing_rate_savings = 0.5;
        contract.sharing_rate_losses = 0.3;
        contract.quality_gate_minimum = 70.0;
        contract
    }

    pub fn onc_contract() -> Contract {
        let mut contract = Contract::new("ONC-T", Specialty::Oncology);
        contract.attributed_members = 10_000.0;
        contract.sharing_rate_savings = 0.5;
        contract.sharing_rate_losses = 0.3;
        contract.quality_gate_minimum = 70.0;
        contract
    }

    pub fn core(label: &str, count: f64, avg: f64, target: f64) -> EpisodeCore {
        EpisodeCore {
            label: label.to_string(),
            episode_count: Some(count),
            avg_episode_cost: Some(avg),
            target_price: Some(target),
            total_cost: Some(count * avg),
            total_target: Some(count * target),
            variance_pct: Some((avg - target) / target),
            ..Default::default()
        }
    }

    pub fn msk_episode(label: &str, count: f64, avg: f64, target: f64) -> MskEpisode {
        MskEpisode {
            core: core(label, count, avg, target),
            episode_type: MskEpisodeType::parse(label),
            implant_cost_avg: None,
            facility_cost_avg: None,
            professional_cost_avg: None,
            post_acute_cost_avg: None,
            readmission_cost_avg: None,
            discharge_home_pct: None,
            discharge_snf_pct: None,
            discharge_irf_pct: None,
            discharge_other_pct: None,
            readmission_rate: None,
            er_visit_rate_90d: None,
            ssi_rate: None,
            revision_rate_12mo: None,
            avg_los_days: None,
            avg_opioid_mme_discharge: None,
            prom_collection_rate: None,
            prom_improvement_rate: None,
            prior_year_discharge_home_pct: None,
            prior_year_er_visit_rate_90d: None,
        }
    }

    pub fn onc_episode(
        cancer: &str,
        stage: &str,
        line: &str,
        count: f64,
        avg: f64,
        target: f64,
    ) -> OncEpisode {
        let label = format!("{cancer} {stage} {line}").trim().to_string();
        OncEpisode {
            core: core(&label, count, avg, target),
            cancer: CancerType::parse(cancer),
            cancer_type: cancer.to_string(),
            stage_group: stage.to_string(),
            line_of_therapy: line.to_string(),
            drug_cost_avg: None,
            administration_cost_avg: None,
            inpatient_cost_avg: None,
            er_cost_avg: None,
            imaging_cost_avg: None,
            lab_cost_avg: None,
            supportive_care_cost_avg: None,
            other_cost_avg: None,
            pathway_adherence_rate: None,
            pathway_regimen_pct: None,
            non_pathway_regimen_pct: None,
            biosimilar_utilization_rate: None,
            office_infusion_pct: None,
            hopd_infusion_pct: None,
            hospitalization_rate: None,
            er_visit_rate: None,
        }
    }

    pub fn measure(id: &str, name: &str, rate: f64, target: f64) -> QualityMeasure {
        QualityMeasure {
            measure_name: name.to_string(),
            measure_id: id.to_string(),
            code: MeasureCode::resolve(id),
            numerator: None,
            denominator: None,
            rate: Some(rate),
            target: Some(target),
            max_points: None,
            points_earned: None,
            prior_year_rate: None,
        }
    }

    pub fn scored(id: &str, name: &str, max_points: f64, points_earned: f64) -> QualityMeasure {
        QualityMeasure {
            max_points: Some(max_points),
            points_earned: Some(points_earned),
            rate: None,
            target: None,
            ..measure(id, name, 0.0, 0.0)
        }
    }

    pub fn drug(name: &str, claims: f64, avg_cost: f64) -> DrugLine {
        DrugLine {
            drug_name: name.to_string(),
            drug_category: String::new(),
            is_biosimilar: false,
            is_pathway: false,
            is_novel_therapy: false,
            total_claims: Some(claims),
            total_cost: Some(claims * avg_cost),
            avg_cost_per_claim: Some(avg_cost),
            office_pct: None,
            hopd_pct: None,
            home_pct: None,
            prior_year_total_cost: None,
            prior_year_claims: None,
            fda_approval_date: None,
        }
    }
}
