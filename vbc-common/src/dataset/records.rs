//! Typed per-dataset records
//!
//! Identifiers that rules branch on (episode type, cancer type, quality
//! measure code) are resolved here once, so rule code matches on enums
//! instead of searching strings.

use super::table::Row;
use serde::{Deserialize, Serialize};

/// Build a record from one table row. Never fails: absent or non-numeric
/// cells become `None`.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> Self;
}

/// Fields shared by MSK and Oncology episode rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeCore {
    /// Display label (`episode_type`, or `"{cancer} {stage} {line}"`)
    pub label: String,
    pub episode_count: Option<f64>,
    pub avg_episode_cost: Option<f64>,
    pub target_price: Option<f64>,
    pub total_cost: Option<f64>,
    pub total_target: Option<f64>,
    pub variance_pct: Option<f64>,
    pub prior_year_episode_count: Option<f64>,
    pub prior_year_avg_cost: Option<f64>,
    pub risk_score_actual: Option<f64>,
    pub risk_score_expected: Option<f64>,
}

impl EpisodeCore {
    fn from_row(row: &Row<'_>, label: String) -> Self {
        Self {
            label,
            episode_count: row.number("episode_count"),
            avg_episode_cost: row.number("avg_episode_cost"),
            target_price: row.number("target_price"),
            total_cost: row.number("total_cost"),
            total_target: row.number("total_target"),
            variance_pct: row.number("variance_pct"),
            prior_year_episode_count: row.number("prior_year_episode_count"),
            prior_year_avg_cost: row.number("prior_year_avg_cost"),
            risk_score_actual: row.number("risk_score_actual"),
            risk_score_expected: row.number("risk_score_expected"),
        }
    }

    /// Episode count when present and non-zero
    pub fn active_count(&self) -> Option<f64> {
        self.episode_count.filter(|c| *c != 0.0)
    }
}

/// Common view over MSK and Oncology episodes used by the specialty-agnostic
/// checkers.
pub trait Episode {
    fn core(&self) -> &EpisodeCore;

    /// Per-episode cost components that should add up to the average cost
    fn cost_components(&self) -> Vec<(&'static str, Option<f64>)>;

    fn label(&self) -> &str {
        &self.core().label
    }
}

// ----------------------------------------------------------------------------
// MSK
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MskEpisodeType {
    Tkr,
    Thr,
    SpinalFusion1To2,
    SpinalFusion3Plus,
    KneeArthroscopy,
    RotatorCuff,
    ConservativeLbp,
    ConservativeJoint,
    Other(String),
}

impl MskEpisodeType {
    pub fn parse(label: &str) -> Self {
        match label.trim() {
            "TKR" => MskEpisodeType::Tkr,
            "THR" => MskEpisodeType::Thr,
            "Spinal Fusion 1-2" => MskEpisodeType::SpinalFusion1To2,
            "Spinal Fusion 3+" => MskEpisodeType::SpinalFusion3Plus,
            "Knee Arthroscopy" => MskEpisodeType::KneeArthroscopy,
            "Rotator Cuff" => MskEpisodeType::RotatorCuff,
            "Conservative LBP" => MskEpisodeType::ConservativeLbp,
            "Conservative Joint" => MskEpisodeType::ConservativeJoint,
            other => MskEpisodeType::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MskEpisodeType::Tkr => "TKR",
            MskEpisodeType::Thr => "THR",
            MskEpisodeType::SpinalFusion1To2 => "Spinal Fusion 1-2",
            MskEpisodeType::SpinalFusion3Plus => "Spinal Fusion 3+",
            MskEpisodeType::KneeArthroscopy => "Knee Arthroscopy",
            MskEpisodeType::RotatorCuff => "Rotator Cuff",
            MskEpisodeType::ConservativeLbp => "Conservative LBP",
            MskEpisodeType::ConservativeJoint => "Conservative Joint",
            MskEpisodeType::Other(label) => label,
        }
    }

    /// Non-surgical management episodes. Unrecognized labels beginning with
    /// "Conservative" count too.
    pub fn is_conservative(&self) -> bool {
        match self {
            MskEpisodeType::ConservativeLbp | MskEpisodeType::ConservativeJoint => true,
            MskEpisodeType::Other(label) => label.starts_with("Conservative"),
            _ => false,
        }
    }

    pub fn is_joint_replacement(&self) -> bool {
        matches!(self, MskEpisodeType::Tkr | MskEpisodeType::Thr)
    }

    pub fn is_spinal_fusion(&self) -> bool {
        matches!(
            self,
            MskEpisodeType::SpinalFusion1To2 | MskEpisodeType::SpinalFusion3Plus
        )
    }

    /// Key into the MSK `episode_cost_ranges` table
    pub fn range_key(&self) -> Option<&'static str> {
        match self {
            MskEpisodeType::Tkr => Some("TKR"),
            MskEpisodeType::Thr => Some("THR"),
            MskEpisodeType::SpinalFusion1To2 => Some("spinal_fusion_1_2"),
            MskEpisodeType::SpinalFusion3Plus => Some("spinal_fusion_3_plus"),
            MskEpisodeType::KneeArthroscopy => Some("knee_arthroscopy"),
            MskEpisodeType::RotatorCuff => Some("rotator_cuff"),
            MskEpisodeType::ConservativeLbp => Some("conservative_lbp"),
            MskEpisodeType::ConservativeJoint => Some("conservative_joint"),
            MskEpisodeType::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MskEpisode {
    pub core: EpisodeCore,
    pub episode_type: MskEpisodeType,
    pub implant_cost_avg: Option<f64>,
    pub facility_cost_avg: Option<f64>,
    pub professional_cost_avg: Option<f64>,
    pub post_acute_cost_avg: Option<f64>,
    pub readmission_cost_avg: Option<f64>,
    pub discharge_home_pct: Option<f64>,
    pub discharge_snf_pct: Option<f64>,
    pub discharge_irf_pct: Option<f64>,
    pub discharge_other_pct: Option<f64>,
    pub readmission_rate: Option<f64>,
    pub er_visit_rate_90d: Option<f64>,
    pub ssi_rate: Option<f64>,
    pub revision_rate_12mo: Option<f64>,
    pub avg_los_days: Option<f64>,
    pub avg_opioid_mme_discharge: Option<f64>,
    pub prom_collection_rate: Option<f64>,
    pub prom_improvement_rate: Option<f64>,
    pub prior_year_discharge_home_pct: Option<f64>,
    pub prior_year_er_visit_rate_90d: Option<f64>,
}

impl FromRow for MskEpisode {
    fn from_row(row: &Row<'_>) -> Self {
        let label = row.text_or_empty("episode_type");
        Self {
            episode_type: MskEpisodeType::parse(&label),
            core: EpisodeCore::from_row(row, label),
            implant_cost_avg: row.number("implant_cost_avg"),
            facility_cost_avg: row.number("facility_cost_avg"),
            professional_cost_avg: row.number("professional_cost_avg"),
            post_acute_cost_avg: row.number("post_acute_cost_avg"),
            readmission_cost_avg: row.number("readmission_cost_avg"),
            discharge_home_pct: row.number("discharge_home_pct"),
            discharge_snf_pct: row.number("discharge_snf_pct"),
            discharge_irf_pct: row.number("discharge_irf_pct"),
            discharge_other_pct: row.number("discharge_other_pct"),
            readmission_rate: row.number("readmission_rate"),
            er_visit_rate_90d: row.number("er_visit_rate_90d"),
            ssi_rate: row.number("ssi_rate"),
            revision_rate_12mo: row.number("revision_rate_12mo"),
            avg_los_days: row.number("avg_los_days"),
            avg_opioid_mme_discharge: row.number("avg_opioid_mme_discharge"),
            prom_collection_rate: row.number("prom_collection_rate"),
            prom_improvement_rate: row.number("prom_improvement_rate"),
            prior_year_discharge_home_pct: row.number("prior_year_discharge_home_pct"),
            prior_year_er_visit_rate_90d: row.number("prior_year_er_visit_rate_90d"),
        }
    }
}

impl Episode for MskEpisode {
    fn core(&self) -> &EpisodeCore {
        &self.core
    }

    fn cost_components(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("implant_cost_avg", self.implant_cost_avg),
            ("facility_cost_avg", self.facility_cost_avg),
            ("professional_cost_avg", self.professional_cost_avg),
            ("post_acute_cost_avg", self.post_acute_cost_avg),
            ("readmission_cost_avg", self.readmission_cost_avg),
        ]
    }
}

// ----------------------------------------------------------------------------
// Oncology
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancerType {
    Breast,
    Lung,
    Colorectal,
    Prostate,
    Other,
}

impl CancerType {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "breast" => CancerType::Breast,
            "lung" => CancerType::Lung,
            "colorectal" => CancerType::Colorectal,
            "prostate" => CancerType::Prostate,
            _ => CancerType::Other,
        }
    }

    /// Key into `incidence_rates_ma_per_1000`
    pub fn incidence_key(&self) -> Option<&'static str> {
        match self {
            CancerType::Breast => Some("breast"),
            CancerType::Lung => Some("lung"),
            CancerType::Colorectal => Some("colorectal"),
            CancerType::Prostate => Some("prostate"),
            CancerType::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OncEpisode {
    pub core: EpisodeCore,
    pub cancer: CancerType,
    pub cancer_type: String,
    pub stage_group: String,
    pub line_of_therapy: String,
    pub drug_cost_avg: Option<f64>,
    pub administration_cost_avg: Option<f64>,
    pub inpatient_cost_avg: Option<f64>,
    pub er_cost_avg: Option<f64>,
    pub imaging_cost_avg: Option<f64>,
    pub lab_cost_avg: Option<f64>,
    pub supportive_care_cost_avg: Option<f64>,
    pub other_cost_avg: Option<f64>,
    pub pathway_adherence_rate: Option<f64>,
    pub pathway_regimen_pct: Option<f64>,
    pub non_pathway_regimen_pct: Option<f64>,
    pub biosimilar_utilization_rate: Option<f64>,
    pub office_infusion_pct: Option<f64>,
    pub hopd_infusion_pct: Option<f64>,
    pub hospitalization_rate: Option<f64>,
    pub er_visit_rate: Option<f64>,
}

impl OncEpisode {
    /// Key into the Oncology `episode_cost_ranges` table for this
    /// (cancer, stage, line) combination
    pub fn range_key(&self) -> Option<&'static str> {
        let key = match (
            self.cancer_type.as_str(),
            self.stage_group.as_str(),
            self.line_of_therapy.as_str(),
        ) {
            ("Breast", "Early", "1L") => "breast_early",
            ("Breast", "Metastatic", "1L") | ("Breast", "Metastatic", "2L+") => {
                "breast_metastatic"
            }
            ("Lung", "NSCLC", "1L") => "lung_nsclc_1L",
            ("Lung", "NSCLC", "2L+") => "lung_nsclc_2L_plus",
            ("Colorectal", "Adjuvant", "1L") => "colorectal_adjuvant",
            ("Colorectal", "Metastatic", "1L") => "colorectal_metastatic",
            ("Prostate", "Early", "1L") => "prostate_early",
            ("Prostate", "Advanced", "1L") => "prostate_advanced",
            _ => return None,
        };
        Some(key)
    }
}

impl FromRow for OncEpisode {
    fn from_row(row: &Row<'_>) -> Self {
        let cancer_type = row.text_or_empty("cancer_type");
        let stage_group = row.text_or_empty("stage_group");
        let line_of_therapy = row.text_or_empty("line_of_therapy");
        let label = format!("{cancer_type} {stage_group} {line_of_therapy}")
            .trim()
            .to_string();
        Self {
            core: EpisodeCore::from_row(row, label),
            cancer: CancerType::parse(&cancer_type),
            cancer_type,
            stage_group,
            line_of_therapy,
            drug_cost_avg: row.number("drug_cost_avg"),
            administration_cost_avg: row.number("administration_cost_avg"),
            inpatient_cost_avg: row.number("inpatient_cost_avg"),
            er_cost_avg: row.number("er_cost_avg"),
            imaging_cost_avg: row.number("imaging_cost_avg"),
            lab_cost_avg: row.number("lab_cost_avg"),
            supportive_care_cost_avg: row.number("supportive_care_cost_avg"),
            other_cost_avg: row.number("other_cost_avg"),
            pathway_adherence_rate: row.number("pathway_adherence_rate"),
            pathway_regimen_pct: row.number("pathway_regimen_pct"),
            non_pathway_regimen_pct: row.number("non_pathway_regimen_pct"),
            biosimilar_utilization_rate: row.number("biosimilar_utilization_rate"),
            office_infusion_pct: row.number("office_infusion_pct"),
            hopd_infusion_pct: row.number("hopd_infusion_pct"),
            hospitalization_rate: row.number("hospitalization_rate"),
            er_visit_rate: row.number("er_visit_rate"),
        }
    }
}

impl Episode for OncEpisode {
    fn core(&self) -> &EpisodeCore {
        &self.core
    }

    fn cost_components(&self) -> Vec<(&'static str, Option<f64>)> {
        vec![
            ("drug_cost_avg", self.drug_cost_avg),
            ("administration_cost_avg", self.administration_cost_avg),
            ("inpatient_cost_avg", self.inpatient_cost_avg),
            ("er_cost_avg", self.er_cost_avg),
            ("imaging_cost_avg", self.imaging_cost_avg),
            ("lab_cost_avg", self.lab_cost_avg),
            ("supportive_care_cost_avg", self.supportive_care_cost_avg),
            ("other_cost_avg", self.other_cost_avg),
        ]
    }
}

// ----------------------------------------------------------------------------
// Quality measures
// ----------------------------------------------------------------------------

/// Which direction of deviation from target counts as failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolDirection {
    HighIsBad,
    LowIsBad,
}

/// The five end-of-life quality measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EolMeasure {
    ChemoLast14Days,
    HospiceEnrollment,
    HospiceOver7Days,
    IcuLast30Days,
    ErLast30Days,
}

impl EolMeasure {
    pub const ALL: [EolMeasure; 5] = [
        EolMeasure::ChemoLast14Days,
        EolMeasure::HospiceEnrollment,
        EolMeasure::HospiceOver7Days,
        EolMeasure::IcuLast30Days,
        EolMeasure::ErLast30Days,
    ];

    pub fn from_measure_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.measure_id() == id)
    }

    pub fn measure_id(&self) -> &'static str {
        match self {
            EolMeasure::ChemoLast14Days => "ONC-Q-002",
            EolMeasure::HospiceEnrollment => "ONC-Q-003",
            EolMeasure::HospiceOver7Days => "ONC-Q-004",
            EolMeasure::IcuLast30Days => "ONC-Q-005",
            EolMeasure::ErLast30Days => "ONC-Q-006",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EolMeasure::ChemoLast14Days => "Chemo Within 14 Days of Death",
            EolMeasure::HospiceEnrollment => "Hospice Enrollment",
            EolMeasure::HospiceOver7Days => "Hospice >7 Days Before Death",
            EolMeasure::IcuLast30Days => "ICU Within 30 Days of Death",
            EolMeasure::ErLast30Days => "ER Within 30 Days of Death",
        }
    }

    pub fn direction(&self) -> EolDirection {
        match self {
            EolMeasure::ChemoLast14Days | EolMeasure::IcuLast30Days | EolMeasure::ErLast30Days => {
                EolDirection::HighIsBad
            }
            EolMeasure::HospiceEnrollment | EolMeasure::HospiceOver7Days => EolDirection::LowIsBad,
        }
    }
}

/// Measure identity resolved from `measure_id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureCode {
    /// The composite quality score row (id contains `COMP`)
    Composite,
    EndOfLife(EolMeasure),
    AdvanceCarePlanning,
    Other,
}

/// Advance Care Planning measure id
pub const ACP_MEASURE_ID: &str = "ONC-Q-009";

impl MeasureCode {
    pub fn resolve(measure_id: &str) -> Self {
        let id = measure_id.trim();
        if id.contains("COMP") {
            MeasureCode::Composite
        } else if id == ACP_MEASURE_ID {
            MeasureCode::AdvanceCarePlanning
        } else if let Some(eol) = EolMeasure::from_measure_id(id) {
            MeasureCode::EndOfLife(eol)
        } else {
            MeasureCode::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityMeasure {
    pub measure_name: String,
    pub measure_id: String,
    pub code: MeasureCode,
    pub numerator: Option<f64>,
    pub denominator: Option<f64>,
    pub rate: Option<f64>,
    pub target: Option<f64>,
    pub max_points: Option<f64>,
    pub points_earned: Option<f64>,
    pub prior_year_rate: Option<f64>,
}

impl QualityMeasure {
    pub fn is_composite(&self) -> bool {
        self.code == MeasureCode::Composite
    }
}

impl FromRow for QualityMeasure {
    fn from_row(row: &Row<'_>) -> Self {
        let measure_id = row.text_or_empty("measure_id");
        Self {
            measure_name: row.text_or_empty("measure_name"),
            code: MeasureCode::resolve(&measure_id),
            measure_id,
            numerator: row.number("numerator"),
            denominator: row.number("denominator"),
            rate: row.number("rate"),
            target: row.number("target"),
            max_points: row.number("max_points"),
            points_earned: row.number("points_earned"),
            prior_year_rate: row.number("prior_year_rate"),
        }
    }
}

// ----------------------------------------------------------------------------
// Drug detail
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DrugLine {
    pub drug_name: String,
    pub drug_category: String,
    pub is_biosimilar: bool,
    pub is_pathway: bool,
    pub is_novel_therapy: bool,
    pub total_claims: Option<f64>,
    pub total_cost: Option<f64>,
    pub avg_cost_per_claim: Option<f64>,
    pub office_pct: Option<f64>,
    pub hopd_pct: Option<f64>,
    pub home_pct: Option<f64>,
    pub prior_year_total_cost: Option<f64>,
    pub prior_year_claims: Option<f64>,
    pub fda_approval_date: Option<String>,
}

impl FromRow for DrugLine {
    fn from_row(row: &Row<'_>) -> Self {
        Self {
            drug_name: row.text_or_empty("drug_name"),
            drug_category: row.text_or_empty("drug_category"),
            is_biosimilar: row.boolean("is_biosimilar").unwrap_or(false),
            is_pathway: row.boolean("is_pathway").unwrap_or(false),
            is_novel_therapy: row.boolean("is_novel_therapy").unwrap_or(false),
            total_claims: row.number("total_claims"),
            total_cost: row.number("total_cost"),
            avg_cost_per_claim: row.number("avg_cost_per_claim"),
            office_pct: row.number("site_of_service_office_pct"),
            hopd_pct: row.number("site_of_service_hopd_pct"),
            home_pct: row.number("site_of_service_home_pct"),
            prior_year_total_cost: row.number("prior_year_total_cost"),
            prior_year_claims: row.number("prior_year_claims"),
            fda_approval_date: row.text("fda_approval_date"),
        }
    }
}
