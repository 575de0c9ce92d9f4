// Cross-metric correlator: combinations of otherwise independent metrics
// that together tell an inconsistent or concerning story

use super::common::{
    acp_rate, assess_eol, back_calculate, per_1000, round_to, savings_at_risk, QualityGate,
    ACP_ROOT_CAUSE_THRESHOLD,
};
use super::{SpecialtyData, ValidationContext, Validator};
use serde_json::json;
use tracing::debug;
use vbc_common::dataset::{DrugLine, MskEpisode, MskEpisodeType, OncEpisode, QualityMeasure};
use vbc_common::human_fmt::{money, pct, plain, signed_pct, thousands};
use vbc_common::models::{
    evidence, prefix, Category, Contract, Finding, Flag, FlagEmitter, FlagSequence, Severity,
};

/// TKR prior-year baselines used only when the row carries no prior-year
/// discharge/ER columns
const TKR_PRIOR_HOME_PCT: f64 = 0.62;
const TKR_PRIOR_ER_RATE: f64 = 0.08;

const HOME_SHIFT_THRESHOLD: f64 = 0.10;
const ER_SURGE_THRESHOLD: f64 = 0.50;
const RISK_DIVERGENCE_THRESHOLD: f64 = 0.10;
/// Upper end of the expected MA knee-arthroscopy range
pub const ARTHROSCOPY_MAX_PER_1000: f64 = 25.0;
const ARTHROSCOPY_RATIO_MAX: f64 = 0.50;
const FUSION_GROWTH_THRESHOLD: f64 = 0.20;

const PATHWAY_ADHERENCE_FLOOR: f64 = 0.75;
const PATHWAY_OVERRUN_THRESHOLD: f64 = 0.10;
pub const NON_PATHWAY_PREMIUM_THRESHOLD: f64 = 0.25;

pub const HIGH_COST_PER_CLAIM: f64 = 2_000.0;
pub const HOPD_SHARE_THRESHOLD: f64 = 0.60;
pub const HOPD_TARGET_SHARE: f64 = 0.40;
const HOPD_FACILITY_MARKUP: f64 = 0.30;

pub struct CrossMetricChecker;

impl Validator for CrossMetricChecker {
    fn name(&self) -> &'static str {
        "cross_metric"
    }

    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag> {
        let mut out = ids.emitter(
            prefix::CROSS_METRIC,
            Category::CrossMetric,
            &ctx.contract.contract_id,
        );

        match ctx.data {
            SpecialtyData::Msk { episodes, .. } => {
                discharge_shift_er_correlation(episodes, &mut out);
                risk_score_calibration(episodes, &mut out);
                arthroscopy_volume(episodes, ctx.contract, &mut out);
                arthroscopy_to_conservative_ratio(episodes, &mut out);
                surgical_pipeline_acceleration(episodes, &mut out);
            }
            SpecialtyData::Oncology {
                episodes,
                quality,
                drugs,
            } => {
                pathway_cost_correlation(episodes, &mut out);
                eol_systemic_failure(quality, &mut out);
                quality_gate_proximity(quality, episodes, ctx.contract, &mut out);
                site_of_service_cost(drugs, &mut out);
            }
        }

        let flags = out.finish();
        debug!(checker = self.name(), flags = flags.len(), "Checker complete");
        flags
    }
}

fn find_msk<'a>(episodes: &'a [MskEpisode], kind: &MskEpisodeType) -> Option<&'a MskEpisode> {
    episodes.iter().find(|ep| &ep.episode_type == kind)
}

// ----------------------------------------------------------------------------
// MSK
// ----------------------------------------------------------------------------

/// Prior-year (home discharge, ER rate) for a row: its own columns, or the
/// built-in TKR baselines.
fn prior_year_baselines(ep: &MskEpisode) -> Option<(f64, f64)> {
    match (ep.prior_year_discharge_home_pct, ep.prior_year_er_visit_rate_90d) {
        (Some(home), Some(er)) => Some((home, er)),
        _ if ep.episode_type == MskEpisodeType::Tkr => Some((TKR_PRIOR_HOME_PCT, TKR_PRIOR_ER_RATE)),
        _ => None,
    }
}

fn discharge_shift_er_correlation(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes.iter().filter(|ep| !ep.episode_type.is_conservative()) {
        let (Some(home_pct), Some(er_rate)) = (ep.discharge_home_pct, ep.er_visit_rate_90d) else {
            continue;
        };
        let Some((prior_home, prior_er)) = prior_year_baselines(ep) else {
            continue;
        };
        if prior_er <= 0.0 {
            continue;
        }
        let home_increase = home_pct - prior_home;
        let er_increase = (er_rate - prior_er) / prior_er;
        if home_increase <= HOME_SHIFT_THRESHOLD || er_increase <= ER_SURGE_THRESHOLD {
            continue;
        }

        let label = ep.core.label.as_str();
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "discharge_shift_er_correlation".to_string(),
                metric_value: format!(
                    "home {}, ER {}",
                    signed_pct(home_increase, 0),
                    signed_pct(er_increase, 0)
                )
                .into(),
                expected_value:
                    "ER rate should not increase >50% when home discharge increases >10pp"
                        .to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Discharge-to-home increased {} ({}→{}) while ER visits increased {} ({}→{})",
                    pct(home_increase, 0),
                    pct(prior_home, 0),
                    pct(home_pct, 0),
                    pct(er_increase, 0),
                    pct(prior_er, 0),
                    pct(er_rate, 0)
                ),
                detail: "Patients are being sent home earlier (reducing SNF utilization), but the \
                         increase in ER visits suggests some patients who previously would have gone \
                         to SNF may lack adequate home health support. The ER visits are not yet \
                         converting to readmissions, but this is an early warning sign."
                    .to_string(),
                related_metrics: evidence([
                    ("discharge_home_pct", json!(home_pct)),
                    ("prior_year_home_pct", json!(prior_home)),
                    ("er_visit_rate_90d", json!(er_rate)),
                    ("prior_year_er_rate", json!(prior_er)),
                    ("readmission_rate", json!(ep.readmission_rate)),
                ]),
            },
        );
    }
}

fn risk_score_calibration(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes {
        let (Some(actual), Some(expected)) = (ep.core.risk_score_actual, ep.core.risk_score_expected)
        else {
            continue;
        };
        if expected <= 0.0 {
            continue;
        }
        let diff_pct = (actual - expected).abs() / expected;
        if diff_pct <= RISK_DIVERGENCE_THRESHOLD {
            continue;
        }
        let label = ep.core.label.as_str();
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "risk_score_calibration".to_string(),
                metric_value: format!("actual={actual:.3}, expected={expected:.3}").into(),
                expected_value: "Within 10% of each other".to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "Risk score calibration concern for {label}: actual {actual:.3} vs expected \
                     {expected:.3} ({} difference)",
                    pct(diff_pct, 1)
                ),
                detail: "A significant divergence between actual and expected risk scores may \
                         indicate benchmark miscalibration or case-mix shift."
                    .to_string(),
                related_metrics: evidence([
                    ("risk_score_actual", json!(actual)),
                    ("risk_score_expected", json!(expected)),
                ]),
            },
        );
    }
}

fn arthroscopy_volume(episodes: &[MskEpisode], contract: &Contract, out: &mut FlagEmitter<'_>) {
    for ep in episodes
        .iter()
        .filter(|ep| ep.episode_type == MskEpisodeType::KneeArthroscopy)
    {
        let Some(count) = ep.core.active_count() else {
            continue;
        };
        let Some(rate) = per_1000(count, contract.members()) else {
            continue;
        };
        if rate <= ARTHROSCOPY_MAX_PER_1000 {
            continue;
        }
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "volume_per_1000".to_string(),
                metric_value: format!("{rate:.1} per 1,000").into(),
                expected_value: "15-25 per 1,000 for MA population".to_string(),
                episode_type: ep.core.label.clone(),
                description: format!(
                    "Knee arthroscopy volume {rate:.1}/1,000 exceeds expected MA range of 15-25/1,000"
                ),
                detail: format!(
                    "{} arthroscopy episodes for {} attributed members = {rate:.1} per 1,000. \
                     Evidence shows arthroscopic debridement for knee OA is clinically ineffective \
                     per multiple RCTs. High volume in an MA population may indicate unnecessary \
                     procedures.",
                    plain(count),
                    thousands(contract.members(), 0)
                ),
                related_metrics: evidence([
                    ("episode_count", json!(count)),
                    ("attributed_members", json!(contract.attributed_members)),
                    ("rate_per_1000", json!(round_to(rate, 1))),
                ]),
            },
        );
    }
}

fn arthroscopy_to_conservative_ratio(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    let (Some(arth), Some(cons)) = (
        find_msk(episodes, &MskEpisodeType::KneeArthroscopy),
        find_msk(episodes, &MskEpisodeType::ConservativeJoint),
    ) else {
        return;
    };
    let arth_count = arth.core.episode_count.unwrap_or(0.0);
    let Some(cons_count) = cons.core.episode_count.filter(|c| *c > 0.0) else {
        return;
    };
    let ratio = arth_count / cons_count;
    if ratio <= ARTHROSCOPY_RATIO_MAX {
        return;
    }
    out.emit(
        Severity::Red,
        Finding {
            metric_name: "arthroscopy_to_conservative_ratio".to_string(),
            metric_value: format!("{ratio:.2}:1").into(),
            expected_value: "<0.50:1 (target 0.35:1)".to_string(),
            episode_type: arth.core.label.clone(),
            description: format!(
                "Arthroscopy-to-conservative joint ratio is {ratio:.2}:1, exceeding expected maximum of 0.50:1"
            ),
            detail: format!(
                "Arthroscopy episodes ({}) vs conservative joint episodes ({}) yields ratio of \
                 {ratio:.2}:1. Expected range is 0.30-0.40:1. High ratio suggests potential \
                 overutilization of arthroscopy vs conservative management.",
                plain(arth_count),
                plain(cons_count)
            ),
            related_metrics: evidence([
                ("arthroscopy_count", json!(arth_count)),
                ("conservative_joint_count", json!(cons_count)),
                ("ratio", json!(round_to(ratio, 3))),
            ]),
        },
    );
}

fn surgical_pipeline_acceleration(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    let (Some(lbp), Some(fusion)) = (
        find_msk(episodes, &MskEpisodeType::ConservativeLbp),
        find_msk(episodes, &MskEpisodeType::SpinalFusion1To2),
    ) else {
        return;
    };
    let (Some(cons_prior), Some(fus_prior)) = (
        lbp.core.prior_year_episode_count.filter(|c| *c > 0.0),
        fusion.core.prior_year_episode_count.filter(|c| *c > 0.0),
    ) else {
        return;
    };
    let cons_curr = lbp.core.episode_count.unwrap_or(0.0);
    let fus_curr = fusion.core.episode_count.unwrap_or(0.0);
    let cons_change = (cons_curr - cons_prior) / cons_prior;
    let fus_change = (fus_curr - fus_prior) / fus_prior;
    if cons_change >= 0.0 || fus_change <= FUSION_GROWTH_THRESHOLD {
        return;
    }

    out.emit(
        Severity::Red,
        Finding {
            metric_name: "surgical_pipeline_acceleration".to_string(),
            metric_value: format!(
                "Conservative LBP {}, Spinal Fusion 1-2 {}",
                signed_pct(cons_change, 1),
                signed_pct(fus_change, 1)
            )
            .into(),
            expected_value: "Volumes should not shift disproportionately toward surgery".to_string(),
            episode_type: "Conservative LBP → Spinal Fusion".to_string(),
            description: format!(
                "Potential surgical pipeline acceleration: Conservative LBP decreased {} ({}→{}) \
                 while Spinal Fusion 1-2 increased {} ({}→{})",
                pct(cons_change.abs(), 1),
                plain(cons_prior),
                plain(cons_curr),
                pct(fus_change, 1),
                plain(fus_prior),
                plain(fus_curr)
            ),
            detail: format!(
                "~{} fewer conservative LBP episodes coincide with {} additional spinal fusion \
                 cases. This suggests an increasing conversion rate from conservative to surgical \
                 management, which may indicate the provider is fast-tracking patients to surgery.",
                plain((cons_prior - cons_curr).abs()),
                plain(fus_curr - fus_prior)
            ),
            related_metrics: evidence([
                ("cons_lbp_current", json!(cons_curr)),
                ("cons_lbp_prior", json!(cons_prior)),
                ("fusion_current", json!(fus_curr)),
                ("fusion_prior", json!(fus_prior)),
            ]),
        },
    );
}

// ----------------------------------------------------------------------------
// Oncology
// ----------------------------------------------------------------------------

fn pathway_cost_correlation(episodes: &[OncEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes {
        let (Some(adherence), Some(avg_cost), Some(target)) = (
            ep.pathway_adherence_rate,
            ep.core.avg_episode_cost,
            ep.core.target_price,
        ) else {
            continue;
        };
        if adherence >= PATHWAY_ADHERENCE_FLOOR || avg_cost <= target {
            continue;
        }
        let overrun = (avg_cost - target) / target;
        if overrun <= PATHWAY_OVERRUN_THRESHOLD {
            continue;
        }
        let Some(split) = back_calculate(adherence, avg_cost, target) else {
            continue;
        };
        if split.cost_diff_pct <= NON_PATHWAY_PREMIUM_THRESHOLD {
            continue;
        }

        let label = ep.core.label.as_str();
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "pathway_cost_correlation".to_string(),
                metric_value: format!(
                    "adherence={}, cost overrun={}",
                    pct(adherence, 0),
                    pct(overrun, 1)
                )
                .into(),
                expected_value: "Pathway adherence >75% when cost exceeds target by >10%".to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Cost overrun of {} correlated with pathway adherence of only {}",
                    pct(overrun, 1),
                    pct(adherence, 0)
                ),
                detail: format!(
                    "Back-calculation: pathway cases cost ~{}, non-pathway cases cost ~{} (+{}). \
                     Verification: ({} x {}) + ({} x {}) = {} ≈ {}. Non-pathway regimens are the \
                     primary cost driver.",
                    money(split.pathway_cost),
                    money(split.non_pathway_cost),
                    pct(split.cost_diff_pct, 0),
                    pct(adherence, 0),
                    money(split.pathway_cost),
                    pct(1.0 - adherence, 0),
                    money(split.non_pathway_cost),
                    money(split.blended(adherence)),
                    money(avg_cost)
                ),
                related_metrics: evidence([
                    ("avg_episode_cost", json!(avg_cost)),
                    ("target_price", json!(target)),
                    ("pathway_adherence", json!(adherence)),
                    ("est_pathway_cost", json!(split.pathway_cost)),
                    ("est_non_pathway_cost", json!(split.non_pathway_cost.round())),
                    ("cost_diff_pct", json!(split.cost_diff_pct)),
                ]),
            },
        );
    }
}

fn eol_systemic_failure(quality: &[QualityMeasure], out: &mut FlagEmitter<'_>) {
    let eol = assess_eol(quality);
    if !eol.is_systemic() {
        return;
    }
    let acp = acp_rate(quality);
    let acp_note = match acp {
        Some(rate) if rate < ACP_ROOT_CAUSE_THRESHOLD => format!(
            " Advance Care Planning documentation is only {} (target >65%), which is a root \
             cause predictor for EOL metric failures.",
            pct(rate, 1)
        ),
        _ => String::new(),
    };

    out.emit(
        Severity::Red,
        Finding {
            metric_name: "eol_systemic_failure".to_string(),
            metric_value: format!("{}/5 EOL metrics failing", eol.failures).into(),
            expected_value: "<3 EOL metric failures".to_string(),
            episode_type: "End-of-Life Care".to_string(),
            description: format!(
                "Systemic palliative care integration failure: {} of 5 EOL metrics are failing \
                 simultaneously",
                eol.failures
            ),
            detail: format!(
                "Failing measures: {}.{acp_note} This pattern indicates a systemic failure to \
                 integrate palliative care, not individual measure failures. Without goals-of-care \
                 conversations, patients default to aggressive treatment at end of life.",
                eol.details.join("; ")
            ),
            related_metrics: evidence([
                ("eol_failures", json!(eol.failures)),
                ("acp_rate", json!(acp)),
            ]),
        },
    );
}

fn quality_gate_proximity(
    quality: &[QualityMeasure],
    episodes: &[OncEpisode],
    contract: &Contract,
    out: &mut FlagEmitter<'_>,
) {
    let Some(gate) = QualityGate::evaluate(quality, contract) else {
        return;
    };
    if gate.passes() {
        return;
    }
    let metric_value = format!(
        "composite {:.1}% ({}/{})",
        gate.composite_pct,
        plain(gate.earned),
        plain(gate.max_points)
    );
    let expected_value = format!("gate minimum {}%", plain(gate.gate_minimum));

    if gate.is_near_miss() {
        let at_risk = savings_at_risk(episodes, contract);
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "quality_gate_proximity".to_string(),
                metric_value: metric_value.into(),
                expected_value,
                episode_type: "Quality Gate".to_string(),
                description: format!(
                    "Quality gate FAILURE: composite {:.1}% is {:.1} points below the {}% minimum: \
                     {} in shared savings at risk",
                    gate.composite_pct,
                    gate.gap,
                    plain(gate.gate_minimum),
                    money(at_risk)
                ),
                detail: format!(
                    "The quality composite score of {}/{} ({:.1}%) falls below the {}% quality gate. \
                     This means the provider's shared savings payout of ~{} may be zeroed out. The \
                     gap is only {:.1} points; identify the lowest-effort measures to close this gap.",
                    plain(gate.earned),
                    plain(gate.max_points),
                    gate.composite_pct,
                    plain(gate.gate_minimum),
                    money(at_risk),
                    gate.gap
                ),
                related_metrics: evidence([
                    ("composite_earned", json!(gate.earned)),
                    ("composite_max", json!(gate.max_points)),
                    ("composite_pct", json!(round_to(gate.composite_pct, 1))),
                    ("gate_minimum", json!(gate.gate_minimum)),
                    ("estimated_savings_at_risk", json!(at_risk.round())),
                ]),
            },
        );
    } else {
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "quality_gate_failure".to_string(),
                metric_value: metric_value.into(),
                expected_value,
                episode_type: "Quality Gate".to_string(),
                description: format!(
                    "Quality gate FAILURE: composite {:.1}% is below the {}% minimum",
                    gate.composite_pct,
                    plain(gate.gate_minimum)
                ),
                detail: format!("Quality gate not met. Gap of {:.1} points.", gate.gap),
                related_metrics: evidence([
                    ("composite_pct", json!(round_to(gate.composite_pct, 1))),
                    ("gate_minimum", json!(gate.gate_minimum)),
                ]),
            },
        );
    }
}

/// Expensive non-biosimilar drugs administered mostly in hospital outpatient
/// departments. Returns `(hopd_pct, avg_cost, claims)` when the drug qualifies.
pub fn hopd_heavy(drug: &DrugLine) -> Option<(f64, f64, f64)> {
    let avg_cost = drug.avg_cost_per_claim.filter(|c| *c > HIGH_COST_PER_CLAIM)?;
    let hopd_pct = drug.hopd_pct.filter(|p| *p > HOPD_SHARE_THRESHOLD)?;
    Some((hopd_pct, avg_cost, drug.total_claims.unwrap_or(0.0)))
}

fn site_of_service_cost(drugs: &[DrugLine], out: &mut FlagEmitter<'_>) {
    for drug in drugs.iter().filter(|d| !d.is_biosimilar) {
        let Some((hopd_pct, avg_cost, claims)) = hopd_heavy(drug) else {
            continue;
        };
        let excess_claims = claims * (hopd_pct - HOPD_TARGET_SHARE);
        let est_excess = excess_claims * avg_cost * HOPD_FACILITY_MARKUP;
        let name = drug.drug_name.as_str();
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "site_of_service_cost".to_string(),
                metric_value: format!("{name}: {} HOPD, {}/claim", pct(hopd_pct, 0), money(avg_cost))
                    .into(),
                expected_value: "HOPD <60% for office-administrable drugs".to_string(),
                episode_type: "Drug Detail".to_string(),
                description: format!(
                    "{name}: {} HOPD administration for a drug costing {}/claim: estimated {} in \
                     excess facility costs",
                    pct(hopd_pct, 0),
                    money(avg_cost),
                    money(est_excess)
                ),
                detail: format!(
                    "This drug is being administered primarily in hospital outpatient settings ({}) \
                     when it could be safely given in physician offices. HOPD infusion costs 2-3x \
                     office administration in facility fees.",
                    pct(hopd_pct, 0)
                ),
                related_metrics: evidence([
                    ("drug_name", json!(name)),
                    ("hopd_pct", json!(hopd_pct)),
                    ("avg_cost_per_claim", json!(avg_cost)),
                    ("total_claims", json!(claims)),
                    ("estimated_excess_cost", json!(est_excess.round())),
                ]),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::*;
    use vbc_common::models::SpecialtyRanges;

    fn run_msk(episodes: &[MskEpisode]) -> Vec<Flag> {
        let contract = msk_contract();
        let ranges = SpecialtyRanges::default();
        let ctx = ValidationContext {
            contract: &contract,
            ranges: &ranges,
            data: SpecialtyData::Msk {
                episodes,
                quality: &[],
            },
        };
        CrossMetricChecker.validate(&ctx, &mut FlagSequence::new())
    }

    fn run_onc(episodes: &[OncEpisode], quality: &[QualityMeasure], drugs: &[DrugLine]) -> Vec<Flag> {
        let contract = onc_contract();
        let ranges = SpecialtyRanges::default();
        let ctx = ValidationContext {
            contract: &contract,
            ranges: &ranges,
            data: SpecialtyData::Oncology {
                episodes,
                quality,
                drugs,
            },
        };
        CrossMetricChecker.validate(&ctx, &mut FlagSequence::new())
    }

    fn names(flags: &[Flag]) -> Vec<&str> {
        flags.iter().map(|f| f.metric_name.as_str()).collect()
    }

    #[test]
    fn test_tkr_discharge_shift_uses_fallback_baselines() {
        let mut tkr = msk_episode("TKR", 100.0, 25_000.0, 25_000.0);
        tkr.discharge_home_pct = Some(0.74);
        tkr.er_visit_rate_90d = Some(0.14);
        let flags = run_msk(&[tkr.clone()]);
        assert_eq!(names(&flags), vec!["discharge_shift_er_correlation"]);
        assert_eq!(flags[0].flag_id, "CROSS-001");
        assert_eq!(flags[0].related_metrics["prior_year_home_pct"], json!(0.62));

        // THR has no fallback baseline
        let mut thr = tkr.clone();
        thr.episode_type = MskEpisodeType::Thr;
        thr.core.label = "THR".to_string();
        assert!(run_msk(&[thr]).is_empty());
    }

    #[test]
    fn test_discharge_shift_prefers_row_prior_year() {
        let mut tkr = msk_episode("TKR", 100.0, 25_000.0, 25_000.0);
        tkr.discharge_home_pct = Some(0.74);
        tkr.er_visit_rate_90d = Some(0.14);
        tkr.prior_year_discharge_home_pct = Some(0.70);
        tkr.prior_year_er_visit_rate_90d = Some(0.13);
        assert!(run_msk(&[tkr.clone()]).is_empty());

        let mut thr = tkr;
        thr.episode_type = MskEpisodeType::Thr;
        thr.prior_year_discharge_home_pct = Some(0.55);
        thr.prior_year_er_visit_rate_90d = Some(0.05);
        assert_eq!(names(&run_msk(&[thr])), vec!["discharge_shift_er_correlation"]);
    }

    #[test]
    fn test_risk_score_divergence() {
        let mut ep = msk_episode("THR", 10.0, 1.0, 1.0);
        ep.core.risk_score_actual = Some(1.0);
        ep.core.risk_score_expected = Some(1.2);
        let flags = run_msk(&[ep]);
        assert_eq!(names(&flags), vec!["risk_score_calibration"]);
        assert_eq!(flags[0].severity, Severity::Yellow);
    }

    #[test]
    fn test_arthroscopy_volume_and_ratio() {
        // 300 per 10,000 members = 30/1,000
        let arth = msk_episode("Knee Arthroscopy", 300.0, 1.0, 1.0);
        let cons = msk_episode("Conservative Joint", 500.0, 1.0, 1.0);
        let flags = run_msk(&[arth, cons]);
        assert_eq!(
            names(&flags),
            vec!["volume_per_1000", "arthroscopy_to_conservative_ratio"]
        );
        assert_eq!(
            flags[1].metric_value,
            vbc_common::models::MetricValue::from("0.60:1")
        );
    }

    #[test]
    fn test_surgical_pipeline_acceleration() {
        let mut lbp = msk_episode("Conservative LBP", 180.0, 1.0, 1.0);
        lbp.core.prior_year_episode_count = Some(200.0);
        let mut fusion = msk_episode("Spinal Fusion 1-2", 60.0, 1.0, 1.0);
        fusion.core.prior_year_episode_count = Some(45.0);
        let flags = run_msk(&[lbp.clone(), fusion.clone()]);
        assert_eq!(names(&flags), vec!["surgical_pipeline_acceleration"]);

        fusion.core.prior_year_episode_count = Some(55.0);
        assert!(run_msk(&[lbp, fusion]).is_empty());
    }

    #[test]
    fn test_pathway_cost_back_calculation_flag() {
        let mut ep = onc_episode("Lung", "NSCLC", "1L", 50.0, 120_000.0, 100_000.0);
        ep.pathway_adherence_rate = Some(0.70);
        let flags = run_onc(&[ep], &[], &[]);
        assert_eq!(names(&flags), vec!["pathway_cost_correlation"]);
        let pct = flags[0].related_metrics["cost_diff_pct"].as_f64().unwrap();
        assert!((pct - 0.6667).abs() < 1e-4);
        assert_eq!(flags[0].related_metrics["est_non_pathway_cost"], json!(166_667.0));
    }

    #[test]
    fn test_eol_cluster_with_acp_note() {
        let quality = vec![
            measure("ONC-Q-002", "Chemo", 0.15, 0.10),
            measure("ONC-Q-003", "Hospice", 0.40, 0.55),
            measure("ONC-Q-005", "ICU", 0.20, 0.15),
            measure("ONC-Q-009", "ACP", 0.35, 0.65),
        ];
        let flags = run_onc(&[], &quality, &[]);
        assert_eq!(names(&flags), vec!["eol_systemic_failure"]);
        assert!(flags[0].detail.contains("Advance Care Planning documentation is only 35.0%"));

        let flags = run_onc(&[], &quality[..2], &[]);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_quality_gate_near_miss_and_failure() {
        // 1,000,000 target vs 900,000 cost: 100,000 savings, 50% share
        let episodes = vec![onc_episode("Breast", "Early", "1L", 100.0, 9_000.0, 10_000.0)];

        let near = vec![scored("ONC-COMP", "Composite", 100.0, 67.0)];
        let flags = run_onc(&episodes, &near, &[]);
        assert_eq!(names(&flags), vec!["quality_gate_proximity"]);
        assert_eq!(
            flags[0].related_metrics["estimated_savings_at_risk"],
            json!(50_000.0)
        );

        let far = vec![scored("ONC-COMP", "Composite", 100.0, 60.0)];
        let flags = run_onc(&episodes, &far, &[]);
        assert_eq!(names(&flags), vec!["quality_gate_failure"]);
        assert!(!flags[0].related_metrics.contains_key("estimated_savings_at_risk"));

        let pass = vec![scored("ONC-COMP", "Composite", 100.0, 75.0)];
        assert!(run_onc(&episodes, &pass, &[]).is_empty());
    }

    #[test]
    fn test_site_of_service_excludes_biosimilars() {
        let mut brand = drug("Pembrolizumab", 100.0, 10_000.0);
        brand.hopd_pct = Some(0.80);
        let mut bio = drug("Trastuzumab-dkst", 100.0, 3_000.0);
        bio.hopd_pct = Some(0.80);
        bio.is_biosimilar = true;
        let mut cheap = drug("Ondansetron", 100.0, 50.0);
        cheap.hopd_pct = Some(0.90);

        let flags = run_onc(&[], &[], &[brand, bio, cheap]);
        assert_eq!(names(&flags), vec!["site_of_service_cost"]);
        // (0.80 - 0.40) x 100 x 10,000 x 0.30
        assert_eq!(
            flags[0].related_metrics["estimated_excess_cost"],
            json!(120_000.0)
        );
    }
}
