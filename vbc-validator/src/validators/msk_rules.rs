// MSK specialty rules: clinical and financial logic for musculoskeletal
// episodes

use super::common::{per_1000, round_to};
use super::cross_metric::ARTHROSCOPY_MAX_PER_1000;
use super::{SpecialtyData, ValidationContext, Validator};
use serde_json::json;
use tracing::debug;
use vbc_common::dataset::{MskEpisode, MskEpisodeType};
use vbc_common::human_fmt::{money, pct, plain, plain_or_na, thousands};
use vbc_common::models::{
    evidence, prefix, Category, Contract, Finding, Flag, FlagEmitter, FlagSequence, Severity,
};

const POST_ACUTE_RATIO_MAX: f64 = 0.20;
const OPIOID_MME_CAUTION: f64 = 50.0;
const OPIOID_MME_HIGH: f64 = 90.0;
const PROM_COLLECTION_MIN: f64 = 0.50;
const FUSION_3_PLUS_SHARE_MAX: f64 = 0.30;

/// Maximum implant share of episode cost for a procedure, with the
/// benchmark category it belongs to
fn implant_benchmark(kind: &MskEpisodeType) -> Option<(f64, &'static str)> {
    match kind {
        MskEpisodeType::Tkr | MskEpisodeType::Thr | MskEpisodeType::RotatorCuff => {
            Some((0.20, "joint_replacement"))
        }
        MskEpisodeType::SpinalFusion1To2 | MskEpisodeType::SpinalFusion3Plus => {
            Some((0.25, "spinal_fusion"))
        }
        MskEpisodeType::KneeArthroscopy => Some((0.10, "arthroscopy")),
        _ => None,
    }
}

pub struct MskRules;

impl Validator for MskRules {
    fn name(&self) -> &'static str {
        "msk_rules"
    }

    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag> {
        let SpecialtyData::Msk { episodes, .. } = ctx.data else {
            return Vec::new();
        };
        let mut out = ids.emitter(prefix::MSK, Category::Specialty, &ctx.contract.contract_id);

        implant_cost_ratio(episodes, &mut out);
        arthroscopy_volume(episodes, ctx.contract, &mut out);
        post_acute_cost_ratio(episodes, &mut out);
        opioid_prescribing(episodes, &mut out);
        prom_reliability(episodes, &mut out);
        fusion_level_distribution(episodes, &mut out);

        let flags = out.finish();
        debug!(checker = self.name(), flags = flags.len(), "Checker complete");
        flags
    }
}

fn implant_cost_ratio(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes {
        let Some((max_ratio, category)) = implant_benchmark(&ep.episode_type) else {
            continue;
        };
        let (Some(implant), Some(avg_cost)) =
            (ep.implant_cost_avg, ep.core.avg_episode_cost.filter(|c| *c != 0.0))
        else {
            continue;
        };
        let ratio = implant / avg_cost;
        if ratio <= max_ratio {
            continue;
        }

        let label = ep.core.label.as_str();
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "implant_cost_ratio".to_string(),
                metric_value: pct(ratio, 1).into(),
                expected_value: format!("<{} for {category}", pct(max_ratio, 0)),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Implant cost is {} of total episode cost ({}/{}), exceeding {} benchmark",
                    pct(ratio, 1),
                    money(implant),
                    money(avg_cost),
                    pct(max_ratio, 0)
                ),
                detail: format!(
                    "Implant cost avg {} represents {} of total episode cost {}. Industry benchmark \
                     for {category} is <{}. This may indicate premium device selection or \
                     unfavorable vendor pricing. Note: risk score actual ({}) vs expected ({}) \
                     shows the overrun is NOT explained by case complexity.",
                    money(implant),
                    pct(ratio, 1),
                    money(avg_cost),
                    pct(max_ratio, 0),
                    plain_or_na(ep.core.risk_score_actual),
                    plain_or_na(ep.core.risk_score_expected)
                ),
                related_metrics: evidence([
                    ("implant_cost_avg", json!(implant)),
                    ("avg_episode_cost", json!(avg_cost)),
                    ("implant_ratio", json!(round_to(ratio, 4))),
                    ("benchmark_max", json!(max_ratio)),
                    ("risk_score_actual", json!(ep.core.risk_score_actual)),
                    ("risk_score_expected", json!(ep.core.risk_score_expected)),
                ]),
            },
        );
    }
}

/// Overlaps with the cross-metric volume check; both are reported.
fn arthroscopy_volume(episodes: &[MskEpisode], contract: &Contract, out: &mut FlagEmitter<'_>) {
    let Some(arth) = episodes
        .iter()
        .find(|ep| ep.episode_type == MskEpisodeType::KneeArthroscopy)
    else {
        return;
    };
    let count = arth.core.episode_count.unwrap_or(0.0);
    let Some(rate) = per_1000(count, contract.members()) else {
        return;
    };
    if rate <= ARTHROSCOPY_MAX_PER_1000 {
        return;
    }

    out.emit(
        Severity::Red,
        Finding {
            metric_name: "arthroscopy_volume".to_string(),
            metric_value: format!("{rate:.1}/1,000 members").into(),
            expected_value: "15-25/1,000 for MA population".to_string(),
            episode_type: arth.core.label.clone(),
            description: format!(
                "Knee arthroscopy rate of {rate:.1}/1,000 exceeds expected MA range: potential \
                 overutilization"
            ),
            detail: format!(
                "{} arthroscopy episodes for {} members = {rate:.1}/1,000. Multiple RCTs show \
                 arthroscopic debridement for knee OA (the most common MA-age indication) is \
                 clinically ineffective. This rate significantly exceeds the expected MA range \
                 of 15-25/1,000.",
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

fn post_acute_cost_ratio(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes.iter().filter(|ep| ep.episode_type.is_joint_replacement()) {
        let (Some(post_acute), Some(avg_cost)) =
            (ep.post_acute_cost_avg, ep.core.avg_episode_cost.filter(|c| *c != 0.0))
        else {
            continue;
        };
        let ratio = post_acute / avg_cost;
        if ratio <= POST_ACUTE_RATIO_MAX {
            continue;
        }
        let label = ep.core.label.as_str();
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "post_acute_cost_ratio".to_string(),
                metric_value: pct(ratio, 1).into(),
                expected_value: "<20% of total episode cost".to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Post-acute costs are {} of total episode cost ({}/{})",
                    pct(ratio, 1),
                    money(post_acute),
                    money(avg_cost)
                ),
                detail: format!(
                    "Post-acute spending (SNF, IRF, home health) at {} of total episode cost \
                     exceeds the 20% benchmark. Consider care coordination improvements and \
                     discharge planning optimization.",
                    pct(ratio, 1)
                ),
                related_metrics: evidence([
                    ("post_acute_cost_avg", json!(post_acute)),
                    ("avg_episode_cost", json!(avg_cost)),
                    ("discharge_home_pct", json!(ep.discharge_home_pct)),
                    ("discharge_snf_pct", json!(ep.discharge_snf_pct)),
                ]),
            },
        );
    }
}

fn opioid_prescribing(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes.iter().filter(|ep| !ep.episode_type.is_conservative()) {
        let Some(mme) = ep.avg_opioid_mme_discharge.filter(|m| *m > OPIOID_MME_CAUTION) else {
            continue;
        };
        let severity = if mme > OPIOID_MME_HIGH {
            Severity::Red
        } else {
            Severity::Yellow
        };
        let label = ep.core.label.as_str();
        out.emit(
            severity,
            Finding {
                metric_name: "opioid_mme_discharge".to_string(),
                metric_value: format!("{} MME", plain(mme)).into(),
                expected_value: "<50 MME (CDC guideline-informed)".to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Average discharge opioid prescription of {} MME exceeds 50 MME threshold",
                    plain(mme)
                ),
                detail: format!(
                    "CDC-informed guidelines suggest discharge opioid prescriptions should average \
                     <50 MME. Current average of {} MME for {label} may indicate opportunity for \
                     enhanced recovery protocols or multimodal pain management.",
                    plain(mme)
                ),
                related_metrics: evidence([("avg_opioid_mme_discharge", json!(mme))]),
            },
        );
    }
}

fn prom_reliability(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    for ep in episodes.iter().filter(|ep| !ep.episode_type.is_conservative()) {
        let Some(collection) = ep.prom_collection_rate.filter(|r| *r < PROM_COLLECTION_MIN) else {
            continue;
        };
        let improvement = ep
            .prom_improvement_rate
            .map(|r| pct(r, 1))
            .unwrap_or_else(|| "N/A".to_string());
        let label = ep.core.label.as_str();
        out.emit(
            Severity::Red,
            Finding {
                metric_name: "prom_collection_reliability".to_string(),
                metric_value: format!("{} collection rate", pct(collection, 0)).into(),
                expected_value: ">50% for reliable outcome measurement".to_string(),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: PROM collection rate of {} renders outcome measures unreliable",
                    pct(collection, 0)
                ),
                detail: format!(
                    "With only {} PROM collection, the reported improvement rate of {improvement} \
                     is measured on a biased sample. Compliant patients who return PROMs likely \
                     have better outcomes than non-responders. This is an operational/data capture \
                     problem, not a care quality problem: the provider lacks a systematic PROM \
                     collection workflow.",
                    pct(collection, 0)
                ),
                related_metrics: evidence([
                    ("prom_collection_rate", json!(collection)),
                    ("prom_improvement_rate", json!(ep.prom_improvement_rate)),
                ]),
            },
        );
    }
}

fn fusion_level_distribution(episodes: &[MskEpisode], out: &mut FlagEmitter<'_>) {
    let first_count = |kind: MskEpisodeType| {
        episodes
            .iter()
            .find(|ep| ep.episode_type == kind)
            .map(|ep| ep.core.episode_count.unwrap_or(0.0))
    };
    let (Some(count_12), Some(count_3p)) = (
        first_count(MskEpisodeType::SpinalFusion1To2),
        first_count(MskEpisodeType::SpinalFusion3Plus),
    ) else {
        return;
    };
    let total = count_12 + count_3p;
    if total <= 0.0 {
        return;
    }
    let share_3p = count_3p / total;
    if share_3p <= FUSION_3_PLUS_SHARE_MAX {
        return;
    }

    out.emit(
        Severity::Yellow,
        Finding {
            metric_name: "fusion_complexity_distribution".to_string(),
            metric_value: format!("{} are 3+ level fusions", pct(share_3p, 0)).into(),
            expected_value: "<30% of fusions should be 3+ levels".to_string(),
            episode_type: "Spinal Fusion".to_string(),
            description: format!(
                "Spinal fusion 3+ level cases are {} of total fusions: potential case complexity \
                 concern",
                pct(share_3p, 0)
            ),
            detail: format!(
                "{} of {} fusion cases ({}) are 3+ levels. Above 30%, this warrants risk \
                 adjustment review to ensure benchmarks adequately account for case complexity.",
                plain(count_3p),
                plain(total),
                pct(share_3p, 0)
            ),
            related_metrics: evidence([
                ("fusion_1_2_count", json!(count_12)),
                ("fusion_3_plus_count", json!(count_3p)),
                ("pct_3_plus", json!(round_to(share_3p, 3))),
            ]),
        },
    );
}
