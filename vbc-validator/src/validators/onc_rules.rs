// Oncology specialty rules: clinical and financial logic for oncology
// episodes, quality measures and drug utilization

use super::common::{
    acp_rate, assess_eol, back_calculate, per_1000, round_to, savings_at_risk, QualityGate,
    ACP_ROOT_CAUSE_THRESHOLD,
};
use super::cross_metric::{hopd_heavy, HOPD_TARGET_SHARE, NON_PATHWAY_PREMIUM_THRESHOLD};
use super::{SpecialtyData, ValidationContext, Validator};
use chrono::{Months, NaiveDate};
use serde_json::{json, Value};
use tracing::{debug, warn};
use vbc_common::dataset::{CancerType, DrugLine, OncEpisode, QualityMeasure};
use vbc_common::human_fmt::{money, pct, plain, thousands};
use vbc_common::models::{
    evidence, prefix, BiosimilarPair, Category, Contract, Finding, Flag, FlagEmitter,
    FlagSequence, Severity, SpecialtyRanges,
};

const PATHWAY_OVERRUN_THRESHOLD: f64 = 0.05;
const BRAND_SHARE_CAUTION: f64 = 0.50;
const BRAND_SHARE_HIGH: f64 = 0.80;
const HOPD_SAVINGS_MARKUP: f64 = 0.50;
const SITE_OF_SERVICE_MIN_SAVINGS: f64 = 5_000.0;
const IMPROVEMENT_CANDIDATES: usize = 3;
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct OncologyRules;

impl Validator for OncologyRules {
    fn name(&self) -> &'static str {
        "onc_rules"
    }

    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag> {
        let SpecialtyData::Oncology {
            episodes,
            quality,
            drugs,
        } = ctx.data
        else {
            return Vec::new();
        };
        let contract = ctx.contract;
        let mut out = ids.emitter(prefix::ONCOLOGY, Category::Specialty, &contract.contract_id);

        pathway_adherence_cost(episodes, contract, &mut out);
        biosimilar_savings(drugs, episodes, ctx.ranges, &mut out);
        site_of_service_savings(drugs, &mut out);
        acp_root_cause(quality, &mut out);
        novel_therapy_carveout(drugs, episodes, contract, &mut out);
        volume_vs_incidence(episodes, ctx.ranges, contract, &mut out);
        quality_gate_improvement_path(quality, episodes, contract, &mut out);

        let flags = out.finish();
        debug!(checker = self.name(), flags = flags.len(), "Checker complete");
        flags
    }
}

fn pathway_adherence_cost(episodes: &[OncEpisode], contract: &Contract, out: &mut FlagEmitter<'_>) {
    let pathway_target = contract.pathway_adherence_target;

    for ep in episodes {
        let (Some(adherence), Some(avg_cost), Some(target)) = (
            ep.pathway_adherence_rate,
            ep.core.avg_episode_cost,
            ep.core.target_price,
        ) else {
            continue;
        };
        if adherence >= pathway_target || avg_cost <= target {
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

        let count = ep.core.episode_count.unwrap_or(0.0);
        let non_pathway_count = (count * (1.0 - adherence)).floor();
        let potential_savings = non_pathway_count * split.cost_diff;
        let label = ep.core.label.as_str();

        out.emit(
            Severity::Red,
            Finding {
                metric_name: "pathway_cost_correlation".to_string(),
                metric_value: format!(
                    "adherence={}, overrun={}",
                    pct(adherence, 0),
                    pct(overrun, 1)
                )
                .into(),
                expected_value: format!("pathway adherence >{}", pct(pathway_target, 0)),
                episode_type: label.to_string(),
                description: format!(
                    "{label}: Non-pathway regimens cost {}/episode vs {} pathway (+{}), driving {} \
                     in excess cost",
                    money(split.non_pathway_cost),
                    money(split.pathway_cost),
                    pct(split.cost_diff_pct, 0),
                    money(potential_savings)
                ),
                detail: format!(
                    "Back-calculation: ({} x {}) + ({} x {}) = {} ≈ {}. The {} non-pathway cases \
                     ({} episodes) are the primary cost driver. Improving pathway adherence to {} \
                     would save approximately {} across this episode type.",
                    pct(adherence, 0),
                    money(split.pathway_cost),
                    pct(1.0 - adherence, 0),
                    money(split.non_pathway_cost),
                    money(split.blended(adherence)),
                    money(avg_cost),
                    pct(1.0 - adherence, 0),
                    plain(non_pathway_count),
                    pct(pathway_target, 0),
                    money(potential_savings)
                ),
                related_metrics: evidence([
                    ("pathway_adherence", json!(adherence)),
                    ("avg_episode_cost", json!(avg_cost)),
                    ("target_price", json!(target)),
                    ("est_pathway_cost", json!(split.pathway_cost)),
                    ("est_non_pathway_cost", json!(split.non_pathway_cost.round())),
                    ("potential_savings", json!(potential_savings.round())),
                ]),
            },
        );
    }
}

/// First drug line for each side of a configured pair. The brand side must
/// not itself be marked biosimilar.
fn pair_lines<'a>(drugs: &'a [DrugLine], pair: &BiosimilarPair) -> Option<(&'a DrugLine, &'a DrugLine)> {
    let brand = drugs
        .iter()
        .find(|d| d.drug_name == pair.brand && !d.is_biosimilar)?;
    let bio = drugs.iter().find(|d| d.drug_name == pair.biosimilar)?;
    Some((brand, bio))
}

fn biosimilar_savings(
    drugs: &[DrugLine],
    episodes: &[OncEpisode],
    ranges: &SpecialtyRanges,
    out: &mut FlagEmitter<'_>,
) {
    let total_episodes: f64 = episodes.iter().filter_map(|ep| ep.core.episode_count).sum();

    for pair in &ranges.biosimilar_pairs {
        let Some((brand, bio)) = pair_lines(drugs, pair) else {
            continue;
        };
        let brand_claims = brand.total_claims.unwrap_or(0.0);
        let bio_claims = bio.total_claims.unwrap_or(0.0);
        let total_claims = brand_claims + bio_claims;
        if total_claims == 0.0 {
            continue;
        }
        let brand_share = brand_claims / total_claims;
        if brand_share <= BRAND_SHARE_CAUTION {
            continue;
        }

        let brand_cost = brand.avg_cost_per_claim.unwrap_or(0.0);
        let bio_cost = bio.avg_cost_per_claim.unwrap_or(0.0);
        let potential_savings = brand_claims * (brand_cost - bio_cost);
        let per_episode = if total_episodes > 0.0 {
            potential_savings / total_episodes
        } else {
            0.0
        };
        let severity = if brand_share > BRAND_SHARE_HIGH {
            Severity::Red
        } else {
            Severity::Yellow
        };
        let brand_name = brand.drug_name.as_str();
        let bio_name = bio.drug_name.as_str();

        out.emit(
            severity,
            Finding {
                metric_name: "biosimilar_savings_opportunity".to_string(),
                metric_value: format!("{brand_name}: {} brand utilization", pct(brand_share, 0))
                    .into(),
                expected_value: "brand utilization <50%".to_string(),
                episode_type: "Drug Detail".to_string(),
                description: format!(
                    "{brand_name}: {} brand claims at {}/claim vs biosimilar at {}/claim: {} \
                     savings opportunity ({}/episode)",
                    plain(brand_claims),
                    money(brand_cost),
                    money(bio_cost),
                    money(potential_savings),
                    money(per_episode)
                ),
                detail: format!(
                    "Brand {brand_name} has {} claims at {}/claim. Biosimilar {bio_name} has {} \
                     claims at {}/claim. Brand utilization is {} ({}/{}). If all brand claims \
                     switched to biosimilar, savings would be {} x ({} - {}) = {}, or {} per \
                     episode across {} total episodes.",
                    plain(brand_claims),
                    money(brand_cost),
                    plain(bio_claims),
                    money(bio_cost),
                    pct(brand_share, 0),
                    plain(brand_claims),
                    plain(total_claims),
                    plain(brand_claims),
                    money(brand_cost),
                    money(bio_cost),
                    money(potential_savings),
                    money(per_episode),
                    plain(total_episodes)
                ),
                related_metrics: evidence([
                    ("brand_drug", json!(brand_name)),
                    ("biosimilar_drug", json!(bio_name)),
                    ("brand_claims", json!(brand_claims)),
                    ("biosimilar_claims", json!(bio_claims)),
                    ("brand_cost_per_claim", json!(brand_cost)),
                    ("biosimilar_cost_per_claim", json!(bio_cost)),
                    ("potential_savings", json!(potential_savings.round())),
                    ("per_episode_impact", json!(per_episode.round())),
                ]),
            },
        );
    }
}

fn site_of_service_savings(drugs: &[DrugLine], out: &mut FlagEmitter<'_>) {
    for drug in drugs.iter().filter(|d| !d.is_biosimilar) {
        let Some((hopd_pct, avg_cost, claims)) = hopd_heavy(drug) else {
            continue;
        };
        let excess_share = hopd_pct - HOPD_TARGET_SHARE;
        let excess_claims = claims * excess_share;
        let est_savings = excess_claims * avg_cost * HOPD_SAVINGS_MARKUP;
        if est_savings < SITE_OF_SERVICE_MIN_SAVINGS {
            continue;
        }
        let name = drug.drug_name.as_str();

        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "site_of_service_opportunity".to_string(),
                metric_value: format!("{name}: {} HOPD, {}/claim", pct(hopd_pct, 0), money(avg_cost))
                    .into(),
                expected_value: "HOPD <60% for office-administrable drugs".to_string(),
                episode_type: "Drug Detail".to_string(),
                description: format!(
                    "{name}: {} administered at HOPD vs {} target: estimated {} in excess \
                     facility costs",
                    pct(hopd_pct, 0),
                    pct(HOPD_TARGET_SHARE, 0),
                    money(est_savings)
                ),
                detail: format!(
                    "{name} has {} claims at {}/claim with {} HOPD administration. Shifting the \
                     excess {} ({excess_claims:.0} claims) from HOPD to physician office could \
                     save an estimated {} in facility fees. HOPD infusion typically costs 2-3x \
                     physician office administration.",
                    plain(claims),
                    money(avg_cost),
                    pct(hopd_pct, 0),
                    pct(excess_share, 0),
                    money(est_savings)
                ),
                related_metrics: evidence([
                    ("drug_name", json!(name)),
                    ("hopd_pct", json!(hopd_pct)),
                    ("avg_cost_per_claim", json!(avg_cost)),
                    ("total_claims", json!(claims)),
                    ("excess_hopd_claims", json!(excess_claims.round())),
                    ("estimated_savings", json!(est_savings.round())),
                ]),
            },
        );
    }
}

fn acp_root_cause(quality: &[QualityMeasure], out: &mut FlagEmitter<'_>) {
    let Some(acp) = acp_rate(quality).filter(|r| *r < ACP_ROOT_CAUSE_THRESHOLD) else {
        return;
    };
    let eol = assess_eol(quality);
    if !eol.is_systemic() {
        return;
    }
    let failures = eol.failures;

    out.emit(
        Severity::Red,
        Finding {
            metric_name: "acp_root_cause".to_string(),
            metric_value: format!("ACP rate {}, {failures}/5 EOL metrics failing", pct(acp, 1)).into(),
            expected_value: "ACP >50% to support EOL quality metrics".to_string(),
            episode_type: "End-of-Life Care".to_string(),
            description: format!(
                "Advance Care Planning ({}) is the root cause of systemic EOL metric failure: \
                 {failures}/5 EOL measures failing",
                pct(acp, 1)
            ),
            detail: format!(
                "The Advance Care Planning documentation rate of {} (target >65%) is below the 50% \
                 threshold that predicts EOL metric failures. Without documented goals-of-care \
                 conversations, patients default to aggressive end-of-life treatment. Improving \
                 ACP is the single intervention that addresses all {failures} failing EOL measures \
                 simultaneously. This is a process/workflow fix, not a clinical quality problem.",
                pct(acp, 1)
            ),
            related_metrics: evidence([("acp_rate", json!(acp)), ("eol_failures", json!(failures))]),
        },
    );
}

struct NovelDrug<'a> {
    name: &'a str,
    total_cost: f64,
}

fn novel_therapy_carveout(
    drugs: &[DrugLine],
    episodes: &[OncEpisode],
    contract: &Contract,
    out: &mut FlagEmitter<'_>,
) {
    if !contract.novel_therapy_carveout {
        return;
    }
    let lookback = contract.novel_therapy_lookback_months;
    let Ok(as_of) = NaiveDate::parse_from_str(&contract.data_as_of, DATE_FORMAT) else {
        warn!(
            contract_id = %contract.contract_id,
            data_as_of = %contract.data_as_of,
            "Unparseable data_as_of; skipping novel therapy carve-out"
        );
        return;
    };
    let Some(cutoff) = as_of.checked_sub_months(Months::new(lookback)) else {
        return;
    };

    let mut novel = Vec::new();
    for drug in drugs.iter().filter(|d| d.is_novel_therapy) {
        let raw = drug.fda_approval_date.as_deref().unwrap_or_default();
        let approved = match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => date,
            Err(_) => {
                warn!(drug = %drug.drug_name, fda_approval_date = raw, "Unparseable FDA approval date");
                continue;
            }
        };
        if approved >= cutoff {
            novel.push(NovelDrug {
                name: &drug.drug_name,
                total_cost: drug.total_cost.unwrap_or(0.0),
            });
        }
    }
    if novel.is_empty() {
        return;
    }

    let novel_total: f64 = novel.iter().map(|d| d.total_cost).sum();
    let total_cost: f64 = episodes.iter().filter_map(|ep| ep.core.total_cost).sum();
    let total_target: f64 = episodes.iter().filter_map(|ep| ep.core.total_target).sum();
    let savings_before = total_target - total_cost;
    let savings_after = total_target - (total_cost - novel_total);
    let impact = (savings_after - savings_before) * contract.sharing_rate_savings;
    let drug_list = novel
        .iter()
        .map(|d| format!("{} ({})", d.name, money(d.total_cost)))
        .collect::<Vec<_>>()
        .join("; ");

    out.emit(
        Severity::Yellow,
        Finding {
            metric_name: "novel_therapy_carveout".to_string(),
            metric_value: format!("{} in novel therapy costs", money(novel_total)).into(),
            expected_value: "These costs may be carved out per contract terms".to_string(),
            episode_type: "Drug Detail".to_string(),
            description: format!(
                "Novel therapy carve-out: {} in costs from {} drug(s) approved within \
                 {lookback}-month lookback may be excluded from savings calculation",
                money(novel_total),
                novel.len()
            ),
            detail: format!(
                "Contract specifies novel therapy carve-out for drugs approved within {lookback} \
                 months of {}. Eligible drugs: {drug_list}. If carved out, total cost decreases by \
                 {}, changing savings from {} to {}. Impact on provider share: {}.",
                contract.data_as_of,
                money(novel_total),
                money(savings_before),
                money(savings_after),
                money(impact)
            ),
            related_metrics: evidence([
                ("novel_drugs", json!(novel.iter().map(|d| d.name).collect::<Vec<_>>())),
                ("novel_total_cost", json!(novel_total)),
                ("savings_before_carveout", json!(savings_before.round())),
                ("savings_after_carveout", json!(savings_after.round())),
                ("provider_share_impact", json!(impact.round())),
            ]),
        },
    );
}

/// Episode counts summed per cancer type, in first-seen order
fn volumes_by_cancer(episodes: &[OncEpisode]) -> Vec<(&str, CancerType, f64)> {
    let mut volumes: Vec<(&str, CancerType, f64)> = Vec::new();
    for ep in episodes {
        let Some(count) = ep.core.episode_count else {
            continue;
        };
        let name = ep.cancer_type.trim();
        match volumes.iter_mut().find(|(n, _, _)| *n == name) {
            Some(entry) => entry.2 += count,
            None => volumes.push((name, ep.cancer, count)),
        }
    }
    volumes
}

fn volume_vs_incidence(
    episodes: &[OncEpisode],
    ranges: &SpecialtyRanges,
    contract: &Contract,
    out: &mut FlagEmitter<'_>,
) {
    for (cancer, kind, total) in volumes_by_cancer(episodes) {
        let Some(reference) = kind
            .incidence_key()
            .and_then(|key| ranges.incidence_rates_ma_per_1000.get(key))
        else {
            continue;
        };
        if reference.expected <= 0.0 {
            continue;
        }
        let Some(rate) = per_1000(total, contract.members()) else {
            return;
        };
        let (min, max, expected) = (reference.min, reference.max, reference.expected);
        let members = thousands(contract.members(), 0);

        let (severity, description, detail) = if rate > 2.0 * max {
            (
                Severity::Red,
                format!(
                    "{cancer} episode rate of {rate:.1}/1,000 is >{}/1,000: potential attribution \
                     problem",
                    plain(2.0 * max)
                ),
                format!(
                    "{} {cancer} episodes for {members} members = {rate:.1}/1,000. Expected range \
                     is {}-{}/1,000. Rate exceeding 2x the maximum suggests a potential \
                     attribution algorithm issue or duplicated episodes.",
                    plain(total),
                    plain(min),
                    plain(max)
                ),
            )
        } else if rate < 0.5 * min {
            (
                Severity::Yellow,
                format!(
                    "{cancer} episode rate of {rate:.1}/1,000 is below expected: potential access \
                     or underdiagnosis concern"
                ),
                format!(
                    "{} {cancer} episodes for {members} members = {rate:.1}/1,000. Expected \
                     minimum is {}/1,000. Low rates may indicate access barriers, \
                     underdiagnosis, or attribution gaps.",
                    plain(total),
                    plain(min)
                ),
            )
        } else {
            continue;
        };

        out.emit(
            severity,
            Finding {
                metric_name: "episode_volume_vs_incidence".to_string(),
                metric_value: format!("{cancer}: {rate:.1}/1,000").into(),
                expected_value: format!(
                    "{}-{}/1,000 (expected {}/1,000)",
                    plain(min),
                    plain(max),
                    plain(expected)
                ),
                episode_type: format!("{cancer} Volume"),
                description,
                detail,
                related_metrics: evidence([
                    ("cancer_type", json!(cancer)),
                    ("episode_count", json!(total)),
                    ("rate_per_1000", json!(round_to(rate, 1))),
                    ("expected_rate", json!(expected)),
                ]),
            },
        );
    }
}

struct Candidate<'a> {
    measure: &'a QualityMeasure,
    current: f64,
    max: f64,
    gap: f64,
}

impl Candidate<'_> {
    fn to_json(&self) -> Value {
        json!({
            "measure": self.measure.measure_name,
            "current_points": self.current,
            "max_points": self.max,
            "gap": self.gap,
            "rate": self.measure.rate,
            "target": self.measure.target,
        })
    }
}

/// Non-composite measures with points left to earn, smallest gap first
fn improvement_candidates(quality: &[QualityMeasure]) -> Vec<Candidate<'_>> {
    let mut candidates: Vec<_> = quality
        .iter()
        .filter(|m| !m.is_composite())
        .filter_map(|m| {
            let (current, max) = (m.points_earned?, m.max_points?);
            let gap = max - current;
            (gap > 0.0).then_some(Candidate {
                measure: m,
                current,
                max,
                gap,
            })
        })
        .collect();
    candidates.sort_by(|a, b| a.gap.total_cmp(&b.gap));
    candidates.truncate(IMPROVEMENT_CANDIDATES);
    candidates
}

fn quality_gate_improvement_path(
    quality: &[QualityMeasure],
    episodes: &[OncEpisode],
    contract: &Contract,
    out: &mut FlagEmitter<'_>,
) {
    let Some(gate) = QualityGate::evaluate(quality, contract) else {
        return;
    };
    if !gate.is_near_miss() {
        return;
    }
    let at_risk = savings_at_risk(episodes, contract);
    let candidates = improvement_candidates(quality);
    let candidate_text = candidates
        .iter()
        .map(|c| {
            format!(
                "{} ({}/{}, gap={}pts)",
                c.measure.measure_name,
                plain(c.current),
                plain(c.max),
                plain(c.gap)
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    let gate_min = plain(gate.gate_minimum);

    out.emit(
        Severity::Red,
        Finding {
            metric_name: "quality_gate_improvement_path".to_string(),
            metric_value: format!(
                "composite {:.1}%, need {gate_min}%, {} at risk",
                gate.composite_pct,
                money(at_risk)
            )
            .into(),
            expected_value: format!("composite >= {gate_min}%"),
            episode_type: "Quality Gate".to_string(),
            description: format!(
                "Quality gate {:.1} points from passing: {} at risk. Easiest improvement: \
                 {candidate_text}",
                gate.gap,
                money(at_risk)
            ),
            detail: format!(
                "The quality composite of {}/{} ({:.1}%) is {:.1} points below the {gate_min}% \
                 gate. Total shared savings at risk: {}. Lowest-effort improvement candidates: \
                 {candidate_text}. Closing this gap requires gaining {:.1} percentage points, \
                 equivalent to ~{:.0} additional quality points.",
                plain(gate.earned),
                plain(gate.max_points),
                gate.composite_pct,
                gate.gap,
                money(at_risk),
                gate.gap,
                gate.gap * gate.max_points / 100.0
            ),
            related_metrics: evidence([
                ("composite_pct", json!(round_to(gate.composite_pct, 1))),
                ("gate_minimum", json!(gate.gate_minimum)),
                ("gap_points", json!(round_to(gate.gap, 1))),
                ("savings_at_risk", json!(at_risk.round())),
                (
                    "improvement_candidates",
                    Value::Array(candidates.iter().map(Candidate::to_json).collect()),
                ),
            ]),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::test_support::*;
    use vbc_common::models::IncidenceRate;

    fn run_with(
        contract: &Contract,
        ranges: &SpecialtyRanges,
        episodes: &[OncEpisode],
        quality: &[QualityMeasure],
        drugs: &[DrugLine],
    ) -> Vec<Flag> {
        let ctx = ValidationContext {
            contract,
            ranges,
            data: SpecialtyData::Oncology {
                episodes,
                quality,
                drugs,
            },
        };
        OncologyRules.validate(&ctx, &mut FlagSequence::new())
    }

    fn run(episodes: &[OncEpisode], quality: &[QualityMeasure], drugs: &[DrugLine]) -> Vec<Flag> {
        run_with(
            &onc_contract(),
            &SpecialtyRanges::default(),
            episodes,
            quality,
            drugs,
        )
    }

    #[test]
    fn test_pathway_savings_estimate() {
        let mut ep = onc_episode("Lung", "NSCLC", "1L", 50.0, 120_000.0, 100_000.0);
        ep.pathway_adherence_rate = Some(0.70);
        let flags = run(&[ep], &[], &[]);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].flag_id, "ONC-001");
        assert_eq!(flags[0].expected_value, "pathway adherence >80%");
        // floor(50 x 0.30) = 15 non-pathway episodes x 66,666.67
        assert_eq!(flags[0].related_metrics["potential_savings"], json!(1_000_000.0));
    }

    #[test]
    fn test_pathway_rule_uses_contract_target() {
        // 78% adherence clears the cross-metric 75% floor but not the 80% target
        let mut ep = onc_episode("Breast", "Early", "1L", 40.0, 115_000.0, 100_000.0);
        ep.pathway_adherence_rate = Some(0.78);
        assert_eq!(run(&[ep.clone()], &[], &[]).len(), 1);

        let mut lenient = onc_contract();
        lenient.pathway_adherence_target = 0.75;
        let flags = run_with(&lenient, &SpecialtyRanges::default(), &[ep], &[], &[]);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_biosimilar_pair_severity() {
        let brand = drug("Trastuzumab (Herceptin)", 90.0, 4_000.0);
        let mut bio = drug("Trastuzumab-dkst", 10.0, 3_000.0);
        bio.is_biosimilar = true;
        let episodes = vec![onc_episode("Breast", "Early", "1L", 100.0, 1.0, 1.0)];

        let flags = run(&episodes, &[], &[brand.clone(), bio.clone()]);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].severity, Severity::Red);
        assert_eq!(flags[0].related_metrics["potential_savings"], json!(90_000.0));
        assert_eq!(flags[0].related_metrics["per_episode_impact"], json!(900.0));

        let mut balanced = brand;
        balanced.total_claims = Some(20.0);
        let flags = run(&episodes, &[], &[balanced, bio.clone()]);
        assert_eq!(flags[0].severity, Severity::Yellow);

        let mut even = drug("Trastuzumab (Herceptin)", 10.0, 4_000.0);
        even.is_biosimilar = false;
        assert!(run(&episodes, &[], &[even, bio]).is_empty());
    }

    #[test]
    fn test_site_of_service_materiality() {
        let mut big = drug("Nivolumab", 100.0, 8_000.0);
        big.hopd_pct = Some(0.75);
        // (0.65 - 0.40) x 2 claims x 2,500 x 0.5 = 625
        let mut small = drug("Leucovorin", 2.0, 2_500.0);
        small.hopd_pct = Some(0.65);

        let flags = run(&[], &[], &[big, small]);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].metric_name, "site_of_service_opportunity");
        assert_eq!(flags[0].related_metrics["estimated_savings"], json!(140_000.0));
    }

    #[test]
    fn test_acp_root_cause_requires_both_conditions() {
        let mut quality = vec![
            measure("ONC-Q-002", "Chemo", 0.15, 0.10),
            measure("ONC-Q-003", "Hospice", 0.40, 0.55),
            measure("ONC-Q-006", "ER", 0.30, 0.20),
            measure("ONC-Q-009", "ACP", 0.35, 0.65),
        ];
        let flags = run(&[], &quality, &[]);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].metric_name, "acp_root_cause");

        quality[3].rate = Some(0.55);
        assert!(run(&[], &quality, &[]).is_empty());
    }

    #[test]
    fn test_novel_therapy_lookback_window() {
        let mut contract = onc_contract();
        contract.novel_therapy_carveout = true;
        contract.data_as_of = "2025-01-15".to_string();
        contract.novel_therapy_lookback_months = 18;

        let mut recent = drug("Datopotamab", 10.0, 20_000.0);
        recent.is_novel_therapy = true;
        recent.fda_approval_date = Some("2024-06-01".to_string());
        let mut old = drug("Enfortumab", 10.0, 20_000.0);
        old.is_novel_therapy = true;
        old.fda_approval_date = Some("2023-07-14".to_string());
        let mut garbled = drug("Tarlatamab", 10.0, 20_000.0);
        garbled.is_novel_therapy = true;
        garbled.fda_approval_date = Some("May 2024".to_string());

        let episodes = vec![onc_episode("Lung", "NSCLC", "1L", 10.0, 110_000.0, 100_000.0)];
        let flags = run_with(
            &contract,
            &SpecialtyRanges::default(),
            &episodes,
            &[],
            &[recent, old, garbled],
        );
        assert_eq!(flags.len(), 1);
        let ev = &flags[0].related_metrics;
        assert_eq!(ev["novel_drugs"], json!(["Datopotamab"]));
        assert_eq!(ev["savings_before_carveout"], json!(-100_000.0));
        assert_eq!(ev["savings_after_carveout"], json!(100_000.0));
        assert_eq!(ev["provider_share_impact"], json!(100_000.0));

        contract.novel_therapy_carveout = false;
        let flags = run_with(&contract, &SpecialtyRanges::default(), &episodes, &[], &[]);
        assert!(flags.is_empty());
    }

    #[test]
    fn test_volume_vs_incidence_aggregates_by_cancer() {
        let mut ranges = SpecialtyRanges::default();
        ranges.incidence_rates_ma_per_1000.insert(
            "breast".to_string(),
            IncidenceRate {
                min: 2.0,
                expected: 3.0,
                max: 4.0,
            },
        );
        ranges.incidence_rates_ma_per_1000.insert(
            "prostate".to_string(),
            IncidenceRate {
                min: 2.0,
                expected: 3.0,
                max: 4.0,
            },
        );
        // Breast: 50 + 40 = 90 episodes / 10k members = 9.0 per 1,000
        let episodes = vec![
            onc_episode("Breast", "Early", "1L", 50.0, 1.0, 1.0),
            onc_episode("Prostate", "Met", "2L", 5.0, 1.0, 1.0),
            onc_episode("Breast", "Met", "1L", 40.0, 1.0, 1.0),
        ];
        let flags = run_with(&onc_contract(), &ranges, &episodes, &[], &[]);
        let got: Vec<_> = flags.iter().map(|f| (f.episode_type.as_str(), f.severity)).collect();
        assert_eq!(
            got,
            vec![
                ("Breast Volume", Severity::Red),
                ("Prostate Volume", Severity::Yellow)
            ]
        );
        assert_eq!(flags[0].related_metrics["rate_per_1000"], json!(9.0));
    }

    #[test]
    fn test_quality_gate_improvement_candidates() {
        let mut contract = onc_contract();
        contract.quality_gate_minimum = 85.0;
        let quality = vec![
            scored("ONC-COMP", "Composite", 100.0, 83.0),
            scored("ONC-Q-001", "Pain Assessment", 10.0, 6.0),
            scored("ONC-Q-003", "Hospice", 10.0, 9.0),
            scored("ONC-Q-007", "Depression Screen", 10.0, 10.0),
            scored("ONC-Q-008", "Smoking", 10.0, 8.0),
            scored("ONC-Q-010", "Survivorship", 10.0, 5.0),
        ];
        let episodes = vec![onc_episode("Breast", "Early", "1L", 100.0, 9_000.0, 10_000.0)];
        let flags = run_with(&contract, &SpecialtyRanges::default(), &episodes, &quality, &[]);
        assert_eq!(flags.len(), 1);
        let flag = &flags[0];
        assert_eq!(flag.metric_name, "quality_gate_improvement_path");
        assert_eq!(flag.related_metrics["savings_at_risk"], json!(50_000.0));

        let candidates = flag.related_metrics["improvement_candidates"]
            .as_array()
            .unwrap();
        let names: Vec<_> = candidates
            .iter()
            .map(|c| c["measure"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Hospice", "Smoking", "Pain Assessment"]);

        contract.quality_gate_minimum = 95.0;
        let flags = run_with(&contract, &SpecialtyRanges::default(), &episodes, &quality, &[]);
        assert!(flags.is_empty());
    }
}
