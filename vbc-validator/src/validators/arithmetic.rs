// Arithmetic reconciliation: internal mathematical consistency of reported figures

use super::{SpecialtyData, ValidationContext, Validator};
use serde_json::json;
use tracing::debug;
use vbc_common::dataset::{Episode, QualityMeasure};
use vbc_common::human_fmt::{money, pct, plain};
use vbc_common::models::{
    evidence, prefix, Category, Contract, Evidence, Finding, Flag, FlagEmitter, FlagSequence,
    Severity,
};

/// Relative tolerance for count × unit ≈ total reconciliations
const TOTAL_TOLERANCE: f64 = 0.01;
/// Absolute tolerance on reported variance
const VARIANCE_TOLERANCE: f64 = 0.005;
/// Relative tolerance for cost components vs average cost
const COMPONENT_TOLERANCE: f64 = 0.05;
/// Absolute tolerance on numerator / denominator vs reported rate
const RATE_TOLERANCE: f64 = 0.005;
/// Points are whole or half numbers; anything larger is a real mismatch
const POINTS_EPSILON: f64 = 1e-9;
/// Relative tolerance for member months vs members × 12
const MEMBER_MONTHS_TOLERANCE: f64 = 0.05;

pub struct ArithmeticChecker;

impl Validator for ArithmeticChecker {
    fn name(&self) -> &'static str {
        "arithmetic"
    }

    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag> {
        let mut out = ids.emitter(prefix::ARITHMETIC, Category::Arithmetic, &ctx.contract.contract_id);

        match ctx.data {
            SpecialtyData::Msk { episodes, .. } => {
                episodes.iter().for_each(|ep| check_episode(ep, &mut out))
            }
            SpecialtyData::Oncology { episodes, .. } => {
                episodes.iter().for_each(|ep| check_episode(ep, &mut out))
            }
        }

        check_quality_points(ctx.data.quality(), &mut out);
        check_quality_rates(ctx.data.quality(), &mut out);
        check_member_months(ctx.contract, &mut out);

        let flags = out.finish();
        debug!(checker = self.name(), flags = flags.len(), "Checker complete");
        flags
    }
}

/// Reconciliations for one episode row; rows with no episodes are skipped.
pub fn check_episode<E: Episode>(episode: &E, out: &mut FlagEmitter<'_>) {
    let core = episode.core();
    let label = core.label.as_str();
    let Some(count) = core.active_count() else {
        return;
    };

    // count × avg ≈ total_cost
    if let (Some(avg), Some(total)) = (core.avg_episode_cost, core.total_cost) {
        let expected_total = count * avg;
        if total != 0.0 {
            let diff_pct = (expected_total - total).abs() / total;
            if diff_pct > TOTAL_TOLERANCE {
                out.emit(
                    Severity::Red,
                    Finding {
                        metric_name: "episode_cost_reconciliation".to_string(),
                        metric_value: format!(
                            "count({}) x avg({}) = {}",
                            plain(count),
                            money(avg),
                            money(expected_total)
                        )
                        .into(),
                        expected_value: format!("total_cost = {}", money(total)),
                        episode_type: label.to_string(),
                        description: format!(
                            "Episode cost does not reconcile for {label}: {} vs {} ({} difference)",
                            money(expected_total),
                            money(total),
                            pct(diff_pct, 1)
                        ),
                        detail: format!(
                            "episode_count ({}) x avg_episode_cost ({}) = {}, but total_cost = {}. \
                             Difference of {} exceeds 1% tolerance.",
                            plain(count),
                            money(avg),
                            money(expected_total),
                            money(total),
                            pct(diff_pct, 1)
                        ),
                        related_metrics: evidence([
                            ("episode_count", json!(count)),
                            ("avg_episode_cost", json!(avg)),
                            ("total_cost", json!(total)),
                        ]),
                    },
                );
            }
        }
    }

    // count × target ≈ total_target
    if let (Some(target), Some(total_target)) = (core.target_price, core.total_target) {
        let expected_target = count * target;
        if total_target != 0.0 {
            let diff_pct = (expected_target - total_target).abs() / total_target;
            if diff_pct > TOTAL_TOLERANCE {
                out.emit(
                    Severity::Red,
                    Finding {
                        metric_name: "target_reconciliation".to_string(),
                        metric_value: format!(
                            "count({}) x target({}) = {}",
                            plain(count),
                            money(target),
                            money(expected_target)
                        )
                        .into(),
                        expected_value: format!("total_target = {}", money(total_target)),
                        episode_type: label.to_string(),
                        description: format!("Target does not reconcile for {label}"),
                        detail: format!(
                            "episode_count ({}) x target_price ({}) = {}, but total_target = {}.",
                            plain(count),
                            money(target),
                            money(expected_target),
                            money(total_target)
                        ),
                        related_metrics: evidence([
                            ("episode_count", json!(count)),
                            ("target_price", json!(target)),
                            ("total_target", json!(total_target)),
                        ]),
                    },
                );
            }
        }
    }

    // (avg − target) / target ≈ variance_pct
    if let (Some(target), Some(avg), Some(variance)) =
        (core.target_price, core.avg_episode_cost, core.variance_pct)
    {
        if target != 0.0 {
            let expected_var = (avg - target) / target;
            if (expected_var - variance).abs() > VARIANCE_TOLERANCE {
                out.emit(
                    Severity::Yellow,
                    Finding {
                        metric_name: "variance_calculation".to_string(),
                        metric_value: format!("reported variance = {variance:.4}").into(),
                        expected_value: format!("calculated variance = {expected_var:.4}"),
                        episode_type: label.to_string(),
                        description: format!(
                            "Variance percentage does not match calculation for {label}"
                        ),
                        detail: format!(
                            "(avg_cost - target) / target = ({} - {}) / {} = {expected_var:.4}, \
                             but variance_pct = {variance:.4}.",
                            plain(avg),
                            plain(target),
                            plain(target)
                        ),
                        related_metrics: evidence([
                            ("avg_episode_cost", json!(avg)),
                            ("target_price", json!(target)),
                            ("variance_pct", json!(variance)),
                        ]),
                    },
                );
            }
        }
    }

    // cost components ≈ avg cost
    let components: Evidence = episode
        .cost_components()
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), json!(v))))
        .collect();
    let component_sum: f64 = episode
        .cost_components()
        .into_iter()
        .filter_map(|(_, value)| value)
        .sum();
    if let Some(avg) = core.avg_episode_cost.filter(|a| *a > 0.0) {
        if !components.is_empty() {
            let diff_pct = (component_sum - avg).abs() / avg;
            if diff_pct > COMPONENT_TOLERANCE {
                out.emit(
                    Severity::Yellow,
                    Finding {
                        metric_name: "cost_component_sum".to_string(),
                        metric_value: format!("component sum = {}", money(component_sum)).into(),
                        expected_value: format!("avg_episode_cost = {} (within 5%)", money(avg)),
                        episode_type: label.to_string(),
                        description: format!(
                            "Cost components sum to {} vs avg cost {} for {label} ({} difference)",
                            money(component_sum),
                            money(avg),
                            pct(diff_pct, 1)
                        ),
                        detail: format!(
                            "Cost breakdown: {}. Sum = {}. Difference of {} exceeds 5% tolerance \
                             (may indicate uncategorized costs).",
                            serde_json::Value::Object(components.clone().into_iter().collect()),
                            money(component_sum),
                            pct(diff_pct, 1)
                        ),
                        related_metrics: components,
                    },
                );
            }
        }
    }
}

/// Composite points vs the sum of its component measures
pub fn check_quality_points(quality: &[QualityMeasure], out: &mut FlagEmitter<'_>) {
    let Some(composite) = quality.iter().find(|m| m.is_composite()) else {
        return;
    };
    let Some(reported_earned) = composite.points_earned else {
        return;
    };
    let components = quality.iter().filter(|m| !m.is_composite());
    let calculated_earned: f64 = components.clone().filter_map(|m| m.points_earned).sum();
    let calculated_max: f64 = components.filter_map(|m| m.max_points).sum();

    if (calculated_earned - reported_earned).abs() > POINTS_EPSILON {
        let reported_max = composite.max_points.map(plain).unwrap_or_else(|| "N/A".to_string());
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "quality_points_sum".to_string(),
                metric_value: format!("reported = {}", plain(reported_earned)).into(),
                expected_value: format!("sum of components = {}", plain(calculated_earned)),
                episode_type: "ALL".to_string(),
                description: format!(
                    "Composite quality points ({}) does not match sum of component points ({})",
                    plain(reported_earned),
                    plain(calculated_earned)
                ),
                detail: format!(
                    "Individual measures sum to {}/{}, but composite reports {}/{}.",
                    plain(calculated_earned),
                    plain(calculated_max),
                    plain(reported_earned),
                    reported_max
                ),
                related_metrics: evidence([
                    ("reported_points", json!(reported_earned)),
                    ("calculated_points", json!(calculated_earned)),
                ]),
            },
        );
    }
}

/// numerator / denominator ≈ rate for every non-composite measure
pub fn check_quality_rates(quality: &[QualityMeasure], out: &mut FlagEmitter<'_>) {
    for measure in quality.iter().filter(|m| !m.is_composite()) {
        let (Some(num), Some(denom), Some(rate)) = (measure.numerator, measure.denominator, measure.rate)
        else {
            continue;
        };
        if denom <= 0.0 {
            continue;
        }
        let calc_rate = num / denom;
        if (calc_rate - rate).abs() > RATE_TOLERANCE {
            let name = measure.measure_name.as_str();
            out.emit(
                Severity::Red,
                Finding {
                    metric_name: "quality_rate_calculation".to_string(),
                    metric_value: format!("reported rate = {rate:.4}").into(),
                    expected_value: format!(
                        "num/denom = {}/{} = {calc_rate:.4}",
                        plain(num),
                        plain(denom)
                    ),
                    episode_type: "Quality".to_string(),
                    description: format!(
                        "Rate calculation mismatch for '{name}': reported {rate:.3} vs calculated {calc_rate:.3}"
                    ),
                    detail: format!(
                        "numerator ({}) / denominator ({}) = {calc_rate:.4}, but reported rate = {rate:.4}.",
                        plain(num),
                        plain(denom)
                    ),
                    related_metrics: evidence([
                        ("measure", json!(name)),
                        ("numerator", json!(num)),
                        ("denominator", json!(denom)),
                        ("rate", json!(rate)),
                    ]),
                },
            );
        }
    }
}

/// Member months vs attributed members × 12
pub fn check_member_months(contract: &Contract, out: &mut FlagEmitter<'_>) {
    let members = contract.members();
    let Some(member_months) = contract.member_months.filter(|mm| *mm > 0.0) else {
        return;
    };
    if members <= 0.0 {
        return;
    }
    let expected = members * 12.0;
    let diff_pct = (expected - member_months).abs() / member_months;
    if diff_pct > MEMBER_MONTHS_TOLERANCE {
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: "member_months_check".to_string(),
                metric_value: format!("member_months = {}", plain(member_months)).into(),
                expected_value: format!("members x 12 = {} (within 5%)", plain(expected)),
                episode_type: "ALL".to_string(),
                description: format!(
                    "Member months ({}) don't align with attributed members ({} x 12 = {})",
                    plain_count(member_months),
                    plain_count(members),
                    plain_count(expected)
                ),
                detail: format!(
                    "Difference of {} may indicate mid-year enrollment changes.",
                    pct(diff_pct, 1)
                ),
                related_metrics: evidence([
                    ("attributed_members", json!(members)),
                    ("member_months", json!(member_months)),
                ]),
            },
        );
    }
}

fn plain_count(value: f64) -> String {
    vbc_common::human_fmt::thousands(value, 0)
}
