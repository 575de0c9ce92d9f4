// Range checks: values against the specialty's reference ranges

use super::{SpecialtyData, ValidationContext, Validator};
use serde_json::json;
use tracing::debug;
use vbc_common::dataset::{MskEpisode, OncEpisode};
use vbc_common::human_fmt::{pct, plain, plain_or_na};
use vbc_common::models::{
    evidence, prefix, Category, Finding, Flag, FlagEmitter, FlagSequence, RangeDef, RangeShape,
    Severity, SpecialtyRanges,
};

/// In-bounds values further than this fraction of the range width from
/// `expected` are YELLOW
const DEVIATION_THRESHOLD: f64 = 0.4;

/// MSK episode column → `quality_targets` key
const MSK_QUALITY_TARGETS: [(&str, &str); 4] = [
    ("readmission_rate", "readmit_90day"),
    ("er_visit_rate_90d", "er_visit_90day"),
    ("ssi_rate", "ssi_rate"),
    ("revision_rate_12mo", "revision_12mo"),
];

pub struct RangeChecker;

impl Validator for RangeChecker {
    fn name(&self) -> &'static str {
        "range"
    }

    fn validate(&self, ctx: &ValidationContext<'_>, ids: &mut FlagSequence) -> Vec<Flag> {
        let mut out = ids.emitter(prefix::RANGE, Category::Range, &ctx.contract.contract_id);

        match ctx.data {
            SpecialtyData::Msk { episodes, .. } => check_msk(episodes, ctx.ranges, &mut out),
            SpecialtyData::Oncology { episodes, .. } => check_oncology(episodes, ctx.ranges, &mut out),
        }

        let flags = out.finish();
        debug!(checker = self.name(), flags = flags.len(), "Checker complete");
        flags
    }
}

fn check_msk(episodes: &[MskEpisode], ranges: &SpecialtyRanges, out: &mut FlagEmitter<'_>) {
    for ep in episodes {
        let Some(def) = ep
            .episode_type
            .range_key()
            .and_then(|key| ranges.episode_cost_ranges.get(key))
        else {
            continue;
        };
        emit_range(out, ep.core.avg_episode_cost, def, "avg_episode_cost", &ep.core.label);
    }

    let surgical = || episodes.iter().filter(|ep| !ep.episode_type.is_conservative());

    for ep in surgical() {
        if let Some(def) = ranges.utilization_ranges_ma.get("opioid_mme_discharge_avg") {
            emit_range(
                out,
                ep.avg_opioid_mme_discharge,
                def,
                "avg_opioid_mme_discharge",
                &ep.core.label,
            );
        }
        if let Some(def) = ranges.utilization_ranges_ma.get("prom_collection_rate") {
            emit_range(out, ep.prom_collection_rate, def, "prom_collection_rate", &ep.core.label);
        }
    }

    for ep in surgical() {
        for (metric, key) in MSK_QUALITY_TARGETS {
            let Some(def) = ranges.quality_targets.get(key) else {
                continue;
            };
            let value = match metric {
                "readmission_rate" => ep.readmission_rate,
                "er_visit_rate_90d" => ep.er_visit_rate_90d,
                "ssi_rate" => ep.ssi_rate,
                _ => ep.revision_rate_12mo,
            };
            emit_range(out, value, def, metric, &ep.core.label);
        }
    }
}

fn check_oncology(episodes: &[OncEpisode], ranges: &SpecialtyRanges, out: &mut FlagEmitter<'_>) {
    for ep in episodes {
        let Some(key) = ep.range_key() else {
            continue;
        };
        let label = ep.core.label.as_str();

        if let Some(def) = ranges.episode_cost_ranges.get(key) {
            emit_range(out, ep.core.avg_episode_cost, def, "avg_episode_cost", label);
        }

        let (Some(benchmark), Some(adherence)) = (
            ranges.pathway_adherence_benchmarks.get(key),
            ep.pathway_adherence_rate,
        ) else {
            continue;
        };
        let min_acceptable = benchmark.min_acceptable;
        let expected = benchmark.expected;
        if adherence < min_acceptable {
            out.emit(
                Severity::Red,
                Finding {
                    metric_name: "pathway_adherence_rate".to_string(),
                    metric_value: adherence.into(),
                    expected_value: format!(
                        "min acceptable {}, expected {}",
                        plain(min_acceptable),
                        plain(expected)
                    ),
                    episode_type: label.to_string(),
                    description: format!(
                        "Pathway adherence {} below minimum acceptable {} for {label}",
                        pct(adherence, 0),
                        pct(min_acceptable, 0)
                    ),
                    detail: format!(
                        "Expected adherence of {}. Current rate is significantly below benchmark.",
                        pct(expected, 0)
                    ),
                    related_metrics: evidence([
                        ("min_acceptable", json!(min_acceptable)),
                        ("expected", json!(expected)),
                    ]),
                },
            );
        } else if adherence < expected {
            out.emit(
                Severity::Yellow,
                Finding {
                    metric_name: "pathway_adherence_rate".to_string(),
                    metric_value: adherence.into(),
                    expected_value: format!("expected {}", plain(expected)),
                    episode_type: label.to_string(),
                    description: format!(
                        "Pathway adherence {} below expected {} for {label}",
                        pct(adherence, 0),
                        pct(expected, 0)
                    ),
                    detail: format!(
                        "Rate is above minimum acceptable ({}) but below expected benchmark.",
                        pct(min_acceptable, 0)
                    ),
                    related_metrics: evidence([
                        ("min_acceptable", json!(min_acceptable)),
                        ("expected", json!(expected)),
                    ]),
                },
            );
        }
    }
}

fn emit_range(
    out: &mut FlagEmitter<'_>,
    value: Option<f64>,
    def: &RangeDef,
    metric: &str,
    label: &str,
) {
    if let Some((severity, finding)) = value.and_then(|v| check_range(v, def, metric, label)) {
        out.emit(severity, finding);
    }
}

/// Compare one value with a range definition.
///
/// Bounded ranges: outside `[min, max]` is RED; inside but more than 40% of
/// the width away from `expected` is YELLOW. Ceiling ranges: above `max` is
/// RED, above `target` is YELLOW.
pub fn check_range(
    value: f64,
    def: &RangeDef,
    metric: &str,
    label: &str,
) -> Option<(Severity, Finding)> {
    let desc = def.description.as_str();
    let v = plain(value);

    match def.shape()? {
        RangeShape::Bounded { min, max, expected } => {
            let (lo, hi, exp) = (plain(min), plain(max), plain_or_na(expected));
            if value < min || value > max {
                return Some((
                    Severity::Red,
                    Finding {
                        metric_name: metric.to_string(),
                        metric_value: value.into(),
                        expected_value: format!("range [{lo}, {hi}], expected ~{exp}"),
                        episode_type: label.to_string(),
                        description: format!(
                            "{metric} = {v} is outside bounds [{lo}, {hi}] for {label}"
                        ),
                        detail: format!(
                            "{desc}. Value {v} falls outside the acceptable range. \
                             Expected approximately {exp}."
                        ),
                        related_metrics: evidence([
                            ("min", json!(min)),
                            ("max", json!(max)),
                            ("expected", json!(expected)),
                        ]),
                    },
                ));
            }

            let expected = expected?;
            let width = max - min;
            if width <= 0.0 {
                return None;
            }
            let deviation = (value - expected).abs() / width;
            if deviation <= DEVIATION_THRESHOLD {
                return None;
            }
            Some((
                Severity::Yellow,
                Finding {
                    metric_name: metric.to_string(),
                    metric_value: value.into(),
                    expected_value: format!("expected ~{exp} (range [{lo}, {hi}])"),
                    episode_type: label.to_string(),
                    description: format!(
                        "{metric} = {v} is within bounds but significantly deviates from \
                         expected {exp} for {label}"
                    ),
                    detail: format!(
                        "{desc}. Value is within [{lo}, {hi}] but deviates {} of range width \
                         from expected.",
                        pct(deviation, 0)
                    ),
                    related_metrics: evidence([
                        ("min", json!(min)),
                        ("max", json!(max)),
                        ("expected", json!(expected)),
                        ("deviation", json!(deviation)),
                    ]),
                },
            ))
        }
        RangeShape::Ceiling { max, target } => {
            let hi = plain(max);
            let tgt = plain_or_na(target);
            if value > max {
                Some((
                    Severity::Red,
                    Finding {
                        metric_name: metric.to_string(),
                        metric_value: value.into(),
                        expected_value: format!("target {tgt}, max acceptable {hi}"),
                        episode_type: label.to_string(),
                        description: format!(
                            "{metric} = {v} exceeds maximum acceptable {hi} for {label}"
                        ),
                        detail: format!(
                            "{desc}. Target is {tgt}, maximum acceptable is {hi}."
                        ),
                        related_metrics: evidence([
                            ("max_acceptable", json!(max)),
                            ("target", json!(target)),
                        ]),
                    },
                ))
            } else if target.is_some_and(|t| value > t) {
                Some((
                    Severity::Yellow,
                    Finding {
                        metric_name: metric.to_string(),
                        metric_value: value.into(),
                        expected_value: format!("target {tgt}"),
                        episode_type: label.to_string(),
                        description: format!(
                            "{metric} = {v} exceeds target {tgt} for {label} \
                             (but within acceptable range)"
                        ),
                        detail: format!(
                            "{desc}. Value exceeds target but remains below maximum \
                             acceptable threshold of {hi}."
                        ),
                        related_metrics: evidence([
                            ("max_acceptable", json!(max)),
                            ("target", json!(target)),
                        ]),
                    },
                ))
            } else {
                None
            }
        }
    }
}
