// Calculations shared by the cross-metric correlator and the specialty rules

use vbc_common::dataset::{EolDirection, Episode, MeasureCode, QualityMeasure};
use vbc_common::human_fmt::pct;
use vbc_common::models::Contract;

/// Simultaneous EOL failures that indicate a systemic problem
pub const EOL_SYSTEMIC_THRESHOLD: usize = 3;

/// ACP rate below which poor EOL results are attributed to missing
/// goals-of-care conversations
pub const ACP_ROOT_CAUSE_THRESHOLD: f64 = 0.50;

/// Largest gate gap (in composite percentage points) treated as a near miss
pub const NEAR_MISS_POINTS: f64 = 5.0;

/// Result of comparing the five EOL measures with their targets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EolAssessment {
    pub failures: usize,
    /// One line per failing measure, e.g. `Hospice Enrollment: 38.0% (target >55%)`
    pub details: Vec<String>,
}

impl EolAssessment {
    pub fn is_systemic(&self) -> bool {
        self.failures >= EOL_SYSTEMIC_THRESHOLD
    }
}

/// Count EOL measures failing their directional target. Measures without
/// both a rate and a target are not counted either way.
pub fn assess_eol(quality: &[QualityMeasure]) -> EolAssessment {
    let mut assessment = EolAssessment::default();
    for measure in quality {
        let MeasureCode::EndOfLife(eol) = measure.code else {
            continue;
        };
        let (Some(rate), Some(target)) = (measure.rate, measure.target) else {
            continue;
        };
        let failing = match eol.direction() {
            EolDirection::HighIsBad => rate > target,
            EolDirection::LowIsBad => rate < target,
        };
        if failing {
            assessment.failures += 1;
            let bound = match eol.direction() {
                EolDirection::HighIsBad => '<',
                EolDirection::LowIsBad => '>',
            };
            assessment.details.push(format!(
                "{}: {} (target {}{})",
                eol.name(),
                pct(rate, 1),
                bound,
                pct(target, 0)
            ));
        }
    }
    assessment
}

/// Advance Care Planning rate, when reported
pub fn acp_rate(quality: &[QualityMeasure]) -> Option<f64> {
    quality
        .iter()
        .find(|m| m.code == MeasureCode::AdvanceCarePlanning)
        .and_then(|m| m.rate)
}

/// Composite quality score against the contract's gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    pub earned: f64,
    pub max_points: f64,
    /// Composite as a 0-100 percentage
    pub composite_pct: f64,
    pub gate_minimum: f64,
    /// Points short of the gate; zero or negative means passing
    pub gap: f64,
}

impl QualityGate {
    /// Locate the composite row and score it. `None` without a composite
    /// row, or when its points are missing or `max_points` is zero.
    pub fn evaluate(quality: &[QualityMeasure], contract: &Contract) -> Option<Self> {
        let composite = quality.iter().find(|m| m.is_composite())?;
        let earned = composite.points_earned?;
        let max_points = composite.max_points.filter(|m| *m != 0.0)?;
        let composite_pct = earned / max_points * 100.0;
        Some(Self {
            earned,
            max_points,
            composite_pct,
            gate_minimum: contract.quality_gate_minimum,
            gap: contract.quality_gate_minimum - composite_pct,
        })
    }

    pub fn passes(&self) -> bool {
        self.gap <= 0.0
    }

    /// Failing by no more than [`NEAR_MISS_POINTS`]
    pub fn is_near_miss(&self) -> bool {
        self.gap > 0.0 && self.gap <= NEAR_MISS_POINTS
    }
}

/// Net savings (total_target − total_cost) over rows reporting both totals
pub fn net_savings<E: Episode>(episodes: &[E]) -> f64 {
    episodes
        .iter()
        .filter_map(|ep| {
            let core = ep.core();
            Some(core.total_target? - core.total_cost?)
        })
        .sum()
}

/// Provider share that a failed gate would forfeit:
/// `max(0, net savings) × sharing_rate_savings`
pub fn savings_at_risk<E: Episode>(episodes: &[E], contract: &Contract) -> f64 {
    net_savings(episodes).max(0.0) * contract.sharing_rate_savings
}

/// Implied pathway / non-pathway split of an average episode cost
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathwaySplit {
    pub pathway_cost: f64,
    pub non_pathway_cost: f64,
    /// `non_pathway_cost − pathway_cost`
    pub cost_diff: f64,
    /// `cost_diff / pathway_cost`
    pub cost_diff_pct: f64,
}

impl PathwaySplit {
    /// Recompose the average: `a·pathway + (1−a)·non_pathway`
    pub fn blended(&self, adherence: f64) -> f64 {
        adherence * self.pathway_cost + (1.0 - adherence) * self.non_pathway_cost
    }
}

/// Solve `avg = a·pathway + (1−a)·non_pathway` for the non-pathway cost,
/// taking the pathway cost as known.
///
/// `None` when adherence is 1 or more (no non-pathway share) or the pathway
/// cost is not positive.
pub fn back_calculate(adherence: f64, avg_cost: f64, pathway_cost: f64) -> Option<PathwaySplit> {
    if adherence >= 1.0 || pathway_cost <= 0.0 {
        return None;
    }
    let non_pathway_cost = (avg_cost - adherence * pathway_cost) / (1.0 - adherence);
    let cost_diff = non_pathway_cost - pathway_cost;
    Some(PathwaySplit {
        pathway_cost,
        non_pathway_cost,
        cost_diff,
        cost_diff_pct: cost_diff / pathway_cost,
    })
}

/// Episodes per 1,000 attributed members
pub fn per_1000(count: f64, members: f64) -> Option<f64> {
    if members <= 0.0 {
        return None;
    }
    Some(count / (members / 1000.0))
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
