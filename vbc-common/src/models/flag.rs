//! Validation flag: the sole output entity of the rule engine
//!
//! A flag is created exactly once by a checker (through a
//! [`FlagEmitter`](super::FlagEmitter)), never mutated afterwards, and
//! consumed read-only by the report and diagnostics layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Flag severity, ordered by descending urgency
///
/// The derived ordering puts `Red` first, so an ascending sort yields
/// RED, YELLOW, GREEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Requires action: data is wrong or a material problem exists
    Red,
    /// Needs review: plausible but suspicious
    Yellow,
    /// Informational pass signal
    Green,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Red => "RED",
            Severity::Yellow => "YELLOW",
            Severity::Green => "GREEN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checker family that produced a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Schema,
    Arithmetic,
    Range,
    CrossMetric,
    Specialty,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Schema => "schema",
            Category::Arithmetic => "arithmetic",
            Category::Range => "range",
            Category::CrossMetric => "cross_metric",
            Category::Specialty => "specialty",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed value carried by a flag (numeric or free text)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }
}

impl Default for MetricValue {
    fn default() -> Self {
        MetricValue::Text(String::new())
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{}", crate::human_fmt::plain(*v)),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// Supporting metric name → value pairs used as evidence
pub type Evidence = BTreeMap<String, Value>;

/// Build an [`Evidence`] map from literal pairs.
pub fn evidence<const N: usize>(pairs: [(&str, Value); N]) -> Evidence {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Checker-supplied content of a flag
///
/// Everything except identity, severity, category and owning contract,
/// which the emitter fills in.
#[derive(Debug, Clone, Default)]
pub struct Finding {
    pub metric_name: String,
    pub metric_value: MetricValue,
    pub expected_value: String,
    pub episode_type: String,
    pub description: String,
    pub detail: String,
    pub related_metrics: Evidence,
}

/// A structured finding emitted by a checker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    /// Unique within its prefix for one run, e.g. `ARITH-003`
    pub flag_id: String,
    pub severity: Severity,
    pub category: Category,
    pub metric_name: String,
    pub metric_value: MetricValue,
    pub expected_value: String,
    pub episode_type: String,
    pub contract_id: String,
    /// One-line description
    pub description: String,
    /// Multi-sentence narrative
    pub detail: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub related_metrics: Evidence,
}

impl Flag {
    /// Numeric suffix of the identifier (`ARITH-003` → 3)
    pub fn sequence_number(&self) -> Option<u32> {
        self.flag_id.rsplit_once('-')?.1.parse().ok()
    }

    /// Identifier prefix (`ARITH-003` → `ARITH`)
    pub fn prefix(&self) -> &str {
        self.flag_id
            .rsplit_once('-')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.flag_id)
    }
}

/// Sort flags for display: RED, then YELLOW, then GREEN.
///
/// The sort is stable, so flags of equal severity keep emission order.
pub fn sorted_by_severity<'a, I>(flags: I) -> Vec<&'a Flag>
where
    I: IntoIterator<Item = &'a Flag>,
{
    let mut sorted: Vec<&Flag> = flags.into_iter().collect();
    sorted.sort_by_key(|flag| flag.severity);
    sorted
}

/// Count of flags per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub red: usize,
    pub yellow: usize,
    pub green: usize,
}

impl SeverityCounts {
    pub fn tally<'a, I>(flags: I) -> Self
    where
        I: IntoIterator<Item = &'a Flag>,
    {
        let mut counts = Self::default();
        for flag in flags {
            match flag.severity {
                Severity::Red => counts.red += 1,
                Severity::Yellow => counts.yellow += 1,
                Severity::Green => counts.green += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.red + self.yellow + self.green
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flag(id: &str, severity: Severity) -> Flag {
        Flag {
            flag_id: id.to_string(),
            severity,
            category: Category::Schema,
            metric_name: "m".to_string(),
            metric_value: MetricValue::from(1.0),
            expected_value: String::new(),
            episode_type: "ALL".to_string(),
            contract_id: "C-1".to_string(),
            description: String::new(),
            detail: String::new(),
            related_metrics: Evidence::new(),
        }
    }

    #[test]
    fn test_severity_orders_red_first() {
        let mut severities = vec![Severity::Green, Severity::Red, Severity::Yellow];
        severities.sort();
        assert_eq!(severities, vec![Severity::Red, Severity::Yellow, Severity::Green]);
    }

    #[test]
    fn test_sorted_by_severity_is_stable() {
        let flags = vec![
            flag("A-001", Severity::Green),
            flag("A-002", Severity::Yellow),
            flag("A-003", Severity::Red),
            flag("A-004", Severity::Yellow),
            flag("A-005", Severity::Red),
        ];
        let ids: Vec<&str> = sorted_by_severity(&flags)
            .iter()
            .map(|f| f.flag_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A-003", "A-005", "A-002", "A-004", "A-001"]);
    }

    #[test]
    fn test_severity_counts() {
        let flags = vec![
            flag("A-001", Severity::Red),
            flag("A-002", Severity::Red),
            flag("A-003", Severity::Green),
        ];
        let counts = SeverityCounts::tally(&flags);
        assert_eq!(counts.red, 2);
        assert_eq!(counts.yellow, 0);
        assert_eq!(counts.green, 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_flag_id_parts() {
        let f = flag("CROSS-012", Severity::Red);
        assert_eq!(f.prefix(), "CROSS");
        assert_eq!(f.sequence_number(), Some(12));
    }

    #[test]
    fn test_flag_serializes_with_wire_names() {
        let mut f = flag("SCHEMA-001", Severity::Yellow);
        f.category = Category::CrossMetric;
        f.related_metrics = evidence([("ratio", json!(0.5))]);
        let value = serde_json::to_value(&f).unwrap();
        assert_eq!(value["severity"], "YELLOW");
        assert_eq!(value["category"], "cross_metric");
        assert_eq!(value["metric_value"], json!(1.0));
        assert_eq!(value["related_metrics"]["ratio"], json!(0.5));
    }

    #[test]
    fn test_metric_value_display() {
        assert_eq!(MetricValue::from(3.0).to_string(), "3");
        assert_eq!(MetricValue::from("MISSING").to_string(), "MISSING");
    }
}
