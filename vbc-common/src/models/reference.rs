//! Reference-range configuration (`reference_ranges.json`)
//!
//! Nested per-specialty tables of min/max/expected bounds. Read-only to
//! the rule engine.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One configured range, as written in the JSON document
///
/// Either `min`/`max` or `min_acceptable`/`max_acceptable` may be used;
/// `expected` falls back to `target`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeDef {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min_acceptable: Option<f64>,
    #[serde(default)]
    pub max_acceptable: Option<f64>,
    #[serde(default)]
    pub expected: Option<f64>,
    #[serde(default)]
    pub target: Option<f64>,
    #[serde(default)]
    pub description: String,
}

/// Resolved shape of a [`RangeDef`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeShape {
    /// Both bounds known; `expected` is the centre of mass
    Bounded {
        min: f64,
        max: f64,
        expected: Option<f64>,
    },
    /// Quality-style ceiling with an optional softer target
    Ceiling { max: f64, target: Option<f64> },
}

impl RangeDef {
    pub fn lower(&self) -> Option<f64> {
        self.min.or(self.min_acceptable)
    }

    pub fn upper(&self) -> Option<f64> {
        self.max.or(self.max_acceptable)
    }

    pub fn expected_value(&self) -> Option<f64> {
        self.expected.or(self.target)
    }

    /// Classify the definition; `None` when it carries no upper bound.
    pub fn shape(&self) -> Option<RangeShape> {
        match (self.lower(), self.upper()) {
            (Some(min), Some(max)) => Some(RangeShape::Bounded {
                min,
                max,
                expected: self.expected_value(),
            }),
            (None, Some(max)) => Some(RangeShape::Ceiling {
                max,
                target: self.target,
            }),
            _ => None,
        }
    }
}

/// Oncology pathway adherence benchmark
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdherenceBenchmark {
    #[serde(default)]
    pub min_acceptable: f64,
    #[serde(default)]
    pub expected: f64,
}

/// Expected episode incidence per 1,000 attributed members
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidenceRate {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub expected: f64,
    #[serde(default)]
    pub max: f64,
}

/// Brand biologic and its biosimilar, matched by exact drug name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosimilarPair {
    pub brand: String,
    pub biosimilar: String,
}

impl BiosimilarPair {
    pub fn new(brand: &str, biosimilar: &str) -> Self {
        Self {
            brand: brand.to_string(),
            biosimilar: biosimilar.to_string(),
        }
    }
}

/// Brand/biosimilar pairs evaluated when the configuration lists none
pub fn default_biosimilar_pairs() -> Vec<BiosimilarPair> {
    vec![
        BiosimilarPair::new("Trastuzumab (Herceptin)", "Trastuzumab-dkst"),
        BiosimilarPair::new("Bevacizumab (Avastin)", "Bevacizumab-awwb"),
        BiosimilarPair::new("Pegfilgrastim (Neulasta)", "Pegfilgrastim-jmdb"),
    ]
}

/// Reference tables for one specialty
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialtyRanges {
    #[serde(default)]
    pub episode_cost_ranges: HashMap<String, RangeDef>,
    #[serde(default)]
    pub utilization_ranges_ma: HashMap<String, RangeDef>,
    #[serde(default)]
    pub quality_targets: HashMap<String, RangeDef>,
    #[serde(default)]
    pub pathway_adherence_benchmarks: HashMap<String, AdherenceBenchmark>,
    #[serde(default)]
    pub incidence_rates_ma_per_1000: HashMap<String, IncidenceRate>,
    #[serde(default = "default_biosimilar_pairs")]
    pub biosimilar_pairs: Vec<BiosimilarPair>,
}

impl Default for SpecialtyRanges {
    fn default() -> Self {
        Self {
            episode_cost_ranges: HashMap::new(),
            utilization_ranges_ma: HashMap::new(),
            quality_targets: HashMap::new(),
            pathway_adherence_benchmarks: HashMap::new(),
            incidence_rates_ma_per_1000: HashMap::new(),
            biosimilar_pairs: default_biosimilar_pairs(),
        }
    }
}

/// `reference_ranges.json` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceRanges {
    #[serde(default)]
    pub msk: SpecialtyRanges,
    #[serde(default)]
    pub oncology: SpecialtyRanges,
}

impl ReferenceRanges {
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_shape_uses_target_as_expected_fallback() {
        let def = RangeDef {
            min_acceptable: Some(0.2),
            max_acceptable: Some(0.9),
            target: Some(0.6),
            ..Default::default()
        };
        assert_eq!(
            def.shape(),
            Some(RangeShape::Bounded {
                min: 0.2,
                max: 0.9,
                expected: Some(0.6)
            })
        );
    }

    #[test]
    fn test_ceiling_shape() {
        let def = RangeDef {
            max_acceptable: Some(0.08),
            target: Some(0.05),
            ..Default::default()
        };
        assert_eq!(
            def.shape(),
            Some(RangeShape::Ceiling {
                max: 0.08,
                target: Some(0.05)
            })
        );
    }

    #[test]
    fn test_shape_requires_upper_bound() {
        let def = RangeDef {
            min: Some(1.0),
            ..Default::default()
        };
        assert_eq!(def.shape(), None);
    }

    #[test]
    fn test_parse_reference_ranges() {
        let json = r#"{
            "msk": {
                "episode_cost_ranges": {
                    "TKR": {"min": 18000, "max": 32000, "expected": 24000, "description": "TKR episode"}
                },
                "quality_targets": {
                    "readmit_90day": {"target": 0.05, "max_acceptable": 0.08}
                }
            },
            "oncology": {
                "pathway_adherence_benchmarks": {
                    "lung_nsclc_1L": {"min_acceptable": 0.70, "expected": 0.85}
                },
                "incidence_rates_ma_per_1000": {
                    "breast": {"min": 2.0, "expected": 3.5, "max": 5.0}
                },
                "biosimilar_pairs": [
                    {"brand": "Rituximab (Rituxan)", "biosimilar": "Rituximab-abbs"}
                ]
            }
        }"#;
        let ranges = ReferenceRanges::from_json_str(json).unwrap();

        let tkr = &ranges.msk.episode_cost_ranges["TKR"];
        assert_eq!(tkr.lower(), Some(18000.0));
        assert_eq!(tkr.description, "TKR episode");
        assert_eq!(ranges.msk.biosimilar_pairs, default_biosimilar_pairs());

        let lung = ranges.oncology.pathway_adherence_benchmarks["lung_nsclc_1L"];
        assert_eq!(lung.expected, 0.85);
        assert_eq!(ranges.oncology.biosimilar_pairs.len(), 1);
        assert_eq!(ranges.oncology.incidence_rates_ma_per_1000["breast"].max, 5.0);
    }
}
