// Schema validation: column presence, types, critical nulls, value domains
//
// Operates on the raw Table rather than typed records: a column that is
// absent, or holds text where numbers belong, is exactly what this pass
// reports.

use serde_json::{json, Value};
use tracing::debug;
use vbc_common::dataset::{Cell, DatasetKind, MskEpisodeType, Table};
use vbc_common::human_fmt::{pct, plain};
use vbc_common::models::{evidence, prefix, Category, Evidence, Finding, Flag, FlagSequence, Severity};

/// Column lists for one dataset kind
#[derive(Debug, Clone, Copy)]
pub struct DatasetSchema {
    pub expected: &'static [&'static str],
    /// Accepted when present, never required
    pub optional: &'static [&'static str],
    pub critical: &'static [&'static str],
    pub numeric: &'static [&'static str],
    pub rate: &'static [&'static str],
}

const MSK_EPISODE_COLUMNS: &[&str] = &[
    "episode_type",
    "episode_count",
    "avg_episode_cost",
    "target_price",
    "total_cost",
    "total_target",
    "variance_pct",
    "implant_cost_avg",
    "facility_cost_avg",
    "professional_cost_avg",
    "post_acute_cost_avg",
    "readmission_cost_avg",
    "discharge_home_pct",
    "discharge_snf_pct",
    "discharge_irf_pct",
    "discharge_other_pct",
    "readmission_rate",
    "er_visit_rate_90d",
    "ssi_rate",
    "revision_rate_12mo",
    "avg_los_days",
    "avg_opioid_mme_discharge",
    "prom_collection_rate",
    "prom_improvement_rate",
    "prior_year_episode_count",
    "prior_year_avg_cost",
    "risk_score_actual",
    "risk_score_expected",
];

const MSK_OPTIONAL_COLUMNS: &[&str] =
    &["prior_year_discharge_home_pct", "prior_year_er_visit_rate_90d"];

const MSK_RATE_COLUMNS: &[&str] = &[
    "discharge_home_pct",
    "discharge_snf_pct",
    "discharge_irf_pct",
    "discharge_other_pct",
    "readmission_rate",
    "er_visit_rate_90d",
    "ssi_rate",
    "revision_rate_12mo",
    "prom_collection_rate",
    "prom_improvement_rate",
];

const ONC_EPISODE_COLUMNS: &[&str] = &[
    "cancer_type",
    "stage_group",
    "line_of_therapy",
    "episode_count",
    "avg_episode_cost",
    "target_price",
    "total_cost",
    "total_target",
    "variance_pct",
    "drug_cost_avg",
    "administration_cost_avg",
    "inpatient_cost_avg",
    "er_cost_avg",
    "imaging_cost_avg",
    "lab_cost_avg",
    "supportive_care_cost_avg",
    "other_cost_avg",
    "pathway_adherence_rate",
    "pathway_regimen_pct",
    "non_pathway_regimen_pct",
    "biosimilar_utilization_rate",
    "office_infusion_pct",
    "hopd_infusion_pct",
    "hospitalization_rate",
    "er_visit_rate",
    "prior_year_episode_count",
    "prior_year_avg_cost",
    "risk_score_actual",
    "risk_score_expected",
];

const ONC_RATE_COLUMNS: &[&str] = &[
    "pathway_adherence_rate",
    "pathway_regimen_pct",
    "non_pathway_regimen_pct",
    "biosimilar_utilization_rate",
    "office_infusion_pct",
    "hopd_infusion_pct",
    "hospitalization_rate",
    "er_visit_rate",
];

const MSK_QUALITY_COLUMNS: &[&str] = &[
    "measure_name",
    "measure_id",
    "numerator",
    "denominator",
    "rate",
    "target",
    "max_points",
    "points_earned",
    "prior_year_rate",
    "benchmark_50th",
    "benchmark_90th",
];

const ONC_QUALITY_COLUMNS: &[&str] = &[
    "measure_name",
    "measure_id",
    "numerator",
    "denominator",
    "rate",
    "target",
    "max_points",
    "points_earned",
    "prior_year_rate",
    "national_benchmark",
];

const QUALITY_NUMERIC_COLUMNS: &[&str] = &[
    "numerator",
    "denominator",
    "rate",
    "target",
    "max_points",
    "points_earned",
    "prior_year_rate",
];

const QUALITY_CRITICAL_COLUMNS: &[&str] =
    &["measure_name", "measure_id", "max_points", "points_earned"];

const DRUG_DETAIL_COLUMNS: &[&str] = &[
    "drug_category",
    "drug_name",
    "is_biosimilar",
    "is_pathway",
    "cancer_types_used",
    "total_claims",
    "total_cost",
    "avg_cost_per_claim",
    "site_of_service_office_pct",
    "site_of_service_hopd_pct",
    "site_of_service_home_pct",
    "prior_year_total_cost",
    "prior_year_claims",
    "fda_approval_date",
    "is_novel_therapy",
];

const DRUG_DETAIL_NUMERIC_COLUMNS: &[&str] = &[
    "total_claims",
    "total_cost",
    "avg_cost_per_claim",
    "site_of_service_office_pct",
    "site_of_service_hopd_pct",
    "site_of_service_home_pct",
    "prior_year_total_cost",
    "prior_year_claims",
];

const DRUG_DETAIL_RATE_COLUMNS: &[&str] = &[
    "site_of_service_office_pct",
    "site_of_service_hopd_pct",
    "site_of_service_home_pct",
];

const DISPOSITION_COLUMNS: [&str; 4] = [
    "discharge_home_pct",
    "discharge_snf_pct",
    "discharge_irf_pct",
    "discharge_other_pct",
];

const DISPOSITION_TOLERANCE: f64 = 0.02;
const TYPE_SAMPLE_SIZE: usize = 3;

/// Column lists for a dataset kind
pub fn schema_for(kind: DatasetKind) -> DatasetSchema {
    match kind {
        DatasetKind::MskEpisodes => DatasetSchema {
            expected: MSK_EPISODE_COLUMNS,
            optional: MSK_OPTIONAL_COLUMNS,
            critical: &["episode_type", "episode_count", "avg_episode_cost", "target_price"],
            // everything except the label column
            numeric: &MSK_EPISODE_COLUMNS[1..],
            rate: MSK_RATE_COLUMNS,
        },
        DatasetKind::OncEpisodes => DatasetSchema {
            expected: ONC_EPISODE_COLUMNS,
            optional: &[],
            critical: &["cancer_type", "episode_count", "avg_episode_cost", "target_price"],
            // everything except the three label columns
            numeric: &ONC_EPISODE_COLUMNS[3..],
            rate: ONC_RATE_COLUMNS,
        },
        DatasetKind::MskQuality => DatasetSchema {
            expected: MSK_QUALITY_COLUMNS,
            optional: &[],
            critical: QUALITY_CRITICAL_COLUMNS,
            numeric: QUALITY_NUMERIC_COLUMNS,
            rate: &[],
        },
        DatasetKind::OncQuality => DatasetSchema {
            expected: ONC_QUALITY_COLUMNS,
            optional: &[],
            critical: QUALITY_CRITICAL_COLUMNS,
            numeric: QUALITY_NUMERIC_COLUMNS,
            rate: &[],
        },
        DatasetKind::OncDrugDetail => DatasetSchema {
            expected: DRUG_DETAIL_COLUMNS,
            optional: &[],
            critical: &["drug_name", "total_claims", "total_cost"],
            numeric: DRUG_DETAIL_NUMERIC_COLUMNS,
            rate: DRUG_DETAIL_RATE_COLUMNS,
        },
    }
}

/// Run every schema check on one table.
///
/// Emits exactly one GREEN `schema_check` flag when nothing else fires.
pub fn validate_schema(
    table: &Table,
    kind: DatasetKind,
    contract_id: &str,
    ids: &mut FlagSequence,
) -> Vec<Flag> {
    let schema = schema_for(kind);
    let dataset = kind.name();
    let mut out = ids.emitter(prefix::SCHEMA, Category::Schema, contract_id);

    // 1. Column presence
    for col in schema.expected.iter().filter(|c| !table.has_column(c)) {
        out.emit(
            Severity::Red,
            Finding {
                metric_name: col.to_string(),
                metric_value: "MISSING".into(),
                expected_value: "Column should exist".to_string(),
                episode_type: "ALL".to_string(),
                description: format!("Missing expected column '{col}' in {dataset}"),
                detail: format!(
                    "The column '{col}' is expected in {dataset} but was not found. \
                     Available columns: {:?}",
                    table.columns()
                ),
                ..Default::default()
            },
        );
    }

    for col in table
        .columns()
        .iter()
        .filter(|c| !schema.expected.contains(&c.as_str()) && !schema.optional.contains(&c.as_str()))
    {
        out.emit(
            Severity::Yellow,
            Finding {
                metric_name: col.clone(),
                metric_value: "EXTRA".into(),
                expected_value: "Column not expected".to_string(),
                episode_type: "ALL".to_string(),
                description: format!("Unexpected column '{col}' in {dataset}"),
                detail: format!(
                    "The column '{col}' exists in {dataset} but is not in the expected schema."
                ),
                ..Default::default()
            },
        );
    }

    // 2. Numeric type conformance
    for col in schema.numeric {
        let Some(cells) = table.column(col) else {
            continue;
        };
        let offending: Vec<&str> = cells
            .filter_map(|cell| match cell {
                Cell::Text(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        if offending.is_empty() {
            continue;
        }
        let sample: Vec<&str> = offending.iter().take(TYPE_SAMPLE_SIZE).copied().collect();
        out.emit(
            Severity::Red,
            Finding {
                metric_name: col.to_string(),
                metric_value: "non-numeric".into(),
                expected_value: "numeric".to_string(),
                episode_type: "ALL".to_string(),
                description: format!("Column '{col}' in {dataset} is not numeric"),
                detail: format!(
                    "Expected numeric values but found {} non-numeric value(s). Sample values: {:?}",
                    offending.len(),
                    sample
                ),
                related_metrics: evidence([("sample_values", json!(sample))]),
                ..Default::default()
            },
        );
    }

    // 3. Critical nulls
    for col in schema.critical {
        let Some(cells) = table.column(col) else {
            continue;
        };
        let nulls = cells.filter(|c| c.is_missing()).count();
        if nulls > 0 {
            out.emit(
                Severity::Red,
                Finding {
                    metric_name: col.to_string(),
                    metric_value: format!("{nulls} nulls").into(),
                    expected_value: "No nulls in critical field".to_string(),
                    episode_type: "ALL".to_string(),
                    description: format!(
                        "Critical field '{col}' has {nulls} null value(s) in {dataset}"
                    ),
                    detail: format!(
                        "The field '{col}' is critical for downstream calculations and should not be null."
                    ),
                    ..Default::default()
                },
            );
        }
    }

    // 4. Value domains
    if let Some(cells) = table.column("episode_count") {
        let negative: Vec<f64> = cells.filter_map(Cell::as_number).filter(|v| *v < 0.0).collect();
        if !negative.is_empty() {
            let listed: Vec<String> = negative.iter().map(|v| plain(*v)).collect();
            out.emit(
                Severity::Red,
                Finding {
                    metric_name: "episode_count".to_string(),
                    metric_value: format!("[{}]", listed.join(", ")).into(),
                    expected_value: ">= 0".to_string(),
                    episode_type: "ALL".to_string(),
                    description: format!("Negative episode counts found in {dataset}"),
                    detail: format!("Found {} rows with negative episode counts.", negative.len()),
                    ..Default::default()
                },
            );
        }
    }

    for col in table.columns() {
        if !col.to_ascii_lowercase().contains("cost") || !is_numeric_column(table, col, &schema) {
            continue;
        }
        let negatives = table
            .column(col)
            .map(|cells| cells.filter_map(Cell::as_number).filter(|v| *v < 0.0).count())
            .unwrap_or(0);
        if negatives > 0 {
            out.emit(
                Severity::Red,
                Finding {
                    metric_name: col.clone(),
                    metric_value: format!("{negatives} negative values").into(),
                    expected_value: ">= 0".to_string(),
                    episode_type: "ALL".to_string(),
                    description: format!("Negative cost values in '{col}' in {dataset}"),
                    detail: format!(
                        "Cost fields should not be negative. Found {negatives} negative values."
                    ),
                    ..Default::default()
                },
            );
        }
    }

    for col in schema.rate {
        let Some(cells) = table.column(col) else {
            continue;
        };
        let values: Vec<f64> = cells.filter_map(Cell::as_number).collect();
        if let Some((severity, finding)) = check_rate_column(col, dataset, &values) {
            out.emit(severity, finding);
        }
    }

    // 5. Discharge disposition sum (surgical MSK episodes)
    if kind == DatasetKind::MskEpisodes && DISPOSITION_COLUMNS.iter().all(|c| table.has_column(c)) {
        for row in table.rows() {
            let label = row.text("episode_type").unwrap_or_else(|| "unknown".to_string());
            if MskEpisodeType::parse(&label).is_conservative() {
                continue;
            }
            let parts: Vec<(&str, f64)> = DISPOSITION_COLUMNS
                .iter()
                .filter_map(|c| row.number(c).map(|v| (*c, v)))
                .collect();
            if parts.is_empty() {
                continue;
            }
            let total: f64 = parts.iter().map(|(_, v)| v).sum();
            if (total - 1.0).abs() > DISPOSITION_TOLERANCE {
                let breakdown: Evidence = parts
                    .iter()
                    .map(|(c, v)| (c.to_string(), json!(v)))
                    .collect();
                out.emit(
                    Severity::Yellow,
                    Finding {
                        metric_name: "discharge_disposition_sum".to_string(),
                        metric_value: round4(total).into(),
                        expected_value: "~1.0 (within 2%)".to_string(),
                        episode_type: label.clone(),
                        description: format!(
                            "Discharge dispositions sum to {} for {label}",
                            pct(total, 1)
                        ),
                        detail: format!(
                            "Expected discharge percentages to sum to ~100%. Values: {}",
                            Value::Object(breakdown.clone().into_iter().collect())
                        ),
                        related_metrics: breakdown,
                        ..Default::default()
                    },
                );
            }
        }
    }

    if out.is_empty() {
        out.emit(
            Severity::Green,
            Finding {
                metric_name: "schema_check".to_string(),
                metric_value: "PASS".into(),
                expected_value: "All checks pass".to_string(),
                episode_type: "ALL".to_string(),
                description: format!("Schema validation passed for {dataset}"),
                detail: format!(
                    "All {} expected columns present, types correct, no critical nulls, \
                     constraints satisfied.",
                    schema.expected.len()
                ),
                ..Default::default()
            },
        );
    }

    let flags = out.finish();
    debug!(dataset, flags = flags.len(), "Schema check complete");
    flags
}

/// A column counts as numeric when designated so, or when every non-missing
/// cell parsed as a number.
fn is_numeric_column(table: &Table, col: &str, schema: &DatasetSchema) -> bool {
    if schema.numeric.contains(&col) {
        return true;
    }
    let Some(cells) = table.column(col) else {
        return false;
    };
    let mut seen = false;
    for cell in cells {
        match cell {
            Cell::Number(_) => seen = true,
            Cell::Text(_) => return false,
            Cell::Missing => {}
        }
    }
    seen
}

/// Rate-domain check for one column's numeric values.
///
/// Out-of-range values on an apparent 0-100 scale are YELLOW. A column that
/// mixes fractional values with values above 1 is RED, as is anything
/// negative or above 100.
pub fn check_rate_column(col: &str, dataset: &str, values: &[f64]) -> Option<(Severity, Finding)> {
    let violations = values.iter().filter(|v| **v < 0.0 || **v > 1.0).count();
    if violations == 0 {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let has_fraction = values.iter().any(|v| *v > 0.0 && *v < 1.0);
    let mixed = has_fraction && max > 1.0;

    if min >= 0.0 && max > 1.0 && max <= 100.0 && !mixed {
        Some((
            Severity::Yellow,
            Finding {
                metric_name: col.to_string(),
                metric_value: format!("max={}", plain(max)).into(),
                expected_value: "0-1 proportion scale".to_string(),
                episode_type: "ALL".to_string(),
                description: format!(
                    "Rate column '{col}' appears to be on 0-100 scale instead of 0-1"
                ),
                detail: format!(
                    "Values range from {} to {}. These may need to be divided by 100.",
                    plain(min),
                    plain(max)
                ),
                related_metrics: evidence([("min", json!(min)), ("max", json!(max))]),
                ..Default::default()
            },
        ))
    } else {
        Some((
            Severity::Red,
            Finding {
                metric_name: col.to_string(),
                metric_value: format!("{violations} values outside [0,1]").into(),
                expected_value: "Between 0 and 1".to_string(),
                episode_type: "ALL".to_string(),
                description: format!(
                    "Rate column '{col}' has values outside valid range in {dataset}"
                ),
                detail: format!("Found {violations} values outside [0,1] range."),
                related_metrics: evidence([("min", json!(min)), ("max", json!(max))]),
                ..Default::default()
            },
        ))
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
