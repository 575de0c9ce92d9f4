// Prompt construction for the diagnostics model

use std::fmt::Write;
use vbc_common::dataset::{DatasetKind, Row, Table};
use vbc_common::human_fmt::thousands;
use vbc_common::models::{Contract, Flag};

use crate::loader::Inputs;

pub const SYSTEM_PROMPT: &str = "You are a senior analyst on a health plan's Provider Economics \
team, reviewing a VBC performance report. You provide concise, evidence-based diagnostic \
assessments of flagged issues in value-based care contracts. Your analysis should be actionable \
for a Joint Operating Committee (JOC) meeting.";

const RESPONSE_SHAPE: &str = r#"Respond in JSON with this exact structure:
{
  "diagnosis_summary": "2-3 sentence summary of the most likely root cause",
  "probable_causes": [
    {
      "cause": "description",
      "likelihood": "high/medium/low",
      "evidence": "which specific metrics support this"
    }
  ],
  "questions_for_provider": [
    "Specific question to ask at JOC meeting"
  ],
  "recommended_interventions": [
    {
      "intervention": "description",
      "timeframe": "immediate/short-term/contract-renewal",
      "expected_impact": "estimated financial or quality impact"
    }
  ],
  "contract_implications": "How this affects shared savings/losses and what contract amendments to consider"
}"#;

/// Columns tried, in order, when matching raw rows to an episode label
const MATCH_COLUMNS: [&str; 4] = ["episode_type", "cancer_type", "measure_name", "drug_name"];

const NO_METRICS: &str = "No additional metrics found for this episode type.";

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("Unknown")
}

/// User prompt for one episode type's flag group.
pub fn build_prompt(contract: &Contract, episode_type: &str, flags: &[&Flag], metrics: &str) -> String {
    format!(
        "You are reviewing a VBC performance report for a {specialty} specialty contract.\n\
         \n\
         Contract: {name}\n\
         Type: {kind}\n\
         LOB: {lob}\n\
         Performance Period: {period}\n\
         Attribution: {members} members\n\
         \n\
         The automated validation system has flagged the following issues for {episode_type}:\n\
         \n\
         {flags}\n\
         Additional context: full metrics for this episode type:\n\
         {metrics}\n\
         \n\
         {RESPONSE_SHAPE}",
        specialty = contract.specialty.as_str(),
        name = or_unknown(&contract.contract_name),
        kind = or_unknown(&contract.contract_type),
        lob = or_unknown(&contract.lob),
        period = or_unknown(&contract.performance_period),
        members = thousands(contract.members(), 0),
        flags = format_flags(flags),
    )
}

pub fn format_flags(flags: &[&Flag]) -> String {
    let mut out = String::new();
    for (i, flag) in flags.iter().enumerate() {
        let _ = writeln!(out, "Flag {}:", i + 1);
        let _ = writeln!(out, "  Severity: {}", flag.severity);
        let _ = writeln!(out, "  Metric: {}", flag.metric_name);
        let _ = writeln!(out, "  Actual Value: {}", flag.metric_value);
        let _ = writeln!(out, "  Expected Value: {}", flag.expected_value);
        let _ = writeln!(out, "  Description: {}", flag.description);
        let _ = writeln!(out, "  Detail: {}", flag.detail);
        out.push('\n');
    }
    out
}

/// Rows of `table` whose first matching label column contains `needle`
/// (case-insensitive).
fn matching_rows<'a>(table: &'a Table, needle: &str) -> Vec<Row<'a>> {
    let needle = needle.to_lowercase();
    for col in MATCH_COLUMNS.iter().filter(|c| table.has_column(c)) {
        let matched: Vec<_> = table
            .rows()
            .filter(|row| {
                row.text(col)
                    .is_some_and(|value| value.to_lowercase().contains(&needle))
            })
            .collect();
        if !matched.is_empty() {
            return matched;
        }
    }
    Vec::new()
}

/// Raw metric rows from every dataset that mention `episode_type`.
pub fn format_metrics(episode_type: &str, inputs: &Inputs) -> String {
    let mut out = String::new();
    for kind in DatasetKind::ALL {
        let rows = matching_rows(inputs.table(kind), episode_type);
        if rows.is_empty() {
            continue;
        }
        let _ = writeln!(out, "--- {} ---", kind);
        for row in rows {
            for (col, cell) in row.iter() {
                let _ = writeln!(out, "  {}: {}", col, cell);
            }
            out.push('\n');
        }
    }
    if out.is_empty() {
        NO_METRICS.to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbc_common::models::{ContractMetadata, ReferenceRanges, Specialty};

    fn inputs() -> Inputs {
        let table = |csv: &str| Table::from_csv_str(csv).unwrap();
        Inputs {
            msk_episodes: table("episode_type,episode_count\nTKR,100\nTHR,80\n"),
            msk_quality: table("measure_id,measure_name,rate\nMSK-Q-001,TKR Readmission,0.05\n"),
            onc_episodes: table("cancer_type,episode_count\nBreast,40\n"),
            onc_quality: table("measure_id,measure_name,rate\n"),
            onc_drugs: table("drug_name,total_claims\nPembrolizumab,10\n"),
            contracts: ContractMetadata::default(),
            ranges: ReferenceRanges::default(),
        }
    }

    #[test]
    fn test_metrics_match_label_columns_case_insensitively() {
        let text = format_metrics("tkr", &inputs());
        assert!(text.contains("--- msk_episodes ---"));
        assert!(text.contains("  episode_type: TKR"));
        assert!(text.contains("  episode_count: 100"));
        assert!(text.contains("--- msk_quality ---"));
        assert!(!text.contains("THR"));
    }

    #[test]
    fn test_metrics_fallback_text() {
        assert_eq!(format_metrics("Quality Gate", &inputs()), NO_METRICS);
    }

    #[test]
    fn test_prompt_includes_contract_and_flags() {
        let mut contract = Contract::new("MSK-2024-001", Specialty::Msk);
        contract.attributed_members = 45_000.0;
        contract.lob = Some("Medicare Advantage".to_string());
        let prompt = build_prompt(&contract, "TKR", &[], "none");
        assert!(prompt.contains("for a MSK specialty contract"));
        assert!(prompt.contains("LOB: Medicare Advantage"));
        assert!(prompt.contains("Type: Unknown"));
        assert!(prompt.contains("Attribution: 45,000 members"));
        assert!(prompt.contains("\"diagnosis_summary\""));
    }
}
