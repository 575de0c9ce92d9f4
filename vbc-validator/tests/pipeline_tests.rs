//! End-to-end pipeline tests
//!
//! Builds a small data/config tree in a temp directory, loads it the way the
//! binary does, and checks run-level properties of the flag output.

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use vbc_common::config::{CliOverrides, ResolvedConfig};
use vbc_common::models::Severity;
use vbc_validator::loader::{Inputs, Records};
use vbc_validator::pipeline::{self, ValidationRun};
use vbc_validator::report::{ContractSection, ValidationReport};

const CONTRACTS: &str = r#"{
  "contracts": [
    {
      "contract_id": "MSK-2024-001",
      "specialty": "MSK",
      "contract_name": "Orthopedic Bundles",
      "attributed_members": 10000.0,
      "member_months": 130000.0,
      "sharing_rate_savings": 0.5,
      "sharing_rate_losses": 0.3,
      "quality_gate_minimum": 70
    },
    {
      "contract_id": "ONC-2024-001",
      "specialty": "Oncology",
      "attributed_members": 10000,
      "sharing_rate_savings": 0.5,
      "sharing_rate_losses": 0.3,
      "quality_gate_minimum": 70
    }
  ]
}"#;

const MSK_EPISODES: &str = "\
episode_type,episode_count,avg_episode_cost,target_price,total_cost,total_target,avg_opioid_mme_discharge
TKR,100,25000,26000,2500000,2600000,95
Knee Arthroscopy,300,4000,4200,1200000,1260000,20
";

const MSK_QUALITY: &str = "\
measure_name,measure_id,max_points,points_earned
Composite Quality Score,MSK-COMP,100,80
";

const ONC_EPISODES: &str = "\
cancer_type,stage_group,line_of_therapy,episode_count,avg_episode_cost,target_price,total_cost,total_target
Breast,Early,1L,50,30000,32000,1500000,1600000
";

const ONC_QUALITY: &str = "\
measure_name,measure_id,max_points,points_earned
Composite Quality Score,ONC-COMP,100,75
";

const ONC_DRUGS: &str = "\
drug_category,drug_name,is_biosimilar,is_pathway,total_claims,total_cost,avg_cost_per_claim
Supportive,Filgrastim,false,true,40,80000,2000
";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn fixture() -> (TempDir, ResolvedConfig) {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    let config = tmp.path().join("config");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&config).unwrap();

    write(&config, "contract_metadata.json", CONTRACTS);
    write(&config, "reference_ranges.json", "{}");
    write(&data, "msk_episodes.csv", MSK_EPISODES);
    write(&data, "msk_quality.csv", MSK_QUALITY);
    write(&data, "onc_episodes.csv", ONC_EPISODES);
    write(&data, "onc_quality.csv", ONC_QUALITY);
    write(&data, "onc_drug_detail.csv", ONC_DRUGS);

    let cli = CliOverrides {
        config: Some(tmp.path().join("absent.toml")),
        data_dir: Some(data),
        config_dir: Some(config),
        output: Some(tmp.path().join("out").join("report.html")),
        no_ai: true,
    };
    let resolved = ResolvedConfig::resolve(&cli).unwrap();
    (tmp, resolved)
}

fn run_once(config: &ResolvedConfig) -> (Inputs, Records, ValidationRun) {
    let inputs = Inputs::load(config).unwrap();
    let records = Records::from_inputs(&inputs);
    let run = pipeline::run(
        &inputs,
        &records,
        &config.msk_contract_id,
        &config.oncology_contract_id,
    )
    .unwrap();
    (inputs, records, run)
}

#[test]
fn test_repeated_runs_are_identical() {
    let (_tmp, config) = fixture();
    let (_, _, first) = run_once(&config);
    let (_, _, second) = run_once(&config);
    assert!(!first.flags.is_empty());
    assert_eq!(first.flags, second.flags);
    assert_eq!(first.counts, second.counts);
}

#[test]
fn test_counts_match_flags_and_sorted_order() {
    let (_tmp, config) = fixture();
    let (_, _, run) = run_once(&config);

    assert_eq!(run.counts.total(), run.flags.len());
    let sorted = run.sorted();
    assert_eq!(sorted.len(), run.flags.len());
    assert!(sorted.windows(2).all(|w| w[0].severity <= w[1].severity));
}

#[test]
fn test_msk_runs_first_and_ids_continue_across_contracts() {
    let (_tmp, config) = fixture();
    let (_, _, run) = run_once(&config);

    let first_onc = run
        .flags
        .iter()
        .position(|f| f.contract_id == "ONC-2024-001")
        .unwrap();
    assert!(run.flags[..first_onc]
        .iter()
        .all(|f| f.contract_id == "MSK-2024-001"));
    assert!(run.flags[first_onc..]
        .iter()
        .all(|f| f.contract_id == "ONC-2024-001"));

    let schema: Vec<u32> = run
        .flags
        .iter()
        .filter(|f| f.prefix() == "SCHEMA")
        .filter_map(|f| f.sequence_number())
        .collect();
    assert!(schema.len() >= 5);
    assert_eq!(schema[0], 1);
    assert!(schema.windows(2).all(|w| w[1] == w[0] + 1));

    let mut ids: Vec<&str> = run.flags.iter().map(|f| f.flag_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), run.flags.len());
}

#[test]
fn test_specialty_rules_fire_on_fixture() {
    let (_tmp, config) = fixture();
    let (_, _, run) = run_once(&config);

    let arthroscopy = run
        .flags
        .iter()
        .find(|f| f.metric_name == "arthroscopy_volume" && f.prefix() == "MSK")
        .unwrap();
    assert_eq!(arthroscopy.severity, Severity::Red);
    assert_eq!(arthroscopy.episode_type, "Knee Arthroscopy");

    let opioid = run
        .flags
        .iter()
        .find(|f| f.metric_name == "opioid_mme_discharge")
        .unwrap();
    assert_eq!(opioid.severity, Severity::Red);
    assert_eq!(opioid.episode_type, "TKR");
}

#[test]
fn test_member_months_from_metadata_are_reconciled() {
    let (_tmp, config) = fixture();
    let (_, _, run) = run_once(&config);

    let member_months = run
        .flags
        .iter()
        .find(|f| f.metric_name == "member_months_check")
        .unwrap();
    assert_eq!(member_months.severity, Severity::Yellow);
    assert_eq!(member_months.contract_id, "MSK-2024-001");
    assert_eq!(member_months.prefix(), "ARITH");
    assert_eq!(
        member_months.expected_value,
        "members x 12 = 120000 (within 5%)"
    );
}

#[test]
fn test_unknown_contract_id_fails() {
    let (_tmp, config) = fixture();
    let inputs = Inputs::load(&config).unwrap();
    let records = Records::from_inputs(&inputs);
    assert!(pipeline::run(&inputs, &records, "MSK-NOPE", &config.oncology_contract_id).is_err());
}

#[test]
fn test_missing_dataset_aborts_load() {
    let (_tmp, config) = fixture();
    fs::remove_file(config.data_dir.join("onc_quality.csv")).unwrap();
    let err = Inputs::load(&config).unwrap_err();
    assert!(format!("{err:#}").contains("onc_quality"));
}

#[test]
fn test_report_written_with_financials() {
    let (_tmp, config) = fixture();
    let (inputs, records, run) = run_once(&config);

    let msk = inputs.contracts.require("MSK-2024-001").unwrap();
    let onc = inputs.contracts.require("ONC-2024-001").unwrap();
    let sections = vec![
        ContractSection::new(msk, &run, records.msk()),
        ContractSection::new(onc, &run, records.oncology()),
    ];
    assert_eq!(sections[0].financial.total_episodes, 400.0);
    assert_eq!(sections[0].financial.savings, 160_000.0);
    assert!(sections[0].financial.quality_gate.unwrap().passes());
    assert_eq!(
        sections[0].counts.total() + sections[1].counts.total(),
        run.flags.len()
    );

    let report = ValidationReport::new(&run, sections, &[]);
    report.write(&config.output_path).unwrap();
    let page = fs::read_to_string(&config.output_path).unwrap();
    assert!(page.contains("VBC Performance Report Validation"));
    assert!(page.contains("Orthopedic Bundles (MSK-2024-001)"));
    let arthroscopy = run
        .flags
        .iter()
        .find(|f| f.metric_name == "arthroscopy_volume")
        .unwrap();
    assert!(page.contains(&arthroscopy.flag_id));
}
