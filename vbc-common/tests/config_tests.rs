//! Tests for run configuration resolution
//!
//! Tests that touch VBC_* or ANTHROPIC_API_KEY are marked #[serial] so they
//! never race on the process environment.

use serial_test::serial;
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use vbc_common::config::{
    CliOverrides, ResolvedConfig, DEFAULT_MSK_CONTRACT_ID, DEFAULT_ONCOLOGY_CONTRACT_ID,
    ENV_API_KEY, ENV_CONFIG_DIR, ENV_DATA_DIR, ENV_OUTPUT,
};
use vbc_common::dataset::DatasetKind;

fn clear_env() {
    env::remove_var(ENV_DATA_DIR);
    env::remove_var(ENV_CONFIG_DIR);
    env::remove_var(ENV_OUTPUT);
    env::remove_var(ENV_API_KEY);
}

/// Overrides pointing at a config file inside `dir` (which may not exist)
fn cli_with_config(dir: &TempDir, name: &str) -> CliOverrides {
    CliOverrides {
        config: Some(dir.path().join(name)),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_missing_config_file_uses_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = ResolvedConfig::resolve(&cli_with_config(&dir, "absent.toml")).unwrap();

    assert!(config.source.is_none());
    assert_eq!(config.data_dir, PathBuf::from("data"));
    assert_eq!(config.config_dir, PathBuf::from("config"));
    assert_eq!(
        config.output_path,
        PathBuf::from("output/vbc_validation_report.html")
    );
    assert_eq!(config.msk_contract_id, DEFAULT_MSK_CONTRACT_ID);
    assert_eq!(config.oncology_contract_id, DEFAULT_ONCOLOGY_CONTRACT_ID);
    assert!(config.diagnostics.enabled);
    assert!(config.diagnostics.api_key.is_none());
}

#[test]
#[serial]
fn test_toml_values_applied() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("vbc.toml"),
        r#"
data_dir = "/srv/data"
config_dir = "/srv/config"
output_path = "/srv/out/report.html"
msk_contract_id = "MSK-TEST"

[logging]
level = "debug"

[diagnostics]
api_key = "from-toml"
"#,
    )
    .unwrap();

    let config = ResolvedConfig::resolve(&cli_with_config(&dir, "vbc.toml")).unwrap();

    assert_eq!(config.source, Some(dir.path().join("vbc.toml")));
    assert_eq!(config.data_dir, PathBuf::from("/srv/data"));
    assert_eq!(config.config_dir, PathBuf::from("/srv/config"));
    assert_eq!(config.output_path, PathBuf::from("/srv/out/report.html"));
    assert_eq!(config.msk_contract_id, "MSK-TEST");
    assert_eq!(config.oncology_contract_id, DEFAULT_ONCOLOGY_CONTRACT_ID);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.diagnostics.api_key.as_deref(), Some("from-toml"));
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("vbc.toml"),
        "data_dir = \"/srv/data\"\n[diagnostics]\napi_key = \"from-toml\"\n",
    )
    .unwrap();
    env::set_var(ENV_DATA_DIR, "/env/data");
    env::set_var(ENV_API_KEY, "from-env");

    let config = ResolvedConfig::resolve(&cli_with_config(&dir, "vbc.toml")).unwrap();

    assert_eq!(config.data_dir, PathBuf::from("/env/data"));
    assert_eq!(config.diagnostics.api_key.as_deref(), Some("from-env"));

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    env::set_var(ENV_DATA_DIR, "/env/data");
    env::set_var(ENV_OUTPUT, "/env/report.html");

    let mut cli = cli_with_config(&dir, "absent.toml");
    cli.data_dir = Some(PathBuf::from("/cli/data"));
    cli.no_ai = true;

    let config = ResolvedConfig::resolve(&cli).unwrap();

    assert_eq!(config.data_dir, PathBuf::from("/cli/data"));
    assert_eq!(config.output_path, PathBuf::from("/env/report.html"));
    assert!(!config.diagnostics.enabled);

    clear_env();
}

#[test]
#[serial]
fn test_empty_env_value_is_ignored() {
    clear_env();
    let dir = TempDir::new().unwrap();
    env::set_var(ENV_CONFIG_DIR, "  ");

    let config = ResolvedConfig::resolve(&cli_with_config(&dir, "absent.toml")).unwrap();
    assert_eq!(config.config_dir, PathBuf::from("config"));

    clear_env();
}

#[test]
#[serial]
fn test_malformed_config_file_is_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.toml"), "data_dir = [\n").unwrap();

    let result = ResolvedConfig::resolve(&cli_with_config(&dir, "bad.toml"));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_input_paths_join_fixed_file_names() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let mut cli = cli_with_config(&dir, "absent.toml");
    cli.data_dir = Some(PathBuf::from("/d"));
    cli.config_dir = Some(PathBuf::from("/c"));

    let config = ResolvedConfig::resolve(&cli).unwrap();

    assert_eq!(
        config.dataset_path(DatasetKind::OncDrugDetail),
        PathBuf::from("/d/onc_drug_detail.csv")
    );
    assert_eq!(
        config.contract_metadata_path(),
        PathBuf::from("/c/contract_metadata.json")
    );
    assert_eq!(
        config.reference_ranges_path(),
        PathBuf::from("/c/reference_ranges.json")
    );
}
