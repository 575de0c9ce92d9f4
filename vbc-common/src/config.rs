//! Run configuration: TOML bootstrap file plus overrides
//!
//! Settings are resolved in priority order:
//!
//! 1. Command-line arguments (`--data-dir`, `--config-dir`, `--output`, `--no-ai`)
//! 2. Environment variables (`VBC_DATA_DIR`, `VBC_CONFIG_DIR`, `VBC_OUTPUT`,
//!    `ANTHROPIC_API_KEY`)
//! 3. TOML configuration file (`--config`, else `./vbc.toml`, else
//!    `<user config dir>/vbc/config.toml`)
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: a warning is logged and defaults
//! apply. A TOML file that exists but does not parse is an error.

use crate::dataset::DatasetKind;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ENV_DATA_DIR: &str = "VBC_DATA_DIR";
pub const ENV_CONFIG_DIR: &str = "VBC_CONFIG_DIR";
pub const ENV_OUTPUT: &str = "VBC_OUTPUT";
pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";

pub const CONTRACT_METADATA_FILE: &str = "contract_metadata.json";
pub const REFERENCE_RANGES_FILE: &str = "reference_ranges.json";
pub const LOCAL_CONFIG_FILE: &str = "vbc.toml";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const DEFAULT_OUTPUT_PATH: &str = "output/vbc_validation_report.html";
pub const DEFAULT_MSK_CONTRACT_ID: &str = "MSK-2024-001";
pub const DEFAULT_ONCOLOGY_CONTRACT_ID: &str = "ONC-2024-001";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Directory holding the five CSV datasets
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding contract metadata and reference ranges
    #[serde(default)]
    pub config_dir: Option<PathBuf>,

    /// Report output file
    #[serde(default)]
    pub output_path: Option<PathBuf>,

    #[serde(default = "default_msk_contract_id")]
    pub msk_contract_id: String,

    #[serde(default = "default_oncology_contract_id")]
    pub oncology_contract_id: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            config_dir: None,
            output_path: None,
            msk_contract_id: default_msk_contract_id(),
            oncology_contract_id: default_oncology_contract_id(),
            logging: LoggingConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// AI diagnostics settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// API key; `ANTHROPIC_API_KEY` takes precedence
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            api_key: None,
            api_url: default_api_url(),
        }
    }
}

fn default_msk_contract_id() -> String {
    DEFAULT_MSK_CONTRACT_ID.to_string()
}

fn default_oncology_contract_id() -> String {
    DEFAULT_ONCOLOGY_CONTRACT_ID.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub no_ai: bool,
}

/// Fully resolved run configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
    pub output_path: PathBuf,
    pub msk_contract_id: String,
    pub oncology_contract_id: String,
    pub logging: LoggingConfig,
    pub diagnostics: DiagnosticsConfig,
    /// TOML file the settings came from, if any
    pub source: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Resolve every setting through the CLI → ENV → TOML → default chain.
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let source = locate_config_file(cli.config.as_deref());
        let toml_config = match &source {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::load(path)?
            }
            None => TomlConfig::default(),
        };
        Ok(Self::merge(cli, toml_config, source))
    }

    fn merge(cli: &CliOverrides, toml_config: TomlConfig, source: Option<PathBuf>) -> Self {
        let data_dir = pick_path(
            cli.data_dir.as_ref(),
            ENV_DATA_DIR,
            toml_config.data_dir,
            DEFAULT_DATA_DIR,
        );
        let config_dir = pick_path(
            cli.config_dir.as_ref(),
            ENV_CONFIG_DIR,
            toml_config.config_dir,
            DEFAULT_CONFIG_DIR,
        );
        let output_path = pick_path(
            cli.output.as_ref(),
            ENV_OUTPUT,
            toml_config.output_path,
            DEFAULT_OUTPUT_PATH,
        );

        let mut diagnostics = toml_config.diagnostics;
        if let Some(key) = env_value(ENV_API_KEY) {
            diagnostics.api_key = Some(key);
        }
        if cli.no_ai {
            diagnostics.enabled = false;
        }

        debug!(
            data_dir = %data_dir.display(),
            config_dir = %config_dir.display(),
            output = %output_path.display(),
            "Configuration resolved"
        );

        Self {
            data_dir,
            config_dir,
            output_path,
            msk_contract_id: toml_config.msk_contract_id,
            oncology_contract_id: toml_config.oncology_contract_id,
            logging: toml_config.logging,
            diagnostics,
            source,
        }
    }

    pub fn dataset_path(&self, kind: DatasetKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }

    pub fn contract_metadata_path(&self) -> PathBuf {
        self.config_dir.join(CONTRACT_METADATA_FILE)
    }

    pub fn reference_ranges_path(&self) -> PathBuf {
        self.config_dir.join(REFERENCE_RANGES_FILE)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn pick_path(
    cli: Option<&PathBuf>,
    env_name: &str,
    toml_value: Option<PathBuf>,
    default: &str,
) -> PathBuf {
    if let Some(path) = cli {
        return path.clone();
    }
    if let Some(value) = env_value(env_name) {
        return PathBuf::from(value);
    }
    toml_value.unwrap_or_else(|| PathBuf::from(default))
}

/// Find the TOML file to load.
///
/// An explicit path that does not exist logs a warning and yields `None`
/// rather than falling through to the implicit locations.
fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return None;
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let user = dirs::config_dir().map(|d| d.join("vbc").join("config.toml"))?;
    if user.exists() {
        Some(user)
    } else {
        debug!("No configuration file found, using defaults");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_defaults_fill_missing_sections() {
        let config = TomlConfig::from_toml_str("data_dir = \"/srv/vbc\"\n").unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/vbc")));
        assert_eq!(config.config_dir, None);
        assert_eq!(config.msk_contract_id, DEFAULT_MSK_CONTRACT_ID);
        assert_eq!(config.logging.level, "info");
        assert!(config.diagnostics.enabled);
        assert_eq!(config.diagnostics.max_tokens, 1500);
    }

    #[test]
    fn test_toml_diagnostics_section() {
        let config = TomlConfig::from_toml_str(
            "[diagnostics]\nenabled = false\nmodel = \"m\"\ntimeout_secs = 5\n",
        )
        .unwrap();
        assert!(!config.diagnostics.enabled);
        assert_eq!(config.diagnostics.model, "m");
        assert_eq!(config.diagnostics.timeout_secs, 5);
        assert_eq!(config.diagnostics.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(TomlConfig::from_toml_str("data_dir = [").is_err());
    }
}
