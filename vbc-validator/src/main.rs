//! vbc-validator - VBC performance report validation
//!
//! Validates an MSK and an oncology performance-report extract against
//! contract terms and clinical reference ranges, then writes an HTML
//! report of RED/YELLOW/GREEN flags.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use vbc_common::config::{CliOverrides, ResolvedConfig};

use vbc_validator::diagnosis;
use vbc_validator::loader::{Inputs, Records};
use vbc_validator::logging;
use vbc_validator::pipeline;
use vbc_validator::report::{ContractSection, ValidationReport};

/// Validate VBC performance-report extracts
#[derive(Parser, Debug)]
#[command(name = "vbc-validator", version)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the five CSV extracts
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory holding contract_metadata.json and reference_ranges.json
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// HTML report destination
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Skip AI diagnostics
    #[arg(long)]
    no_ai: bool,
}

impl From<Args> for CliOverrides {
    fn from(args: Args) -> Self {
        Self {
            config: args.config,
            data_dir: args.data_dir,
            config_dir: args.config_dir,
            output: args.output,
            no_ai: args.no_ai,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_filter = logging::init();

    let cli: CliOverrides = Args::parse().into();
    let config = ResolvedConfig::resolve(&cli).context("Failed to resolve configuration")?;
    logging::apply_level(&log_filter, &config.logging.level);

    info!("Starting vbc-validator");
    info!(
        "Version: {} [{}] built {}",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );
    if let Some(source) = &config.source {
        info!("Configuration: {}", source.display());
    }

    let inputs = Inputs::load(&config)?;
    let records = Records::from_inputs(&inputs);

    let run = pipeline::run(
        &inputs,
        &records,
        &config.msk_contract_id,
        &config.oncology_contract_id,
    )
    .context("Validation failed")?;
    println!(
        "Validation complete: {} flags (RED: {}, YELLOW: {}, GREEN: {})",
        run.counts.total(),
        run.counts.red,
        run.counts.yellow,
        run.counts.green
    );

    let narratives = if config.diagnostics.enabled {
        let narratives =
            diagnosis::generate_all(&run.flags, &inputs.contracts, &inputs, &config.diagnostics)
                .await;
        println!("AI diagnostics: {} narratives generated", narratives.len());
        narratives
    } else {
        info!("AI diagnostics disabled");
        Vec::new()
    };

    let msk = inputs.contracts.require(&config.msk_contract_id)?;
    let oncology = inputs
        .contracts
        .require(&config.oncology_contract_id)?;
    let sections = vec![
        ContractSection::new(msk, &run, records.msk()),
        ContractSection::new(oncology, &run, records.oncology()),
    ];
    let report = ValidationReport::new(&run, sections, &narratives);
    report.write(&config.output_path)?;
    println!("Report generated: {}", config.output_path.display());

    Ok(())
}
