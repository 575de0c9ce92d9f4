//! AI diagnostics
//!
//! Groups a run's flags by episode type and asks the model for a narrative
//! per group. Failures never escape: a group whose contract is unknown is
//! skipped with a warning, and a failed or unreadable model call yields a
//! placeholder narrative.

pub mod client;
pub mod narrative;
pub mod prompts;

pub use client::{AnthropicClient, DiagnosticsError};
pub use narrative::{DiagnosticNarrative, Intervention, ProbableCause};

use tracing::{info, warn};
use vbc_common::config::DiagnosticsConfig;
use vbc_common::models::{ContractMetadata, Flag};

use crate::loader::Inputs;

/// Flags sharing an episode-type label
#[derive(Debug)]
pub struct FlagGroup<'a> {
    pub episode_type: &'a str,
    pub flags: Vec<&'a Flag>,
}

impl FlagGroup<'_> {
    pub fn flag_ids(&self) -> Vec<String> {
        self.flags.iter().map(|f| f.flag_id.clone()).collect()
    }
}

/// Group flags by episode type, groups in first-seen order.
pub fn group_by_episode(flags: &[Flag]) -> Vec<FlagGroup<'_>> {
    let mut groups: Vec<FlagGroup<'_>> = Vec::new();
    for flag in flags {
        match groups.iter_mut().find(|g| g.episode_type == flag.episode_type) {
            Some(group) => group.flags.push(flag),
            None => groups.push(FlagGroup {
                episode_type: &flag.episode_type,
                flags: vec![flag],
            }),
        }
    }
    groups
}

/// One narrative per flag group whose contract is known.
pub async fn generate_all(
    flags: &[Flag],
    contracts: &ContractMetadata,
    inputs: &Inputs,
    config: &DiagnosticsConfig,
) -> Vec<DiagnosticNarrative> {
    if flags.is_empty() {
        return Vec::new();
    }
    let client = match AnthropicClient::new(config) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Diagnostics client unavailable");
            None
        }
    };
    if client.as_ref().is_some_and(|c| !c.has_api_key()) {
        warn!("No API key configured; diagnostics will contain placeholders only");
    }

    let mut narratives = Vec::new();
    for group in group_by_episode(flags) {
        let contract_id = group.flags[0].contract_id.as_str();
        let Some(contract) = contracts.get(contract_id) else {
            warn!(
                contract_id,
                episode_type = group.episode_type,
                "No contract found; skipping diagnostics for group"
            );
            continue;
        };

        let metrics = prompts::format_metrics(group.episode_type, inputs);
        let prompt = prompts::build_prompt(contract, group.episode_type, &group.flags, &metrics);
        let flag_ids = group.flag_ids();

        let result = match &client {
            Some(client) => match client.complete(prompts::SYSTEM_PROMPT, &prompt).await {
                Ok(text) => narrative::parse_narrative(&text, group.episode_type, flag_ids.clone()),
                Err(e) => Err(e),
            },
            None => Err(DiagnosticsError::Network("HTTP client unavailable".to_string())),
        };

        let narrative = result.unwrap_or_else(|e| {
            warn!(episode_type = group.episode_type, error = %e, "Diagnostics degraded to placeholder");
            DiagnosticNarrative::placeholder(group.episode_type, flag_ids, &e)
        });
        narratives.push(narrative);
    }

    info!(narratives = narratives.len(), "Diagnostics complete");
    narratives
}
