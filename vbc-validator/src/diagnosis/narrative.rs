//! Diagnostic narrative model and response parsing

use serde::{Deserialize, Serialize};

use super::client::DiagnosticsError;

/// Longest slice of an unparseable response echoed into a placeholder
const RAW_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbableCause {
    #[serde(default)]
    pub cause: String,
    /// high / medium / low
    #[serde(default)]
    pub likelihood: String,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    #[serde(default)]
    pub intervention: String,
    /// immediate / short-term / contract-renewal
    #[serde(default)]
    pub timeframe: String,
    #[serde(default)]
    pub expected_impact: String,
}

/// Model-written interpretation of one episode type's flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticNarrative {
    pub episode_type: String,
    pub diagnosis_summary: String,
    pub probable_causes: Vec<ProbableCause>,
    pub questions_for_provider: Vec<String>,
    pub recommended_interventions: Vec<Intervention>,
    pub contract_implications: String,
    /// Ids of the flags this narrative covers
    pub flags_addressed: Vec<String>,
}

/// JSON body the model is asked to return
#[derive(Debug, Default, Deserialize)]
struct NarrativeBody {
    #[serde(default)]
    diagnosis_summary: String,
    #[serde(default)]
    probable_causes: Vec<ProbableCause>,
    #[serde(default)]
    questions_for_provider: Vec<String>,
    #[serde(default)]
    recommended_interventions: Vec<Intervention>,
    #[serde(default)]
    contract_implications: String,
}

impl DiagnosticNarrative {
    /// Reduced-content narrative used when the model could not be consulted
    /// or its answer could not be read.
    pub fn placeholder(episode_type: &str, flags_addressed: Vec<String>, err: &DiagnosticsError) -> Self {
        let (summary, implications) = match err {
            DiagnosticsError::Parse { raw, .. } => (
                format!(
                    "AI response could not be parsed: {}",
                    raw.chars().take(RAW_EXCERPT_CHARS).collect::<String>()
                ),
                "Unable to assess: response parsing failed.",
            ),
            other => (
                format!("AI diagnostics unavailable: {other}"),
                "Unable to assess: AI diagnostics unavailable.",
            ),
        };
        Self {
            episode_type: episode_type.to_string(),
            diagnosis_summary: summary,
            contract_implications: implications.to_string(),
            flags_addressed,
            ..Default::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.probable_causes.is_empty()
            && self.questions_for_provider.is_empty()
            && self.recommended_interventions.is_empty()
            && self.diagnosis_summary.starts_with("AI ")
    }
}

/// The JSON payload of a response: the body of the first fenced code block
/// (with or without a `json` tag) when there is one, else the trimmed text.
pub fn extract_json(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text.trim();
    };
    let after_fence = &text[start + 3..];
    let body = after_fence.strip_prefix("json").unwrap_or(after_fence);
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => text.trim(),
    }
}

/// Parse a model response into a narrative for `episode_type`.
pub fn parse_narrative(
    text: &str,
    episode_type: &str,
    flags_addressed: Vec<String>,
) -> Result<DiagnosticNarrative, DiagnosticsError> {
    let body: NarrativeBody =
        serde_json::from_str(extract_json(text)).map_err(|e| DiagnosticsError::Parse {
            message: e.to_string(),
            raw: text.to_string(),
        })?;
    Ok(DiagnosticNarrative {
        episode_type: episode_type.to_string(),
        diagnosis_summary: body.diagnosis_summary,
        probable_causes: body.probable_causes,
        questions_for_provider: body.questions_for_provider,
        recommended_interventions: body.recommended_interventions,
        contract_implications: body.contract_implications,
        flags_addressed,
    })
}
