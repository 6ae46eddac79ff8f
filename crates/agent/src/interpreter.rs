//! Scenario interpretation agent.
//!
//! Single source of truth for "what is the user asking about": extracts the
//! structured [`Scenario`] from the raw question via a JSON-constrained model
//! call. A parse failure triggers exactly one retry with a stricter
//! formatting instruction; a second failure surfaces
//! [`ScenarioExtractionError`] instead of fabricating a default.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use coverly_core::domain::{AssetKind, Scenario};

use crate::llm::{strip_code_fences, CompletionClient, ExternalServiceError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("scenario extraction produced unusable output after one retry: {detail}")]
pub struct ScenarioExtractionError {
    pub detail: String,
}

const SYSTEM_PROMPT: &str = "You are an insurance scenario interpreter. You extract structured \
facts from coverage questions. Always respond with valid JSON only. Leave a field as an empty \
string when the question does not allow you to infer it; never invent a value.";

const STRICT_RETRY_SUFFIX: &str = "\n\nYour previous reply could not be parsed. Respond with \
ONLY a single JSON object, no markdown fences, no commentary, using exactly the keys asset, \
event, location, reasoning.";

#[derive(Debug, Default, Deserialize)]
struct RawScenario {
    #[serde(default)]
    asset: String,
    #[serde(default)]
    event: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    reasoning: String,
}

pub struct ScenarioInterpreter {
    llm: Arc<dyn CompletionClient>,
}

impl ScenarioInterpreter {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    pub async fn interpret(&self, question: &str) -> Result<Scenario, InterpretError> {
        let prompt = build_prompt(question);

        let first = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;
        match parse_scenario(&first) {
            Ok(scenario) => return Ok(scenario),
            Err(detail) => {
                warn!(detail = %detail, "scenario reply unparseable, retrying once with stricter instruction");
            }
        }

        let strict_prompt = format!("{prompt}{STRICT_RETRY_SUFFIX}");
        let second = self.llm.complete(SYSTEM_PROMPT, &strict_prompt).await?;
        match parse_scenario(&second) {
            Ok(scenario) => {
                debug!("scenario extracted on retry");
                Ok(scenario)
            }
            Err(detail) => Err(InterpretError::Extraction(ScenarioExtractionError { detail })),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error(transparent)]
    Extraction(#[from] ScenarioExtractionError),
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
}

fn build_prompt(question: &str) -> String {
    format!(
        r#"Extract structured information from this insurance coverage question.

Question: "{question}"

1. asset - what is being insured (e.g. car, vehicle, house, roof, personal belongings)
2. event - what happened or is being asked about (e.g. theft, fire, flood, collision, hail)
3. location - where it occurred or the context (e.g. driveway, garage, inside the house)
4. reasoning - one sentence justifying your interpretation

Respond in this exact JSON format:
{{
    "asset": "...",
    "event": "...",
    "location": "...",
    "reasoning": "..."
}}

Leave a field as "" if the question does not say. Only respond with the JSON, nothing else."#
    )
}

fn parse_scenario(raw: &str) -> Result<Scenario, String> {
    let body = strip_code_fences(raw);
    let parsed: RawScenario =
        serde_json::from_str(body).map_err(|error| format!("{error}: {body:.120}"))?;

    Ok(Scenario {
        asset: AssetKind::from_label(&parsed.asset),
        event: parsed.event.trim().to_string(),
        location: normalize_unknown(&parsed.location),
        reasoning: parsed.reasoning.trim().to_string(),
    })
}

/// Models sometimes answer "unknown" despite being told to leave fields empty.
fn normalize_unknown(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("unknown") || trimmed.eq_ignore_ascii_case("n/a") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use coverly_core::domain::AssetKind;

    use crate::llm::ExternalServiceError;
    use crate::testing::FakeCompletionClient;

    use super::{InterpretError, ScenarioInterpreter};

    #[tokio::test]
    async fn parses_well_formed_reply() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![Ok(r#"{
            "asset": "car",
            "event": "theft",
            "location": "driveway",
            "reasoning": "The question is about a stolen vehicle."
        }"#
            .to_string())]));
        let interpreter = ScenarioInterpreter::new(llm.clone());

        let scenario = interpreter.interpret("Am I covered if my car is stolen?").await.unwrap();
        assert_eq!(scenario.asset, AssetKind::Vehicle);
        assert_eq!(scenario.event, "theft");
        assert_eq!(scenario.location, "driveway");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn tolerates_markdown_fences_and_unknown_markers() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![Ok(
            "```json\n{\"asset\": \"house\", \"event\": \"fire\", \"location\": \"unknown\", \"reasoning\": \"\"}\n```"
                .to_string(),
        )]));
        let interpreter = ScenarioInterpreter::new(llm);

        let scenario = interpreter.interpret("What if my house catches fire?").await.unwrap();
        assert_eq!(scenario.asset, AssetKind::Dwelling);
        assert_eq!(scenario.location, "");
    }

    #[tokio::test]
    async fn retries_once_then_succeeds() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![
            Ok("this is not json".to_string()),
            Ok(r#"{"asset": "car", "event": "hail", "location": "", "reasoning": "retry"}"#
                .to_string()),
        ]));
        let interpreter = ScenarioInterpreter::new(llm.clone());

        let scenario = interpreter.interpret("Hail dented my car").await.unwrap();
        assert_eq!(scenario.event, "hail");
        assert_eq!(llm.call_count(), 2);

        // The retry carries the stricter formatting instruction.
        let prompts = llm.recorded_prompts();
        assert!(prompts[1].contains("ONLY a single JSON object"));
    }

    #[tokio::test]
    async fn second_parse_failure_surfaces_extraction_error() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![
            Ok("nope".to_string()),
            Ok("still nope".to_string()),
        ]));
        let interpreter = ScenarioInterpreter::new(llm.clone());

        let error = interpreter.interpret("Is it covered?").await.unwrap_err();
        assert!(matches!(error, InterpretError::Extraction(_)));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn service_failures_propagate_without_retry_masking() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![Err(
            ExternalServiceError::Timeout { service: "completion", timeout_secs: 30 },
        )]));
        let interpreter = ScenarioInterpreter::new(llm);

        let error = interpreter.interpret("Is it covered?").await.unwrap_err();
        assert!(matches!(error, InterpretError::Service(ExternalServiceError::Timeout { .. })));
    }
}
