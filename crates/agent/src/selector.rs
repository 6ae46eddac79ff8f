//! Policy selection agent.
//!
//! Decides which policy domain(s) a question concerns. Decision order:
//! a user holding a single policy type always gets that type; a deterministic
//! asset/keyword gate resolves clearly single-domain and clearly cross-domain
//! questions without a model call; only genuinely unclear questions go to the
//! model classifier. An unresolvable question becomes a clarification
//! request, which is a normal terminal state for the turn, not an error.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use coverly_core::domain::{PolicySelection, PolicyType, Scenario};

use crate::llm::{strip_code_fences, CompletionClient, ExternalServiceError};

const SYSTEM_PROMPT: &str = "You are an insurance policy classifier. You decide whether a \
coverage question concerns auto insurance, property insurance, both, or is ambiguous. Always \
respond with valid JSON only.";

/// Question-text markers for each domain. Locations like "garage" or
/// "driveway" are deliberately absent: a car parked at home is still an auto
/// question.
const AUTO_TERMS: &[&str] =
    &["car", "vehicle", "truck", "motorcycle", "collision", "windshield", "auto accident"];
const PROPERTY_TERMS: &[&str] =
    &["house", "home", "dwelling", "roof", "belongings", "contents", "basement", "apartment"];

const ALL_POLICY_TERMS: &[&str] =
    &["all my policies", "any of my policies", "across all policies", "which policy", "any policy"];

pub struct PolicySelector {
    llm: Arc<dyn CompletionClient>,
}

impl PolicySelector {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Select the policy type(s) to retrieve against, out of the types the
    /// user actually holds.
    pub async fn select(
        &self,
        question: &str,
        scenario: &Scenario,
        held: &BTreeSet<PolicyType>,
    ) -> Result<PolicySelection, ExternalServiceError> {
        // A single-policy user has nothing to disambiguate.
        if held.len() == 1 {
            if let Some(&only) = held.iter().next() {
                return Ok(PolicySelection::single(only, 1.0));
            }
        }

        let normalized = question.to_ascii_lowercase();

        if ALL_POLICY_TERMS.iter().any(|term| normalized.contains(term)) {
            debug!("question explicitly spans all held policies");
            return Ok(PolicySelection::all_of(held.clone(), 0.9));
        }

        let auto_signal = scenario.asset.policy_domain() == Some(PolicyType::Auto)
            || AUTO_TERMS.iter().any(|term| normalized.contains(term));
        let property_signal = scenario.asset.policy_domain() == Some(PolicyType::Property)
            || PROPERTY_TERMS.iter().any(|term| normalized.contains(term));

        match (auto_signal, property_signal) {
            (true, true) => return Ok(PolicySelection::all_of(held.clone(), 0.85)),
            (true, false) if held.contains(&PolicyType::Auto) => {
                return Ok(PolicySelection::single(PolicyType::Auto, 0.9));
            }
            (false, true) if held.contains(&PolicyType::Property) => {
                return Ok(PolicySelection::single(PolicyType::Property, 0.9));
            }
            (true, false) | (false, true) => {
                // The indicated domain is not among the user's policies;
                // search what they hold rather than refusing.
                return Ok(PolicySelection::all_of(held.clone(), 0.5));
            }
            (false, false) => {}
        }

        // No deterministic signal: ask the classifier.
        match self.classify(question).await? {
            Classification::Auto if held.contains(&PolicyType::Auto) => {
                Ok(PolicySelection::single(PolicyType::Auto, 0.75))
            }
            Classification::Property if held.contains(&PolicyType::Property) => {
                Ok(PolicySelection::single(PolicyType::Property, 0.75))
            }
            Classification::Auto | Classification::Property | Classification::Both => {
                Ok(PolicySelection::all_of(held.clone(), 0.75))
            }
            Classification::Ambiguous => {
                Ok(PolicySelection::ambiguous(held.clone(), clarification_prompt(held)))
            }
        }
    }

    async fn classify(&self, question: &str) -> Result<Classification, ExternalServiceError> {
        let prompt = build_classifier_prompt(question);
        let reply = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;

        match parse_classification(&reply) {
            Some(classification) => Ok(classification),
            None => {
                // Unparseable classification is treated as ambiguity, which
                // degrades to a clarification rather than failing the turn.
                warn!("classifier reply unparseable, treating question as ambiguous");
                Ok(Classification::Ambiguous)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Classification {
    Auto,
    Property,
    Both,
    Ambiguous,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    classification: String,
}

fn build_classifier_prompt(question: &str) -> String {
    format!(
        r#"Classify this insurance coverage question.

Question: "{question}"

- "auto": clearly about a vehicle (theft, damage, collision, comprehensive coverage)
- "property": clearly about a house, home, or belongings inside it
- "both": the user explicitly asks across all of their policies
- "ambiguous": a generic peril with no asset stated (e.g. "is flood damage covered?")

Respond in this exact JSON format:
{{
    "classification": "auto" OR "property" OR "both" OR "ambiguous",
    "reasoning": "one sentence"
}}

Only respond with the JSON, nothing else."#
    )
}

fn parse_classification(raw: &str) -> Option<Classification> {
    let parsed: RawClassification = serde_json::from_str(strip_code_fences(raw)).ok()?;
    match parsed.classification.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(Classification::Auto),
        "property" => Some(Classification::Property),
        "both" => Some(Classification::Both),
        "ambiguous" => Some(Classification::Ambiguous),
        _ => None,
    }
}

fn clarification_prompt(held: &BTreeSet<PolicyType>) -> String {
    let domains =
        held.iter().map(PolicyType::label).collect::<Vec<_>>().join(" or ");
    format!(
        "Your question could relate to either {domains} insurance. \
         Are you asking about your vehicle or your home/property?"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use coverly_core::domain::{AssetKind, PolicyType, Scenario};

    use crate::testing::FakeCompletionClient;

    use super::PolicySelector;

    fn scenario(asset: AssetKind, event: &str) -> Scenario {
        Scenario {
            asset,
            event: event.to_string(),
            location: String::new(),
            reasoning: String::new(),
        }
    }

    fn both_types() -> BTreeSet<PolicyType> {
        BTreeSet::from([PolicyType::Auto, PolicyType::Property])
    }

    #[tokio::test]
    async fn single_policy_user_skips_classification() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![]));
        let selector = PolicySelector::new(llm.clone());

        let selection = selector
            .select(
                "Is flood damage covered?",
                &scenario(AssetKind::Other, "flood"),
                &BTreeSet::from([PolicyType::Auto]),
            )
            .await
            .unwrap();

        assert_eq!(selection.candidate_policy_types, BTreeSet::from([PolicyType::Auto]));
        assert!(!selection.needs_clarification);
        assert_eq!(selection.confidence, 1.0);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn vehicle_asset_selects_auto_without_model_call() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![]));
        let selector = PolicySelector::new(llm.clone());

        let selection = selector
            .select(
                "Am I covered if my car is stolen?",
                &scenario(AssetKind::Vehicle, "theft"),
                &both_types(),
            )
            .await
            .unwrap();

        assert_eq!(selection.candidate_policy_types, BTreeSet::from([PolicyType::Auto]));
        assert!(!selection.needs_clarification);
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn cross_domain_question_selects_both_types() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![]));
        let selector = PolicySelector::new(llm);

        let selection = selector
            .select(
                "Hail damaged my roof and my car",
                &scenario(AssetKind::Other, "hail"),
                &both_types(),
            )
            .await
            .unwrap();

        assert_eq!(selection.candidate_policy_types, both_types());
        assert!(!selection.needs_clarification);
    }

    #[tokio::test]
    async fn generic_question_with_both_policies_requests_clarification() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![Ok(
            r#"{"classification": "ambiguous", "reasoning": "no asset stated"}"#.to_string(),
        )]));
        let selector = PolicySelector::new(llm.clone());

        let selection = selector
            .select("Is flood damage covered?", &scenario(AssetKind::Other, "flood"), &both_types())
            .await
            .unwrap();

        assert!(selection.needs_clarification);
        assert_eq!(selection.candidate_policy_types.len(), 2);
        let prompt = selection.clarification_prompt.expect("clarification prompt");
        assert!(prompt.contains("Auto or Property"));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn classifier_verdict_resolves_generic_question() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![Ok(
            r#"{"classification": "property", "reasoning": "water damage implies a dwelling"}"#
                .to_string(),
        )]));
        let selector = PolicySelector::new(llm);

        let selection = selector
            .select(
                "Is water damage from a burst pipe covered?",
                &scenario(AssetKind::Other, "water damage"),
                &both_types(),
            )
            .await
            .unwrap();

        assert_eq!(selection.candidate_policy_types, BTreeSet::from([PolicyType::Property]));
        assert!(!selection.needs_clarification);
    }

    #[tokio::test]
    async fn unparseable_classifier_reply_degrades_to_clarification() {
        let llm =
            Arc::new(FakeCompletionClient::with_replies(vec![Ok("no json here".to_string())]));
        let selector = PolicySelector::new(llm);

        let selection = selector
            .select("What about the damage?", &scenario(AssetKind::Other, ""), &both_types())
            .await
            .unwrap();

        assert!(selection.needs_clarification);
    }

    #[tokio::test]
    async fn explicit_all_policy_request_spans_held_types() {
        let llm = Arc::new(FakeCompletionClient::with_replies(vec![]));
        let selector = PolicySelector::new(llm.clone());

        let selection = selector
            .select(
                "Is theft covered under any of my policies?",
                &scenario(AssetKind::Other, "theft"),
                &both_types(),
            )
            .await
            .unwrap();

        assert_eq!(selection.candidate_policy_types, both_types());
        assert!(!selection.needs_clarification);
        assert_eq!(llm.call_count(), 0);
    }
}
