//! Explanation agent.
//!
//! Turns the retrieved passages into a cited coverage verdict. The passages
//! are the only evidence the model may use: COVERED requires an explicit
//! covering clause with no applicable exclusion, NOT_COVERED requires an
//! applicable exclusion, and everything conditional or conflicting is
//! DEPENDS. Citations the model invents are stripped before the verdict is
//! returned. With no passages at all the agent short-circuits to DEPENDS
//! without calling the model.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use coverly_core::domain::{CoverageAnswer, CoverageVerdict, RetrievedPassage, Scenario};

use crate::llm::{strip_code_fences, CompletionClient, ExternalServiceError};

/// Appended to every verdict, unconditionally.
pub const DISCLAIMER: &str = "This information is for educational purposes only and does not \
constitute a coverage determination or claim decision. Actual coverage depends on the specific \
facts and circumstances of your situation and the complete terms and conditions of your policy. \
For official coverage determinations, please contact your insurance company or agent.";

const SYSTEM_PROMPT: &str = "You are an insurance policy assistant. You explain coverage in \
plain English, grounded strictly in the policy excerpts you are given. You never assume coverage \
that the excerpts do not state. Always respond with valid JSON only.";

const INSUFFICIENT_EVIDENCE_EXPLANATION: &str = "The policy documents in scope do not contain \
passages relevant to this question, so a grounded coverage determination is not possible. Try \
rephrasing the question or naming the asset and event involved.";

/// Verdict plus what was repaired on the way: citations the model produced
/// that do not correspond to any retrieved passage.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplanationOutcome {
    pub verdict: CoverageVerdict,
    pub dropped_citations: Vec<String>,
}

pub struct ExplanationAgent {
    llm: Arc<dyn CompletionClient>,
}

impl ExplanationAgent {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    pub async fn explain(
        &self,
        question: &str,
        scenario: &Scenario,
        passages: &[RetrievedPassage],
    ) -> Result<ExplanationOutcome, ExternalServiceError> {
        if passages.is_empty() {
            debug!("no retrieved passages, short-circuiting to DEPENDS");
            return Ok(ExplanationOutcome {
                verdict: CoverageVerdict {
                    answer: CoverageAnswer::Depends,
                    explanation_text: INSUFFICIENT_EVIDENCE_EXPLANATION.to_string(),
                    cited_sections: Vec::new(),
                    disclaimer_text: DISCLAIMER.to_string(),
                },
                dropped_citations: Vec::new(),
            });
        }

        let prompt = build_prompt(question, scenario, passages);
        let reply = self.llm.complete(SYSTEM_PROMPT, &prompt).await?;

        let (answer, explanation_text, cited) = match parse_reply(&reply) {
            Some(parsed) => parsed,
            None => {
                // Degraded evidence handling: an unparseable explanation
                // becomes DEPENDS citing everything retrieved.
                warn!("explanation reply unparseable, degrading to DEPENDS");
                return Ok(ExplanationOutcome {
                    verdict: CoverageVerdict {
                        answer: CoverageAnswer::Depends,
                        explanation_text:
                            "The policy passages could not be analyzed conclusively. Coverage \
                             may depend on details not present in the question."
                                .to_string(),
                        cited_sections: known_sections(passages),
                        disclaimer_text: DISCLAIMER.to_string(),
                    },
                    dropped_citations: Vec::new(),
                });
            }
        };

        let valid = known_sections(passages);
        let mut cited_sections = Vec::new();
        let mut dropped_citations = Vec::new();
        for citation in cited {
            let citation = citation.trim().to_string();
            let recognized = valid.iter().any(|section| section == &citation)
                || passages.iter().any(|p| p.section_title == citation);
            if recognized {
                if !cited_sections.contains(&citation) {
                    cited_sections.push(citation);
                }
            } else {
                dropped_citations.push(citation);
            }
        }

        if !dropped_citations.is_empty() {
            warn!(count = dropped_citations.len(), "dropped citations not present in retrieved passages");
        }

        Ok(ExplanationOutcome {
            verdict: CoverageVerdict {
                answer,
                explanation_text,
                cited_sections,
                disclaimer_text: DISCLAIMER.to_string(),
            },
            dropped_citations,
        })
    }
}

fn known_sections(passages: &[RetrievedPassage]) -> Vec<String> {
    let mut sections = Vec::new();
    for passage in passages {
        let reference = passage.section_reference();
        if !sections.contains(&reference) {
            sections.push(reference);
        }
    }
    sections
}

fn build_prompt(question: &str, scenario: &Scenario, passages: &[RetrievedPassage]) -> String {
    let mut context = String::new();
    for passage in passages {
        context.push_str(&format!(
            "[{}] ({} policy, {}):\n{}\n\n---\n\n",
            passage.section_reference(),
            passage.policy_type.label(),
            passage.chunk_kind.label(),
            passage.text,
        ));
    }

    format!(
        r#"Answer the user's coverage question using ONLY the policy excerpts below.

User question: "{question}"
Interpreted scenario: asset={asset}, event={event}, location={location}

Policy excerpts:
{context}
Decision rule:
- "COVERED" only if an excerpt explicitly covers the scenario and no directly applicable exclusion overrides it
- "NOT_COVERED" if a directly applicable exclusion is present
- "DEPENDS" if coverage hinges on facts not stated in the scenario (endorsements, circumstances) or the excerpts conflict
- If an exclusion applies, it takes precedence over a general coverage clause

Cite the bracketed section identifiers of the excerpts you relied on. Do not cite anything else.

Respond in this exact JSON format:
{{
    "answer": "COVERED" OR "NOT_COVERED" OR "DEPENDS",
    "explanation": "2-4 plain-English sentences grounded in the excerpts",
    "cited_sections": ["section identifier", "..."]
}}

Only respond with the JSON, nothing else."#,
        asset = scenario.asset.label(),
        event = if scenario.event.is_empty() { "unspecified" } else { scenario.event.as_str() },
        location =
            if scenario.location.is_empty() { "unspecified" } else { scenario.location.as_str() },
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    answer: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    cited_sections: Vec<String>,
}

fn parse_reply(raw: &str) -> Option<(CoverageAnswer, String, Vec<String>)> {
    let parsed: RawVerdict = serde_json::from_str(strip_code_fences(raw)).ok()?;
    let answer = match parsed.answer.trim().to_ascii_uppercase().as_str() {
        "COVERED" | "YES" => CoverageAnswer::Covered,
        "NOT_COVERED" | "NOT COVERED" | "NO" => CoverageAnswer::NotCovered,
        "DEPENDS" | "IT DEPENDS" => CoverageAnswer::Depends,
        _ => return None,
    };
    Some((answer, parsed.explanation.trim().to_string(), parsed.cited_sections))
}
