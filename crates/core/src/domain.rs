use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The two policy domains a demo user can hold documents for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Auto,
    Property,
}

impl PolicyType {
    pub fn label(&self) -> &'static str {
        match self {
            PolicyType::Auto => "Auto",
            PolicyType::Property => "Property",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the question is about, as extracted by the scenario interpreter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Vehicle,
    Dwelling,
    PersonalProperty,
    Other,
}

impl AssetKind {
    /// Lenient mapping from a free-text asset label. Model output is noisy;
    /// anything unrecognized lands in `Other` rather than failing the parse.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return AssetKind::Other;
        }

        const VEHICLE: &[&str] = &["car", "vehicle", "auto", "truck", "motorcycle", "suv", "van"];
        const DWELLING: &[&str] = &["house", "home", "dwelling", "roof", "garage", "residence"];
        const CONTENTS: &[&str] =
            &["contents", "belongings", "personal property", "furniture", "items", "jewelry"];

        if VEHICLE.iter().any(|term| normalized.contains(term)) {
            AssetKind::Vehicle
        } else if DWELLING.iter().any(|term| normalized.contains(term)) {
            AssetKind::Dwelling
        } else if CONTENTS.iter().any(|term| normalized.contains(term)) {
            AssetKind::PersonalProperty
        } else {
            AssetKind::Other
        }
    }

    /// The policy domain this asset unambiguously maps to, if any.
    pub fn policy_domain(&self) -> Option<PolicyType> {
        match self {
            AssetKind::Vehicle => Some(PolicyType::Auto),
            AssetKind::Dwelling | AssetKind::PersonalProperty => Some(PolicyType::Property),
            AssetKind::Other => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Vehicle => "vehicle",
            AssetKind::Dwelling => "dwelling",
            AssetKind::PersonalProperty => "personal property",
            AssetKind::Other => "other",
        }
    }
}

/// Structured extraction of one coverage question. Produced once per request
/// by the scenario interpreter and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub asset: AssetKind,
    /// Peril or cause of loss, free text. Empty when the model could not infer one.
    pub event: String,
    /// Where the loss occurred, free text. Empty when unknown.
    pub location: String,
    /// The model's justification for the extraction.
    pub reasoning: String,
}

/// Which policy type(s) the question concerns.
///
/// Invariant: when `needs_clarification` is true the candidate set is empty
/// or has two or more entries; when false it has exactly one entry, or both
/// entries for an approved cross-domain question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicySelection {
    pub candidate_policy_types: BTreeSet<PolicyType>,
    pub confidence: f64,
    pub needs_clarification: bool,
    pub clarification_prompt: Option<String>,
}

impl PolicySelection {
    /// A confident single-domain selection.
    pub fn single(policy_type: PolicyType, confidence: f64) -> Self {
        Self {
            candidate_policy_types: BTreeSet::from([policy_type]),
            confidence,
            needs_clarification: false,
            clarification_prompt: None,
        }
    }

    /// A cross-domain selection; retrieval searches every candidate type.
    pub fn all_of(types: BTreeSet<PolicyType>, confidence: f64) -> Self {
        Self {
            candidate_policy_types: types,
            confidence,
            needs_clarification: false,
            clarification_prompt: None,
        }
    }

    /// An ambiguous outcome that halts the pipeline for this turn.
    pub fn ambiguous(candidates: BTreeSet<PolicyType>, prompt: String) -> Self {
        Self {
            candidate_policy_types: candidates,
            confidence: 0.25,
            needs_clarification: true,
            clarification_prompt: Some(prompt),
        }
    }
}

/// The disambiguating question returned to the caller instead of a verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub prompt: String,
    pub candidate_policy_types: BTreeSet<PolicyType>,
}

/// Classification of a chunk's role within its policy document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Coverage,
    Exclusion,
    Condition,
    General,
}

impl ChunkKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChunkKind::Coverage => "coverage",
            ChunkKind::Exclusion => "exclusion",
            ChunkKind::Condition => "condition",
            ChunkKind::General => "general",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One contiguous section of a policy document, the unit of retrieval.
///
/// The loader creates chunks with an empty embedding; the index fills the
/// embedding at build time and the chunk is immutable from then on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyChunk {
    pub id: ChunkId,
    pub policy_type: PolicyType,
    /// Document identifier (file stem), e.g. `auto_policy_1`.
    pub policy_identifier: String,
    pub section_title: String,
    pub chunk_kind: ChunkKind,
    pub text: String,
    pub embedding: Vec<f32>,
}

impl PolicyChunk {
    /// Stable section identifier used for citations and dedup,
    /// e.g. `Auto Policy - Part D - Physical Damage Coverage`.
    pub fn section_reference(&self) -> String {
        format!("{} Policy - {}", self.policy_type.label(), self.section_title)
    }
}

/// A search hit: chunk metadata plus its similarity score and rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub chunk_id: ChunkId,
    pub policy_type: PolicyType,
    pub policy_identifier: String,
    pub section_title: String,
    pub chunk_kind: ChunkKind,
    pub text: String,
    pub similarity_score: f32,
    /// 1-based position after sorting and dedup.
    pub rank: usize,
}

impl RetrievedPassage {
    pub fn from_chunk(chunk: &PolicyChunk, similarity_score: f32, rank: usize) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            policy_type: chunk.policy_type,
            policy_identifier: chunk.policy_identifier.clone(),
            section_title: chunk.section_title.clone(),
            chunk_kind: chunk.chunk_kind,
            text: chunk.text.clone(),
            similarity_score,
            rank,
        }
    }

    pub fn section_reference(&self) -> String {
        format!("{} Policy - {}", self.policy_type.label(), self.section_title)
    }
}

/// Final coverage determination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageAnswer {
    Covered,
    NotCovered,
    Depends,
}

impl CoverageAnswer {
    pub fn label(&self) -> &'static str {
        match self {
            CoverageAnswer::Covered => "COVERED",
            CoverageAnswer::NotCovered => "NOT_COVERED",
            CoverageAnswer::Depends => "DEPENDS",
        }
    }
}

impl fmt::Display for CoverageAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal artifact of one pipeline run. Not persisted beyond the response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoverageVerdict {
    pub answer: CoverageAnswer,
    pub explanation_text: String,
    /// Section references of the passages the explanation relied on, in the
    /// order the model cited them. Every entry is present in the retrieved set.
    pub cited_sections: Vec<String>,
    pub disclaimer_text: String,
}
