//! Policy retrieval agent.
//!
//! Builds an enhanced query from the structured scenario, embeds it, and
//! searches the chunk index filtered to the selected policy types. Near-
//! identical chunks from the same section are deduplicated, keeping the
//! highest-scoring instance. An empty filtered universe yields an empty
//! result, never an error; the explanation stage treats that as insufficient
//! grounding.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use coverly_core::domain::{PolicySelection, RetrievedPassage, Scenario};
use coverly_core::index::{ChunkIndex, IndexError};

use crate::llm::{EmbeddingClient, ExternalServiceError};

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub struct RetrievalAgent {
    embedder: Arc<dyn EmbeddingClient>,
    top_k: usize,
}

impl RetrievalAgent {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    pub async fn retrieve(
        &self,
        question: &str,
        scenario: &Scenario,
        selection: &PolicySelection,
        index: &ChunkIndex,
    ) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_enhanced_query(question, scenario);
        debug!(query = %query, top_k = self.top_k, "embedding retrieval query");

        let query_embedding = self.embedder.embed(&query).await?;
        let hits =
            index.search(&query_embedding, self.top_k, &selection.candidate_policy_types)?;

        Ok(dedup_by_section(hits))
    }
}

/// Scenario fields lead the query so the embedding is biased toward the
/// structured semantics; the raw question follows for everything the
/// extraction missed.
fn build_enhanced_query(question: &str, scenario: &Scenario) -> String {
    let mut parts = Vec::with_capacity(4);

    if scenario.asset != coverly_core::domain::AssetKind::Other {
        parts.push(format!("Asset: {}", scenario.asset.label()));
    }
    if !scenario.event.is_empty() {
        parts.push(format!("Event: {}", scenario.event));
    }
    if !scenario.location.is_empty() {
        parts.push(format!("Location: {}", scenario.location));
    }
    parts.push(question.to_string());

    parts.join(" | ")
}

/// Keep only the best-scoring passage per (document, section). Input is
/// already sorted by non-increasing similarity, so the first occurrence wins;
/// ranks are reassigned afterwards.
fn dedup_by_section(hits: Vec<RetrievedPassage>) -> Vec<RetrievedPassage> {
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut deduped = Vec::with_capacity(hits.len());

    for mut hit in hits {
        let key = (hit.policy_identifier.clone(), hit.section_title.clone());
        if seen.insert(key) {
            hit.rank = deduped.len() + 1;
            deduped.push(hit);
        }
    }

    deduped
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use coverly_core::domain::{
        AssetKind, ChunkId, ChunkKind, PolicyChunk, PolicySelection, PolicyType, Scenario,
    };
    use coverly_core::index::ChunkIndex;

    use crate::testing::VocabEmbeddingClient;

    use super::{build_enhanced_query, RetrievalAgent, DEFAULT_TOP_K};

    fn scenario() -> Scenario {
        Scenario {
            asset: AssetKind::Vehicle,
            event: "theft".to_string(),
            location: "driveway".to_string(),
            reasoning: String::new(),
        }
    }

    fn chunk(id: &str, policy_type: PolicyType, section: &str, text: &str) -> PolicyChunk {
        let embedder = VocabEmbeddingClient::standard();
        PolicyChunk {
            id: ChunkId(id.to_string()),
            policy_type,
            policy_identifier: match policy_type {
                PolicyType::Auto => "auto_policy_1".to_string(),
                PolicyType::Property => "property_policy_1".to_string(),
            },
            section_title: section.to_string(),
            chunk_kind: ChunkKind::General,
            text: text.to_string(),
            embedding: embedder.embed_text(text),
        }
    }

    fn theft_corpus() -> ChunkIndex {
        ChunkIndex::build(vec![
            chunk(
                "a0",
                PolicyType::Auto,
                "Comprehensive Coverage",
                "We will pay for theft of your covered auto vehicle",
            ),
            chunk(
                "a1",
                PolicyType::Auto,
                "Liability",
                "Liability coverage for collision damage to others",
            ),
            chunk(
                "p0",
                PolicyType::Property,
                "Theft Coverage",
                "Theft of personal property from the dwelling house",
            ),
        ])
        .expect("index")
    }

    #[tokio::test]
    async fn filter_restricts_results_to_selected_types() {
        let agent =
            RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), DEFAULT_TOP_K);
        let selection = PolicySelection::single(PolicyType::Auto, 0.9);

        let passages = agent
            .retrieve("Am I covered if my car is stolen?", &scenario(), &selection, &theft_corpus())
            .await
            .unwrap();

        assert!(!passages.is_empty());
        assert!(passages.iter().all(|p| p.policy_type == PolicyType::Auto));
    }

    #[tokio::test]
    async fn results_are_ranked_and_most_relevant_first() {
        let agent =
            RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), DEFAULT_TOP_K);
        let selection = PolicySelection::single(PolicyType::Auto, 0.9);

        let passages = agent
            .retrieve("Am I covered if my car is stolen?", &scenario(), &selection, &theft_corpus())
            .await
            .unwrap();

        assert_eq!(passages[0].section_title, "Comprehensive Coverage");
        assert_eq!(passages[0].rank, 1);
        assert!(passages
            .windows(2)
            .all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[tokio::test]
    async fn duplicate_sections_keep_only_best_hit() {
        let index = ChunkIndex::build(vec![
            chunk("a0", PolicyType::Auto, "Comprehensive Coverage", "theft vehicle stolen car"),
            chunk("a1", PolicyType::Auto, "Comprehensive Coverage", "theft of the vehicle"),
            chunk("a2", PolicyType::Auto, "Liability", "collision liability"),
        ])
        .expect("index");

        let agent =
            RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), DEFAULT_TOP_K);
        let selection = PolicySelection::single(PolicyType::Auto, 0.9);

        let passages = agent
            .retrieve("Is my stolen car covered?", &scenario(), &selection, &index)
            .await
            .unwrap();

        let comprehensive: Vec<_> = passages
            .iter()
            .filter(|p| p.section_title == "Comprehensive Coverage")
            .collect();
        assert_eq!(comprehensive.len(), 1);
        // Ranks stay dense after dedup.
        for (position, passage) in passages.iter().enumerate() {
            assert_eq!(passage.rank, position + 1);
        }
    }

    #[tokio::test]
    async fn empty_universe_returns_empty_without_error() {
        let agent =
            RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), DEFAULT_TOP_K);
        let selection = PolicySelection::single(PolicyType::Property, 0.9);
        let empty = ChunkIndex::build(Vec::new()).expect("index");

        let passages = agent
            .retrieve("Is flood covered?", &scenario(), &selection, &empty)
            .await
            .unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn filtered_out_universe_returns_empty_without_error() {
        // Index holds only auto chunks; the selection asks for property.
        let agent =
            RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), DEFAULT_TOP_K);
        let selection = PolicySelection::single(PolicyType::Property, 0.9);
        let index = ChunkIndex::build(vec![chunk(
            "a0",
            PolicyType::Auto,
            "Comprehensive Coverage",
            "theft vehicle",
        )])
        .expect("index");

        let passages =
            agent.retrieve("Is theft covered?", &scenario(), &selection, &index).await.unwrap();
        assert!(passages.is_empty());
    }

    #[test]
    fn enhanced_query_leads_with_scenario_fields() {
        let query = build_enhanced_query("Am I covered if my car is stolen?", &scenario());
        assert_eq!(
            query,
            "Asset: vehicle | Event: theft | Location: driveway | Am I covered if my car is stolen?"
        );

        let sparse = Scenario {
            asset: AssetKind::Other,
            event: String::new(),
            location: String::new(),
            reasoning: String::new(),
        };
        assert_eq!(build_enhanced_query("Is it covered?", &sparse), "Is it covered?");
    }

    #[tokio::test]
    async fn cross_domain_selection_searches_both_types() {
        let agent = RetrievalAgent::new(Arc::new(VocabEmbeddingClient::standard()), 10);
        let selection = PolicySelection::all_of(
            BTreeSet::from([PolicyType::Auto, PolicyType::Property]),
            0.85,
        );

        let passages = agent
            .retrieve("Is theft covered?", &scenario(), &selection, &theft_corpus())
            .await
            .unwrap();

        let types: BTreeSet<PolicyType> = passages.iter().map(|p| p.policy_type).collect();
        assert!(types.contains(&PolicyType::Auto));
        assert!(types.contains(&PolicyType::Property));
    }
}
