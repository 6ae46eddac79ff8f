//! Embedded chunk index.
//!
//! Exact nearest-neighbor search over L2-normalized embeddings. Cosine
//! similarity between normalized vectors reduces to a dot product, so a fixed
//! chunk set and query always produce the same ranking. The index is built
//! once at process start and never mutated during request handling.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::domain::{ChunkId, PolicyChunk, PolicyType, RetrievedPassage};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("chunk `{chunk_id}` has embedding dimension {actual}, index expects {expected}")]
    DimensionMismatch { chunk_id: ChunkId, expected: usize, actual: usize },
    #[error("query embedding has dimension {actual}, index expects {expected}")]
    QueryDimensionMismatch { expected: usize, actual: usize },
    #[error("chunk `{chunk_id}` has a zero-magnitude embedding")]
    ZeroMagnitude { chunk_id: ChunkId },
}

/// Read-only vector index over a set of policy chunks.
#[derive(Clone, Debug, Default)]
pub struct ChunkIndex {
    chunks: Vec<PolicyChunk>,
    dimension: usize,
}

impl ChunkIndex {
    /// Build an index from embedded chunks. Every chunk must carry an
    /// embedding of the same nonzero dimension; embeddings are normalized in
    /// place and insertion order is preserved for tie-breaking.
    pub fn build(chunks: Vec<PolicyChunk>) -> Result<Self, IndexError> {
        let mut indexed = Vec::with_capacity(chunks.len());
        let mut dimension = 0usize;

        for mut chunk in chunks {
            if dimension == 0 {
                dimension = chunk.embedding.len();
            }
            if chunk.embedding.len() != dimension || chunk.embedding.is_empty() {
                return Err(IndexError::DimensionMismatch {
                    chunk_id: chunk.id.clone(),
                    expected: dimension,
                    actual: chunk.embedding.len(),
                });
            }
            normalize(&mut chunk.embedding)
                .ok_or_else(|| IndexError::ZeroMagnitude { chunk_id: chunk.id.clone() })?;
            indexed.push(chunk);
        }

        Ok(Self { chunks: indexed, dimension })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Policy types present in the indexed corpus.
    pub fn policy_types(&self) -> BTreeSet<PolicyType> {
        self.chunks.iter().map(|chunk| chunk.policy_type).collect()
    }

    /// Return the `k` nearest chunks whose policy type is in `filter`. An
    /// empty filter means no restriction. Results are ordered by
    /// non-increasing similarity; ties keep chunk insertion order. A `k`
    /// larger than the filtered universe returns every match.
    pub fn search(
        &self,
        query_embedding: &[f32],
        k: usize,
        filter: &BTreeSet<PolicyType>,
    ) -> Result<Vec<RetrievedPassage>, IndexError> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query_embedding.len() != self.dimension {
            return Err(IndexError::QueryDimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }

        let mut query = query_embedding.to_vec();
        // A zero query cannot rank anything; treat it as matching nothing.
        if normalize(&mut query).is_none() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| filter.is_empty() || filter.contains(&chunk.policy_type))
            .map(|(position, chunk)| (position, dot(&query, &chunk.embedding)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (position, score))| {
                RetrievedPassage::from_chunk(&self.chunks[position], score, rank + 1)
            })
            .collect())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale a vector to unit L2 norm. Returns `None` for a zero vector.
fn normalize(vector: &mut [f32]) -> Option<()> {
    let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude <= f32::EPSILON {
        return None;
    }
    for value in vector.iter_mut() {
        *value /= magnitude;
    }
    Some(())
}
