//! Per-user chunk index construction.
//!
//! Indexes are built once at process start from the static policy documents
//! assigned to each demo user, then shared read-only across requests. The
//! user id only selects an index; it never enters the pipeline state.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use coverly_core::domain::PolicyChunk;
use coverly_core::index::{ChunkIndex, IndexError};
use coverly_core::loader::{LoaderError, PolicyLoader};
use coverly_core::users::DemoUser;

use crate::llm::{EmbeddingClient, ExternalServiceError};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Read-only catalog of demo users and their embedded policy indexes.
pub struct CorpusCatalog {
    users: Vec<DemoUser>,
    indexes: BTreeMap<String, ChunkIndex>,
}

impl CorpusCatalog {
    /// Load, chunk, embed, and index every user's policy documents.
    pub async fn build(
        policies_dir: &Path,
        users: Vec<DemoUser>,
        embedder: &dyn EmbeddingClient,
    ) -> Result<Self, CorpusError> {
        let loader = PolicyLoader::new();
        let mut indexes = BTreeMap::new();

        for user in &users {
            let mut chunks: Vec<PolicyChunk> = Vec::new();
            for document in user.documents.values() {
                chunks.extend(loader.load_file(&policies_dir.join(document))?);
            }

            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = embedder.embed_batch(&texts).await?;
            for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }

            let index = ChunkIndex::build(chunks)?;
            info!(
                user = %user.id,
                chunks = index.len(),
                dimension = index.dimension(),
                "chunk index built"
            );
            indexes.insert(user.id.clone(), index);
        }

        Ok(Self { users, indexes })
    }

    pub fn users(&self) -> &[DemoUser] {
        &self.users
    }

    /// The user's profile and pre-built index, if the id is known.
    pub fn lookup(&self, user_id: &str) -> Option<(&DemoUser, &ChunkIndex)> {
        let user = coverly_core::users::find_user(&self.users, user_id)?;
        let index = self.indexes.get(&user.id)?;
        Some((user, index))
    }
}
