//! Coverly core - domain model, policy chunking, vector index, configuration.
//!
//! Everything in this crate is deterministic and free of network I/O. The
//! model-backed agents and the pipeline state machine live in `coverly-agent`.

pub mod config;
pub mod domain;
pub mod index;
pub mod loader;
pub mod users;

pub use domain::{
    AssetKind, ChunkId, ChunkKind, ClarificationRequest, CoverageAnswer, CoverageVerdict,
    PolicyChunk, PolicySelection, PolicyType, RetrievedPassage, Scenario,
};
pub use index::{ChunkIndex, IndexError};
pub use loader::{LoaderError, PolicyLoader};
pub use users::{builtin_users, find_user, DemoUser};
