use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use coverly_agent::corpus::{CorpusCatalog, CorpusError};
use coverly_agent::llm::{HttpCompletionClient, HttpEmbeddingClient};
use coverly_agent::orchestrator::Orchestrator;
use coverly_core::config::AppConfig;
use coverly_core::users::builtin_users;

/// Fully wired application: configuration, the shared read-only corpus
/// catalog, and the pipeline orchestrator.
pub struct Application {
    pub config: AppConfig,
    pub catalog: Arc<CorpusCatalog>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("corpus build failed: {0}")]
    Corpus(#[from] CorpusError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let embedder = HttpEmbeddingClient::new(&config.embedding);
    let catalog =
        CorpusCatalog::build(&config.policies.dir, builtin_users(), &embedder).await?;
    info!(
        event_name = "system.bootstrap.corpus_ready",
        correlation_id = "bootstrap",
        users = catalog.users().len(),
        "per-user chunk indexes built"
    );

    let llm = Arc::new(HttpCompletionClient::new(&config.llm));
    let orchestrator =
        Arc::new(Orchestrator::new(llm, Arc::new(embedder), config.retrieval.top_k));

    Ok(Application { config, catalog: Arc::new(catalog), orchestrator })
}
