//! Agent runtime - the multi-agent coverage-determination pipeline.
//!
//! Four agents run in sequence under an explicit state machine:
//! 1. **Scenario interpretation** (`interpreter`) - question -> structured `Scenario`
//! 2. **Policy selection** (`selector`) - which policy domain(s), or a clarification
//! 3. **Retrieval** (`retrieval`) - ranked passages from the user's chunk index
//! 4. **Explanation** (`explanation`) - grounded, cited `CoverageVerdict`
//!
//! The `orchestrator` module owns the state machine and the stage trace; the
//! `llm` module is the capability seam for the completion and embedding
//! services; `corpus` builds the per-user indexes at startup; `testing` holds
//! deterministic fakes so everything above is testable without a live model.
//!
//! The model is strictly an extractor and explainer. It never decides which
//! policy applies (the selector's decision rules do) and its citations are
//! validated against the retrieved passages before anything reaches the
//! caller.

pub mod corpus;
pub mod explanation;
pub mod interpreter;
pub mod llm;
pub mod orchestrator;
pub mod retrieval;
pub mod selector;
pub mod testing;

pub use corpus::{CorpusCatalog, CorpusError};
pub use explanation::{ExplanationAgent, DISCLAIMER};
pub use interpreter::{ScenarioExtractionError, ScenarioInterpreter};
pub use llm::{
    CompletionClient, EmbeddingClient, ExternalServiceError, HttpCompletionClient,
    HttpEmbeddingClient,
};
pub use orchestrator::{
    Orchestrator, PipelineError, PipelineFailure, PipelineOutcome, PipelineRun, PipelineState,
    StageRecord,
};
pub use retrieval::{RetrievalAgent, DEFAULT_TOP_K};
pub use selector::PolicySelector;
