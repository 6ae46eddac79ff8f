//! Pipeline orchestrator.
//!
//! Sequences the four agents as an explicit state machine:
//!
//! ```text
//! START -> INTERPRETING -> SELECTING -> (CLARIFYING | RETRIEVING) -> EXPLAINING -> DONE
//! ```
//!
//! `CLARIFYING` is terminal for the turn: the clarification prompt goes back
//! to the caller and a later turn restarts the pipeline with the augmented
//! question. `FAILED` is absorbing and reachable from any state. Context
//! accumulates append-only; no stage mutates what an earlier stage produced.
//! Every stage outcome, including recovered ones, lands in the trace.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use coverly_core::domain::{
    ClarificationRequest, CoverageVerdict, PolicySelection, PolicyType, RetrievedPassage, Scenario,
};
use coverly_core::index::{ChunkIndex, IndexError};

use crate::explanation::ExplanationAgent;
use crate::interpreter::{InterpretError, ScenarioExtractionError, ScenarioInterpreter};
use crate::llm::{CompletionClient, EmbeddingClient, ExternalServiceError};
use crate::retrieval::{RetrievalAgent, RetrievalError};
use crate::selector::PolicySelector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    Interpreting,
    Selecting,
    Clarifying,
    Retrieving,
    Explaining,
    Done,
    Failed,
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineState::Start => "START",
            PipelineState::Interpreting => "INTERPRETING",
            PipelineState::Selecting => "SELECTING",
            PipelineState::Clarifying => "CLARIFYING",
            PipelineState::Retrieving => "RETRIEVING",
            PipelineState::Explaining => "EXPLAINING",
            PipelineState::Done => "DONE",
            PipelineState::Failed => "FAILED",
        }
    }
}

/// One trace entry: the stage that ran and a summary of its output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: PipelineState,
    pub summary: String,
    pub recorded_at: DateTime<Utc>,
}

/// Terminal outcome of a turn: either a grounded verdict or a clarification
/// request. Clarification is a result variant, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Verdict(CoverageVerdict),
    Clarification(ClarificationRequest),
}

/// Everything a completed turn accumulated, returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub correlation_id: String,
    pub scenario: Scenario,
    pub selection: PolicySelection,
    pub passages: Vec<RetrievedPassage>,
    pub outcome: PipelineOutcome,
    pub trace: Vec<StageRecord>,
}

/// Unrecoverable pipeline errors. Everything else degrades to a DEPENDS
/// verdict or a clarification instead of landing here.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ScenarioExtractionError),
    #[error(transparent)]
    Service(#[from] ExternalServiceError),
    #[error("chunk index is inconsistent: {0}")]
    Index(String),
}

impl PipelineError {
    /// Safe message for the caller; detail stays in the trace and logs.
    pub fn user_message(&self) -> &'static str {
        "Unable to process your question right now. Please try again."
    }
}

impl From<InterpretError> for PipelineError {
    fn from(value: InterpretError) -> Self {
        match value {
            InterpretError::Extraction(inner) => Self::Extraction(inner),
            InterpretError::Service(inner) => Self::Service(inner),
        }
    }
}

impl From<RetrievalError> for PipelineError {
    fn from(value: RetrievalError) -> Self {
        match value {
            RetrievalError::Service(inner) => Self::Service(inner),
            RetrievalError::Index(inner) => Self::Index(inner.to_string()),
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(value: IndexError) -> Self {
        Self::Index(value.to_string())
    }
}

/// A failed turn still carries the trace accumulated up to the failure.
#[derive(Clone, Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub correlation_id: String,
    pub trace: Vec<StageRecord>,
}

pub struct Orchestrator {
    interpreter: ScenarioInterpreter,
    selector: PolicySelector,
    retrieval: RetrievalAgent,
    explanation: ExplanationAgent,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn CompletionClient>,
        embedder: Arc<dyn EmbeddingClient>,
        top_k: usize,
    ) -> Self {
        Self {
            interpreter: ScenarioInterpreter::new(llm.clone()),
            selector: PolicySelector::new(llm.clone()),
            retrieval: RetrievalAgent::new(embedder, top_k),
            explanation: ExplanationAgent::new(llm),
        }
    }

    /// Process one question against the user's chunk index. `held` is the set
    /// of policy types the user actually holds.
    pub async fn run(
        &self,
        question: &str,
        held: &BTreeSet<PolicyType>,
        index: &ChunkIndex,
    ) -> Result<PipelineRun, PipelineFailure> {
        let correlation_id = Uuid::new_v4().to_string();
        let mut trace: Vec<StageRecord> = Vec::new();
        info!(correlation_id = %correlation_id, "pipeline turn started");

        // START -> INTERPRETING
        let scenario = match self.interpreter.interpret(question).await {
            Ok(scenario) => {
                record(
                    &mut trace,
                    PipelineState::Interpreting,
                    format!(
                        "asset={} event={} location={}",
                        scenario.asset.label(),
                        display_or_dash(&scenario.event),
                        display_or_dash(&scenario.location),
                    ),
                );
                scenario
            }
            Err(error) => return Err(fail(trace, correlation_id, error.into())),
        };

        // INTERPRETING -> SELECTING
        let selection = match self.selector.select(question, &scenario, held).await {
            Ok(selection) => {
                record(
                    &mut trace,
                    PipelineState::Selecting,
                    format!(
                        "candidates=[{}] confidence={:.2} needs_clarification={}",
                        join_types(&selection.candidate_policy_types),
                        selection.confidence,
                        selection.needs_clarification,
                    ),
                );
                selection
            }
            Err(error) => return Err(fail(trace, correlation_id, error.into())),
        };

        // SELECTING -> CLARIFYING (terminal for this turn)
        if selection.needs_clarification {
            let prompt = selection
                .clarification_prompt
                .clone()
                .unwrap_or_else(|| "Could you clarify which policy your question concerns?".into());
            record(&mut trace, PipelineState::Clarifying, prompt.clone());
            info!(correlation_id = %correlation_id, "pipeline halted for clarification");

            let clarification = ClarificationRequest {
                prompt,
                candidate_policy_types: selection.candidate_policy_types.clone(),
            };
            return Ok(PipelineRun {
                correlation_id,
                scenario,
                selection,
                passages: Vec::new(),
                outcome: PipelineOutcome::Clarification(clarification),
                trace,
            });
        }

        // SELECTING -> RETRIEVING
        let passages =
            match self.retrieval.retrieve(question, &scenario, &selection, index).await {
                Ok(passages) => {
                    record(
                        &mut trace,
                        PipelineState::Retrieving,
                        format!("{} passage(s) retrieved", passages.len()),
                    );
                    passages
                }
                Err(error) => return Err(fail(trace, correlation_id, error.into())),
            };

        // RETRIEVING -> EXPLAINING
        let outcome = match self.explanation.explain(question, &scenario, &passages).await {
            Ok(outcome) => outcome,
            Err(error) => return Err(fail(trace, correlation_id, error.into())),
        };
        record(
            &mut trace,
            PipelineState::Explaining,
            format!(
                "answer={} citations={}",
                outcome.verdict.answer,
                outcome.verdict.cited_sections.len()
            ),
        );
        if !outcome.dropped_citations.is_empty() {
            // Recovered locally, but it must still show up in the trace.
            record(
                &mut trace,
                PipelineState::Explaining,
                format!("dropped invalid citations: {}", outcome.dropped_citations.join(", ")),
            );
        }

        // EXPLAINING -> DONE
        record(&mut trace, PipelineState::Done, format!("verdict {}", outcome.verdict.answer));
        info!(correlation_id = %correlation_id, answer = %outcome.verdict.answer, "pipeline turn done");

        Ok(PipelineRun {
            correlation_id,
            scenario,
            selection,
            passages,
            outcome: PipelineOutcome::Verdict(outcome.verdict),
            trace,
        })
    }

    /// Restart the pipeline after a clarification turn. The scenario is
    /// re-extracted from the combined text; no in-flight state is resumed.
    pub async fn run_with_clarification(
        &self,
        original_question: &str,
        clarification_answer: &str,
        held: &BTreeSet<PolicyType>,
        index: &ChunkIndex,
    ) -> Result<PipelineRun, PipelineFailure> {
        let augmented =
            format!("{original_question}\nClarification: {clarification_answer}");
        self.run(&augmented, held, index).await
    }
}

fn record(trace: &mut Vec<StageRecord>, stage: PipelineState, summary: String) {
    trace.push(StageRecord { stage, summary, recorded_at: Utc::now() });
}

fn fail(
    mut trace: Vec<StageRecord>,
    correlation_id: String,
    pipeline_error: PipelineError,
) -> PipelineFailure {
    record(&mut trace, PipelineState::Failed, pipeline_error.to_string());
    error!(correlation_id = %correlation_id, error = %pipeline_error, "pipeline turn failed");
    PipelineFailure { error: pipeline_error, correlation_id, trace }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn join_types(types: &BTreeSet<PolicyType>) -> String {
    types.iter().map(PolicyType::label).collect::<Vec<_>>().join(", ")
}
