use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use coverly_agent::corpus::CorpusCatalog;
use coverly_agent::orchestrator::{Orchestrator, PipelineRun, StageRecord};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CorpusCatalog>,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub user_id: String,
    pub question: String,
    /// Present when this turn answers a previous clarification request; the
    /// pipeline restarts with the combined text.
    #[serde(default)]
    pub clarification_answer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub selected_user: String,
    #[serde(flatten)]
    pub run: PipelineRun,
}

#[derive(Debug, Serialize)]
pub struct AskError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<StageRecord>,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/ask", post(ask)).with_state(state)
}

pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<AskError>)> {
    let Some((user, index)) = state.catalog.lookup(&request.user_id) else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(AskError {
                error: format!("unknown demo user `{}`", request.user_id),
                correlation_id: None,
                trace: Vec::new(),
            }),
        ));
    };

    let held = user.held_policy_types();
    let result = match &request.clarification_answer {
        Some(answer) => {
            state
                .orchestrator
                .run_with_clarification(&request.question, answer, &held, index)
                .await
        }
        None => state.orchestrator.run(&request.question, &held, index).await,
    };

    match result {
        Ok(run) => {
            info!(
                correlation_id = %run.correlation_id,
                user = %user.id,
                "ask request completed"
            );
            Ok(Json(AskResponse { selected_user: user.id.clone(), run }))
        }
        Err(failure) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(AskError {
                error: failure.error.user_message().to_string(),
                correlation_id: Some(failure.correlation_id),
                trace: failure.trace,
            }),
        )),
    }
}
