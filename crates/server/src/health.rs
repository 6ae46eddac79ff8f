use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use coverly_agent::corpus::CorpusCatalog;

#[derive(Clone)]
pub struct HealthState {
    catalog: Arc<CorpusCatalog>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub corpus: HealthCheck,
    pub checked_at: String,
}

pub fn router(catalog: Arc<CorpusCatalog>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { catalog })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let corpus = corpus_check(&state.catalog);
    let ready = corpus.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "coverly-server runtime initialized".to_string(),
        },
        corpus,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn corpus_check(catalog: &CorpusCatalog) -> HealthCheck {
    let users = catalog.users().len();
    let indexed_users = catalog
        .users()
        .iter()
        .filter(|user| catalog.lookup(&user.id).map(|(_, index)| !index.is_empty()).unwrap_or(false))
        .count();

    if users > 0 && indexed_users == users {
        HealthCheck {
            status: "ready",
            detail: format!("{indexed_users} demo user index(es) loaded"),
        }
    } else {
        HealthCheck {
            status: "degraded",
            detail: format!("{indexed_users} of {users} demo user index(es) loaded"),
        }
    }
}
