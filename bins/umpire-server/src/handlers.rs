// HTTP route handlers for the Umpire server

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use tracing::{info, warn};
use umpire_core::{JudgeData, Payload, Response};

use crate::AppState;

/// Judge calls that outlive this deadline get a pending marker while the
/// judgment keeps running in the background.
const PENDING_AFTER: Duration = Duration::from_secs(60);

/// What a handler sends back: either a full verdict or the pending marker.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiReply {
    Verdict(Response),
    Pending(Pending),
}

#[derive(Debug, Serialize)]
pub struct Pending {
    status: &'static str,
}

impl ApiReply {
    fn pending() -> Self {
        ApiReply::Pending(Pending { status: "pending" })
    }
}

/// POST /judge - judge a submission against its problem's fixtures
pub async fn judge(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Payload>,
) -> impl IntoResponse {
    info!(
        language = %payload.language,
        problem = payload.problem.as_ref().map(|p| p.id.as_str()).unwrap_or("<none>"),
        "judge request"
    );

    let agent = state.agent.clone();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = done_tx.send(agent.judge(&payload).await);
    });

    match tokio::time::timeout(PENDING_AFTER, done_rx).await {
        Ok(Ok(verdict)) => (StatusCode::CREATED, Json(ApiReply::Verdict(verdict))),
        Ok(Err(_)) => {
            warn!("judge task dropped before producing a verdict");
            (
                StatusCode::CREATED,
                Json(ApiReply::Verdict(Response::fail("judge task failed"))),
            )
        }
        Err(_) => {
            info!("judge still running, responding pending");
            (StatusCode::CREATED, Json(ApiReply::pending()))
        }
    }
}

/// POST /run - execute on user stdin with the canonical solution as oracle
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Payload>,
) -> impl IntoResponse {
    info!(
        language = %payload.language,
        problem = payload.problem.as_ref().map(|p| p.id.as_str()).unwrap_or("<none>"),
        "run request"
    );
    let verdict = state.agent.run(&payload).await;
    (StatusCode::OK, Json(ApiReply::Verdict(verdict)))
}

/// POST /execute - plain sandbox execution, pass iff stderr stayed empty
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Payload>,
) -> impl IntoResponse {
    info!(language = %payload.language, "execute request");
    let verdict = state.agent.execute(&payload).await;
    (StatusCode::OK, Json(ApiReply::Verdict(verdict)))
}

/// POST /validate - judge ad-hoc problem data against itself
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(data): Json<JudgeData>,
) -> impl IntoResponse {
    info!(
        language = %data.solution.language,
        fixtures = data.io.len(),
        "validate request"
    );
    let verdict = state.agent.validate(data).await;
    (StatusCode::OK, Json(ApiReply::Verdict(verdict)))
}
