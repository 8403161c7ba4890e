//! Simulation REST + SSE routes
//!
//! ## Endpoints
//!
//! - `GET  /api/health`                    - Provider status
//! - `GET  /api/simulation/state`          - Current snapshot
//! - `POST /api/simulation/reset`          - Back to the initial state
//! - `POST /api/simulation/step`           - Play one turn
//! - `POST /api/simulation/step/stream`    - Play one turn, SSE (`chunk`, `retract`, `done`, `error`)
//! - `POST /api/audience/submit`           - Queue an audience proposal
//! - `POST /api/audience/select`           - Moderator picks the three choices
//! - `POST /api/audience/vote`             - Vote for a choice
//! - `POST /api/audience/vote/simulate`    - Vote for a random choice

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::error;

use super::ApiError;
use crate::agents::ReplyChunk;
use crate::engine::{Snapshot, TurnEngine, MAX_PROPOSAL_CHARS};

const MAX_SCAMMER_INPUT_CHARS: usize = 1200;
const MAX_WINNER_INDEX: usize = 2;
const EVENT_BUFFER: usize = 64;

// ── Requests ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StepRequest {
    pub scammer_input: String,
}

#[derive(Debug, Deserialize)]
pub struct ProposalRequest {
    pub proposal: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectChoicesRequest {
    #[serde(default)]
    pub proposals: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub winner_index: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub llm_enabled: bool,
    pub llm_configured: bool,
    pub llm_provider: String,
    pub llm_model: String,
}

/// Length bounds on a request field, in characters
fn check_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len == 0 || len > max {
        return Err(ApiError::unprocessable(format!(
            "{} doit contenir entre 1 et {} caracteres.",
            field, max
        )));
    }
    Ok(())
}

// ── Router ───────────────────────────────────────────────────

/// Create the simulation router over a shared engine
pub fn create_simulation_router(engine: Arc<TurnEngine>) -> Router<()> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/simulation/state", get(get_state))
        .route("/api/simulation/reset", post(reset))
        .route("/api/simulation/step", post(step))
        .route("/api/simulation/step/stream", post(step_stream))
        .route("/api/audience/submit", post(submit_proposal))
        .route("/api/audience/select", post(select_choices))
        .route("/api/audience/vote", post(vote))
        .route("/api/audience/vote/simulate", post(simulate_vote))
        .with_state(engine)
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/health
async fn health(State(engine): State<Arc<TurnEngine>>) -> Json<HealthResponse> {
    let status = engine.llm_status();
    Json(HealthResponse {
        status: "ok",
        llm_enabled: status.llm_enabled,
        llm_configured: status.llm_configured,
        llm_provider: status.llm_provider,
        llm_model: status.llm_model,
    })
}

/// GET /api/simulation/state
async fn get_state(State(engine): State<Arc<TurnEngine>>) -> Json<Snapshot> {
    Json(engine.snapshot().await)
}

/// POST /api/simulation/reset
async fn reset(State(engine): State<Arc<TurnEngine>>) -> Json<Snapshot> {
    Json(engine.reset().await)
}

/// POST /api/simulation/step
async fn step(
    State(engine): State<Arc<TurnEngine>>,
    Json(req): Json<StepRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    check_length("scammer_input", &req.scammer_input, MAX_SCAMMER_INPUT_CHARS)?;
    Ok(Json(engine.step(&req.scammer_input).await?))
}

/// POST /api/simulation/step/stream (SSE)
///
/// The turn runs in its own task: a client that disconnects does not stop
/// it, and the turn is recorded either way.
async fn step_stream(
    State(engine): State<Arc<TurnEngine>>,
    Json(req): Json<StepRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_length("scammer_input", &req.scammer_input, MAX_SCAMMER_INPUT_CHARS)?;

    let (event_tx, event_rx) = mpsc::channel::<Event>(EVENT_BUFFER);
    tokio::spawn(async move {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(EVENT_BUFFER);
        let input = req.scammer_input;
        let turn = tokio::spawn(async move { engine.step_stream(&input, chunk_tx).await });

        while let Some(chunk) = chunk_rx.recv().await {
            let event = match chunk {
                ReplyChunk::Text(text) => json_event("chunk", &json!({ "text": text })),
                ReplyChunk::Retract => json_event("retract", &json!({})),
            };
            // Keep draining after a disconnect so the turn can finish.
            let _ = event_tx.send(event).await;
        }

        let last = match turn.await {
            Ok(Ok(snapshot)) => json_event("done", &json!({ "state": snapshot })),
            Ok(Err(e)) => json_event("error", &json!({ "detail": e.to_string() })),
            Err(e) => {
                error!("Streaming turn task failed: {}", e);
                json_event("error", &json!({ "detail": "Erreur pendant le streaming." }))
            }
        };
        let _ = event_tx.send(last).await;
    });

    let stream = ReceiverStream::new(event_rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

fn json_event(name: &str, data: &serde_json::Value) -> Event {
    Event::default().event(name).data(data.to_string())
}

/// POST /api/audience/submit
async fn submit_proposal(
    State(engine): State<Arc<TurnEngine>>,
    Json(req): Json<ProposalRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    check_length("proposal", &req.proposal, MAX_PROPOSAL_CHARS)?;
    Ok(Json(engine.submit_proposal(&req.proposal).await?))
}

/// POST /api/audience/select
async fn select_choices(
    State(engine): State<Arc<TurnEngine>>,
    body: Option<Json<SelectChoicesRequest>>,
) -> Json<Snapshot> {
    let proposals = body.and_then(|Json(req)| req.proposals);
    Json(engine.select_choices(proposals).await)
}

/// POST /api/audience/vote
async fn vote(
    State(engine): State<Arc<TurnEngine>>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<Snapshot>, ApiError> {
    let index = usize::try_from(req.winner_index)
        .ok()
        .filter(|i| *i <= MAX_WINNER_INDEX)
        .ok_or_else(|| {
            ApiError::unprocessable(format!(
                "winner_index doit etre compris entre 0 et {}.",
                MAX_WINNER_INDEX
            ))
        })?;
    Ok(Json(engine.vote_choice(index).await?))
}

/// POST /api/audience/vote/simulate
async fn simulate_vote(
    State(engine): State<Arc<TurnEngine>>,
) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(engine.simulate_vote().await?))
}
