//! Read-only HTTP status surface

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use deathmatch_core::{endpoints, AgentSnapshot, MatchSnapshot, VERSION};
use match_engine::SharedSnapshot;
use match_metrics::{MatchMetrics, MetricsReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

#[derive(Clone, Debug)]
pub struct StatusState {
    pub snapshot: SharedSnapshot,
    pub metrics: Arc<MatchMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentList {
    pub agents: Vec<AgentSnapshot>,
    pub total: usize,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health_check))
        .route(endpoints::METRICS, get(metrics))
        .route(endpoints::API_V1_MATCH, get(match_status))
        .route(endpoints::API_V1_AGENTS, get(list_agents))
        .with_state(state)
}

/// Bind `addr` and serve in the background for the life of the match.
pub async fn serve(addr: &str, state: StatusState) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!("Status API listening on {}", local);

    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "Status API stopped");
        }
    });
    Ok((local, handle))
}

#[instrument]
async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "deathmatch-server",
        "version": VERSION
    })))
}

#[instrument(skip(state))]
async fn metrics(State(state): State<StatusState>) -> Result<Json<MetricsReport>, StatusCode> {
    Ok(Json(state.metrics.report()))
}

#[instrument(skip(state))]
async fn match_status(State(state): State<StatusState>) -> Result<Json<MatchSnapshot>, StatusCode> {
    Ok(Json(state.snapshot.read().clone()))
}

#[instrument(skip(state))]
async fn list_agents(State(state): State<StatusState>) -> Result<Json<AgentList>, StatusCode> {
    let agents = state.snapshot.read().agents.clone();
    Ok(Json(AgentList {
        total: agents.len(),
        agents,
    }))
}
