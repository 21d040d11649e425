use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::api::error::ApiError;
use crate::conflict::{ConflictView, HistoryStats, ResolutionPreview};
use crate::engine::Orchestrator;
use crate::error::ConcordError;
use crate::registry::DiscoveryCriteria;
use crate::types::{
    AgentMetadata, AgentStatus, AgentType, ConflictHistoryEntry, ConflictId, FileLock,
    HistoryFilter, ResolutionRequest, ResolutionStrategy, ResolutionSuggestion,
};

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Comma-separated agent ids.
    pub agents: Option<String>,
    /// Comma-separated path substrings.
    pub files: Option<String>,
    /// Comma-separated strategy names.
    pub strategies: Option<String>,
}

impl TryFrom<HistoryQuery> for HistoryFilter {
    type Error = ConcordError;

    fn try_from(query: HistoryQuery) -> Result<Self, Self::Error> {
        let strategies = split_list(query.strategies)
            .iter()
            .map(|s| s.parse::<ResolutionStrategy>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(HistoryFilter {
            from: query.from,
            to: query.to,
            agent_ids: split_list(query.agents),
            file_patterns: split_list(query.files),
            strategies,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AgentQuery {
    #[serde(rename = "type")]
    pub agent_type: Option<AgentType>,
    pub status: Option<AgentStatus>,
    /// Comma-separated capabilities, all required.
    pub capabilities: Option<String>,
    pub max_workload: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct MergedBuffer {
    pub content: String,
}

pub async fn health_check(State(orchestrator): State<Arc<Orchestrator>>) -> Json<serde_json::Value> {
    let report = orchestrator.registry().health_check();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "agents": {
            "healthy": report.healthy.len(),
            "unhealthy": report.unhealthy.len(),
        },
        "active_conflicts": orchestrator.active_conflicts().len(),
    }))
}

pub async fn list_conflicts(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Vec<ConflictView>> {
    Json(orchestrator.active_conflicts())
}

pub async fn get_conflict(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<ConflictId>,
) -> Result<Json<ConflictView>, ApiError> {
    Ok(Json(orchestrator.get_conflict(id)?))
}

pub async fn resolve_conflict(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<ConflictId>,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<ConflictHistoryEntry>, ApiError> {
    Ok(Json(orchestrator.resolve(id, request).await?))
}

pub async fn preview_resolution(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<ConflictId>,
    Json(request): Json<ResolutionRequest>,
) -> Result<Json<ResolutionPreview>, ApiError> {
    Ok(Json(orchestrator.preview(id, request)?))
}

pub async fn update_merged(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<ConflictId>,
    Json(buffer): Json<MergedBuffer>,
) -> Result<Json<ConflictView>, ApiError> {
    Ok(Json(orchestrator.update_merged(id, &buffer.content)?))
}

pub async fn get_suggestions(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<ConflictId>,
) -> Result<Json<Vec<ResolutionSuggestion>>, ApiError> {
    Ok(Json(orchestrator.suggestions(id)?))
}

pub async fn get_history(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ConflictHistoryEntry>>, ApiError> {
    let filter = HistoryFilter::try_from(query)?;
    Ok(Json(orchestrator.history(&filter).await?))
}

pub async fn get_history_stats(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Result<Json<HistoryStats>, ApiError> {
    Ok(Json(orchestrator.history_stats().await?))
}

pub async fn list_locks(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Vec<FileLock>> {
    Json(orchestrator.active_locks())
}

pub async fn list_agents(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<AgentQuery>,
) -> Json<Vec<AgentMetadata>> {
    let criteria = DiscoveryCriteria {
        agent_type: query.agent_type,
        status: query.status,
        capabilities: split_list(query.capabilities),
        max_workload: query.max_workload,
    };
    Json(orchestrator.registry().discover(&criteria))
}

pub async fn get_agent(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<String>,
) -> Result<Json<AgentMetadata>, ApiError> {
    orchestrator
        .registry()
        .get_metadata(&id)
        .map(Json)
        .ok_or_else(|| ConcordError::agent_not_found(id).into())
}

pub async fn stream_events(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(orchestrator.registry().subscribe())
        .filter_map(|event| event.ok())
        .map(|event| Event::default().json_data(&event));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
