//! REST handlers for the control-plane surface

use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;
use weft_core::{Error, NodeDescriptor, NodeName, Task, TaskId};
use weft_queue::QueueError;
use weft_registry::{Heartbeat, NodeView, Registry, RegistryError};
use weft_router::RouteOutcome;

/// Error wrapper rendering the core taxonomy as a JSON response
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        Self(err.into())
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.0.to_string(),
            "category": self.0.category(),
        }));
        (status, body).into_response()
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Register (or re-register) a node
pub async fn register(
    State(state): State<AppState>,
    Json(descriptor): Json<NodeDescriptor>,
) -> Result<impl IntoResponse, ApiError> {
    let name = descriptor.name.clone();
    let registered_at = state.registry.register(descriptor).await?;
    Ok(Json(json!({
        "registered": name,
        "timestamp": registered_at,
    })))
}

/// Refresh a node's liveness, optionally with piggybacked telemetry
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(name): Path<String>,
    telemetry: Option<Json<Heartbeat>>,
) -> Result<impl IntoResponse, ApiError> {
    let name = NodeName::from(name);
    let seen_at = state
        .registry
        .heartbeat(&name, telemetry.map(|Json(t)| t))
        .await?;
    Ok(Json(json!({
        "node": name,
        "seen_at": seen_at,
    })))
}

/// Every known node with its computed liveness, keyed by name
pub async fn list_nodes(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let nodes = state.registry.list_nodes().await?;
    let total = nodes.len();
    let active = nodes.iter().filter(|n| n.status.is_live()).count();
    let by_name: BTreeMap<String, NodeView> = nodes
        .into_iter()
        .map(|n| (n.name.to_string(), n))
        .collect();
    Ok(Json(json!({
        "total": total,
        "active": active,
        "nodes": by_name,
    })))
}

/// Nodes plus mesh/replication/inference edges
pub async fn topology(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let view = state.registry.topology().await?;
    Ok(Json(view))
}

/// Aggregate registry statistics
pub async fn stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.registry.stats().await?;
    Ok(Json(stats))
}

/// Body of a routing request
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub model: String,
    pub payload: String,

    /// Caller identity; defaults to this process's node name
    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub resource_hint: Option<u32>,

    #[serde(default)]
    pub priority: Option<i32>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Route a task: executes on a node or lands in the offline queue
pub async fn route(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> Result<Json<RouteOutcome>, ApiError> {
    if request.model.trim().is_empty() {
        return Err(Error::invalid_request("model must not be empty").into());
    }

    let origin = request
        .origin
        .unwrap_or_else(|| state.config.server.node_name.clone());
    let max_retries = request
        .max_retries
        .unwrap_or(state.config.queue.replay.max_attempts);

    let mut task = Task::new(origin, request.model, request.payload).with_max_retries(max_retries);
    if let Some(units) = request.resource_hint {
        task = task.with_resource_hint(units);
    }
    if let Some(priority) = request.priority {
        task = task.with_priority(priority);
    }

    debug!(task = %task.id, model = %task.model, "Routing task");
    let outcome = state.router.route(task).await?;
    Ok(Json(outcome))
}

/// Probe every node and refresh the latency cache
pub async fn benchmark(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.router.benchmark().await?;
    Ok(Json(report))
}

/// Aggregate offline queue counts
pub async fn queue_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.queue.status())
}

/// Queued entries in replay order
pub async fn queue_entries(State(state): State<AppState>) -> impl IntoResponse {
    let entries = state.queue.entries();
    Json(json!({
        "total": entries.len(),
        "entries": entries,
    }))
}

/// Remove a queued entry by task id
pub async fn queue_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = TaskId::parse(&id)
        .ok_or_else(|| Error::invalid_request(format!("not a task id: {}", id)))?;

    if !state.queue.remove(&id).await? {
        return Err(Error::not_found(format!("no queued entry for task {}", id)).into());
    }
    Ok(Json(json!({ "removed": id })))
}

/// The audit log of entries dropped after exhausting retries
pub async fn queue_dropped(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let dropped = state.queue.dropped().await?;
    Ok(Json(json!({
        "total": dropped.len(),
        "dropped": dropped,
    })))
}
