use super::ApiResult;
use crate::config::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weir_core::{EngineError, Workflow, WorkflowResult};

/// Register a new workflow
pub async fn register_workflow(
    State(state): State<Arc<AppState>>,
    Json(workflow): Json<Workflow>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    let id = workflow.id.clone();
    state.engine.register(workflow).await?;

    // Return the stored definition with its stamped status/timestamps.
    let stored = state
        .engine
        .get(&id)
        .await
        .ok_or_else(|| EngineError::NotFound(id))?;

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Fetch a registered workflow
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Workflow>> {
    let workflow = state
        .engine
        .get(&id)
        .await
        .ok_or_else(|| EngineError::NotFound(id))?;

    Ok(Json(workflow))
}

/// Delete a workflow and its stored result
pub async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Execute a workflow and return its result once finished
pub async fn execute_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowResult>> {
    // Dropping the handler (client disconnect) cancels the execution.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let result = state.engine.execute(cancel, &id).await?;
    Ok(Json(result))
}

/// Latest stored result for a workflow
pub async fn get_last_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowResult>> {
    let result = state
        .engine
        .last_result(&id)
        .await
        .ok_or_else(|| EngineError::NotFound(id))?;

    Ok(Json(result))
}
