use axum::extract::{Path, State};
use axum::Json;
use repairdesk_core::columns::{self, NewPriority, NewStage, StageOrder, StagePatch};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/columns: workflow stages in pipeline order.
pub async fn list_columns(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let stages = app.store.list_stages()?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(stages)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// GET /api/priorities: tiers in declared order.
pub async fn list_priorities(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let priorities = app.store.list_priorities()?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(priorities)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// POST /api/columns: add a stage.
pub async fn create_column(
    State(app): State<AppState>,
    Json(body): Json<NewStage>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let stage = columns::create_stage(app.store.as_ref(), body)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(stage)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// PATCH /api/columns/{id}: rename, reorder, hide or re-limit a stage.
pub async fn update_column(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<StagePatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let stage = columns::update_stage(app.store.as_ref(), &id, patch)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(stage)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// DELETE /api/columns/{id}: 409 while active cards remain in it.
pub async fn delete_column(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let removed = columns::delete_stage(app.store.as_ref(), &id)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::json!({
            "success": true,
            "id": removed.id,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct ReorderBody {
    pub columns: Vec<StageOrder>,
}

/// POST /api/columns/reorder: `{"columns": [{"id", "order"}, ...]}`.
pub async fn reorder_columns(
    State(app): State<AppState>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    if body.columns.is_empty() {
        return Err(AppError::bad_request("columns must not be empty"));
    }
    let result = tokio::task::spawn_blocking(move || {
        let stages = columns::reorder_stages(app.store.as_ref(), &body.columns)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(stages)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// POST /api/priorities: add a priority tier.
pub async fn create_priority(
    State(app): State<AppState>,
    Json(body): Json<NewPriority>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let priority = columns::create_priority(app.store.as_ref(), body)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(priority)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
