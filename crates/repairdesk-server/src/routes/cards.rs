use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use repairdesk_core::card::{CardFields, CardPatch};
use repairdesk_core::lifecycle::CardFilter;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::{actor_from, AppState};

#[derive(Deserialize, Default)]
pub struct ListParams {
    #[serde(default)]
    pub filter: CardFilter,
}

/// GET /api/cards: list cards, re-classifying active ones on the way.
pub async fn list_cards(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let cards = app.lifecycle().list_cards(params.filter, Utc::now())?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(cards)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// GET /api/cards/{id}
pub async fn get_card(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let card = app.lifecycle().get(&id, Utc::now())?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(card)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct CreateCardBody {
    #[serde(flatten)]
    pub fields: CardFields,
    #[serde(default)]
    pub stage_id: Option<String>,
}

/// POST /api/cards: manual card creation.
pub async fn create_card(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateCardBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let f = &body.fields;
    if [&f.instruments, &f.delivery_address, &f.contacts, &f.organization]
        .iter()
        .any(|v| v.trim().is_empty())
    {
        return Err(AppError::bad_request(
            "instruments, delivery_address, contacts and organization are required",
        ));
    }
    let actor = actor_from(&headers);
    let result = tokio::task::spawn_blocking(move || {
        let card = app.lifecycle().create_card(
            body.fields,
            body.stage_id.as_deref(),
            &actor,
            Utc::now(),
        )?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(card)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// PATCH /api/cards/{id}: edit fields and/or move to another stage.
pub async fn update_card(
    State(app): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<CardPatch>,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = actor_from(&headers);
    let result = tokio::task::spawn_blocking(move || {
        let card = app.lifecycle().update(&id, &patch, &actor, Utc::now())?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(card)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct MoveBody {
    pub stage_id: String,
}

/// POST /api/cards/{id}/move
pub async fn move_card(
    State(app): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<MoveBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = actor_from(&headers);
    let result = tokio::task::spawn_blocking(move || {
        let card = app
            .lifecycle()
            .move_card(&id, &body.stage_id, &actor, Utc::now())?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(card)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

#[derive(Deserialize, Default)]
pub struct CloseBody {
    #[serde(default)]
    pub comment: Option<String>,
}

/// POST /api/cards/{id}/close
pub async fn close_card(
    State(app): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let actor = actor_from(&headers);
    // The body is optional: an empty POST closes without a comment.
    let comment = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<CloseBody>(&body)
            .map_err(|e| AppError::bad_request(format!("invalid close body: {e}")))?
            .comment
    };
    let result = tokio::task::spawn_blocking(move || {
        let card = app
            .lifecycle()
            .close(&id, comment.as_deref(), &actor, Utc::now())?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(card)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// GET /api/cards/{id}/history
pub async fn card_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let entries = app.lifecycle().history(&id)?;
        Ok::<_, repairdesk_core::DeskError>(serde_json::to_value(entries)?)
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
