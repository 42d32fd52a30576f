use axum::extract::State;
use axum::Json;
use chrono::Utc;
use repairdesk_core::lifecycle::IngestOutcome;
use repairdesk_telegram::{Update, UpdateKind};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/telegram/webhook: health check for the webhook endpoint.
pub async fn webhook_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "message": "Telegram webhook endpoint is active",
        "timestamp": Utc::now(),
    }))
}

/// POST /api/telegram/webhook: ingest a chat message as a card.
///
/// Rejections are answered in the chat and reported with `success: false`
/// and a 200 status so Telegram does not redeliver. Only storage failures
/// produce an error status.
pub async fn webhook(
    State(app): State<AppState>,
    Json(update): Json<Update>,
) -> Result<Json<serde_json::Value>, AppError> {
    let inbound = match update.classify() {
        UpdateKind::Ingest(m) => m,
        UpdateKind::Edited => {
            tracing::debug!(update_id = update.update_id, "edited message ignored");
            return Ok(Json(serde_json::json!({
                "success": false,
                "error": "edited messages are not processed",
            })));
        }
        UpdateKind::NoText => {
            tracing::debug!(update_id = update.update_id, "update without text ignored");
            return Ok(Json(serde_json::json!({
                "success": false,
                "error": "no text message found",
            })));
        }
    };

    tracing::info!(
        chat_id = %inbound.chat_id,
        message_id = inbound.message_id,
        len = inbound.text.len(),
        "webhook message received"
    );

    let outcome = tokio::task::spawn_blocking(move || app.lifecycle().ingest(&inbound, Utc::now()))
        .await
        .map_err(AppError::join)??;

    let body = match outcome {
        IngestOutcome::Created(card) => serde_json::json!({
            "success": true,
            "card_id": card.id,
        }),
        IngestOutcome::Rejected(failure) => serde_json::json!({
            "success": false,
            "error": failure.code(),
            "detail": failure,
        }),
    };
    Ok(Json(body))
}
