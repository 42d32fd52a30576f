use axum::extract::{Query, State};
use axum::Json;
use chrono::{Duration, Utc};
use repairdesk_core::report;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_MINUTES: i64 = 60;

#[derive(Deserialize, Default)]
pub struct SendReportBody {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub minutes: Option<i64>,
}

fn window_minutes(minutes: Option<i64>) -> Result<i64, AppError> {
    match minutes {
        None => Ok(DEFAULT_MINUTES),
        Some(m) if m > 0 => Ok(m),
        Some(m) => Err(AppError::bad_request(format!(
            "minutes must be positive, got {m}"
        ))),
    }
}

/// POST /api/reports/send: send a report for the last `minutes` now.
/// Without `chat_id` the configured report target is used.
pub async fn send_report(
    State(app): State<AppState>,
    Json(body): Json<SendReportBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let minutes = window_minutes(body.minutes)?;
    let result = tokio::task::spawn_blocking(move || {
        let target = match body.chat_id.filter(|c| !c.trim().is_empty()) {
            Some(c) => c,
            None => match app.store.settings()?.chat_id {
                Some(c) => c,
                None => return Ok(None),
            },
        };
        let end = Utc::now();
        report::send_report(
            app.store.as_ref(),
            app.channel.as_ref(),
            &target,
            end - Duration::minutes(minutes),
            end,
        )?;
        tracing::info!(chat_id = %target, minutes, "manual report sent");
        Ok::<_, repairdesk_core::DeskError>(Some(serde_json::json!({
            "success": true,
            "chat_id": target,
            "period": format!("{minutes} minutes"),
        })))
    })
    .await
    .map_err(AppError::join)??;

    result
        .map(Json)
        .ok_or_else(|| AppError::bad_request("chat_id is required: none given and none configured"))
}

#[derive(Deserialize, Default)]
pub struct PreviewParams {
    #[serde(default)]
    pub minutes: Option<i64>,
}

/// GET /api/reports/preview: render a report without sending it.
pub async fn preview_report(
    State(app): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let minutes = window_minutes(params.minutes)?;
    let result = tokio::task::spawn_blocking(move || {
        let end = Utc::now();
        let start = end - Duration::minutes(minutes);
        let stats = report::collect_stage_stats(app.store.as_ref(), start, end)?;
        let text = report::format_report(&report::format_period(start, end), &stats);
        Ok::<_, repairdesk_core::DeskError>(serde_json::json!({
            "text": text,
            "stages": stats,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
