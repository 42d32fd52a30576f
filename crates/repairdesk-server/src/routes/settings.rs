use axum::extract::State;
use axum::Json;
use repairdesk_core::settings::{self, SettingsMap};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/settings: raw key/values plus the typed view the engine uses.
pub async fn get_settings(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let map = app.store.settings_map()?;
        let typed = settings::Settings::from_map(&map);
        Ok::<_, repairdesk_core::DeskError>(serde_json::json!({
            "values": map,
            "effective": typed,
        }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}

/// PUT /api/settings: merge string key/values. All-or-nothing.
pub async fn put_settings(
    State(app): State<AppState>,
    Json(updates): Json<SettingsMap>,
) -> Result<Json<serde_json::Value>, AppError> {
    let result = tokio::task::spawn_blocking(move || {
        let mut map = app.store.settings_map()?;
        settings::merge(&mut map, &updates)?;
        app.store.save_settings_map(&map)?;
        tracing::info!(keys = ?updates.keys().collect::<Vec<_>>(), "settings updated");
        Ok::<_, repairdesk_core::DeskError>(serde_json::json!({ "values": map }))
    })
    .await
    .map_err(AppError::join)??;

    Ok(Json(result))
}
