pub mod error;
pub mod report_loop;
pub mod routes;
pub mod state;

use axum::routing::{get, patch, post};
use axum::Router;
use repairdesk_core::notify::NotificationChannel;
use repairdesk_core::store::FileStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use report_loop::{spawn_report_loop, tick_once};
pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Telegram
        .route(
            "/api/telegram/webhook",
            get(routes::telegram::webhook_health).post(routes::telegram::webhook),
        )
        // Cards
        .route(
            "/api/cards",
            get(routes::cards::list_cards).post(routes::cards::create_card),
        )
        .route(
            "/api/cards/{id}",
            get(routes::cards::get_card).patch(routes::cards::update_card),
        )
        .route("/api/cards/{id}/move", post(routes::cards::move_card))
        .route("/api/cards/{id}/close", post(routes::cards::close_card))
        .route("/api/cards/{id}/history", get(routes::cards::card_history))
        // Board configuration
        .route(
            "/api/columns",
            get(routes::board::list_columns).post(routes::board::create_column),
        )
        .route("/api/columns/reorder", post(routes::board::reorder_columns))
        .route(
            "/api/columns/{id}",
            patch(routes::board::update_column).delete(routes::board::delete_column),
        )
        .route(
            "/api/priorities",
            get(routes::board::list_priorities).post(routes::board::create_priority),
        )
        // Settings
        .route(
            "/api/settings",
            get(routes::settings::get_settings).put(routes::settings::put_settings),
        )
        // Reports
        .route("/api/reports/send", post(routes::reports::send_report))
        .route("/api/reports/preview", get(routes::reports::preview_report))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Everything `serve` needs besides the listener.
pub struct ServeConfig {
    pub root: PathBuf,
    pub port: u16,
    pub report_tick: Duration,
    pub channel: Arc<dyn NotificationChannel>,
}

/// Open the store under `root`, start the report loop and serve the API.
pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let store = FileStore::open(&config.root)?;
    let app_state = AppState::new(Arc::new(store), config.channel);

    let reports = spawn_report_loop(app_state.clone(), config.report_tick);
    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();

    tracing::info!(root = %config.root.display(), "repairdesk listening on http://localhost:{actual_port}");

    let served = axum::serve(listener, app).await;
    reports.abort();
    served?;
    Ok(())
}
