use axum::http::HeaderMap;
use repairdesk_core::lifecycle::Lifecycle;
use repairdesk_core::notify::NotificationChannel;
use repairdesk_core::store::RecordStore;
use std::sync::Arc;

/// Header naming the operator behind a manual change.
pub const ACTOR_HEADER: &str = "x-actor";
pub const DEFAULT_OPERATOR: &str = "operator";

/// Shared application state passed to all route handlers. Constructed once
/// at startup; nothing else holds process-wide state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub channel: Arc<dyn NotificationChannel>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, channel: Arc<dyn NotificationChannel>) -> Self {
        Self { store, channel }
    }

    pub fn lifecycle(&self) -> Lifecycle<'_, dyn RecordStore, dyn NotificationChannel> {
        Lifecycle::new(self.store.as_ref(), self.channel.as_ref())
    }
}

pub fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_OPERATOR)
        .to_string()
}
