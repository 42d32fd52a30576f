use chrono::Utc;
use repairdesk_core::scheduler::ReportScheduler;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::state::AppState;

/// Run one scheduler pass: re-read settings, then send whatever is due.
///
/// Sending happens on the blocking pool. If that task panics, the schedules
/// from before the pass come back with everything that was due marked as
/// sent, so a half-finished pass is never repeated.
pub async fn tick_once(app: AppState, mut scheduler: ReportScheduler) -> ReportScheduler {
    let store = app.store.clone();
    match tokio::task::spawn_blocking(move || store.settings()).await {
        Ok(Ok(settings)) => scheduler.sync_with(&settings),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "could not read settings, keeping previous schedules")
        }
        Err(e) => tracing::warn!(error = %e, "settings read panicked, keeping previous schedules"),
    }

    let previous = scheduler.clone();
    let now = Utc::now();
    let joined = tokio::task::spawn_blocking(move || {
        let sent = scheduler.tick(now, app.store.as_ref(), app.channel.as_ref());
        if !sent.is_empty() {
            tracing::debug!(?sent, "report tick complete");
        }
        scheduler
    })
    .await;

    match joined {
        Ok(s) => s,
        Err(e) => {
            let mut restored = previous;
            let skipped = restored.skip_due(now);
            tracing::error!(error = %e, ?skipped, "report tick panicked, skipping its window");
            restored
        }
    }
}

/// Drive [`tick_once`] every `every` until the runtime shuts down.
pub fn spawn_report_loop(app: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        let mut scheduler = ReportScheduler::default();
        tracing::info!(every_secs = every.as_secs(), "report loop started");
        loop {
            interval.tick().await;
            scheduler = tick_once(app.clone(), scheduler).await;
        }
    })
}
