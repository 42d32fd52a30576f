//! Report Scheduler.
//!
//! One schedule per cadence, owned by a single [`ReportScheduler`] that the
//! caller ticks on a fixed clock. Windows are `[last_sent, now]`, and
//! `last_sent` only advances after a successful send, so consecutive
//! reports tile time without gaps or overlap.

use crate::notify::NotificationChannel;
use crate::report;
use crate::settings::Settings;
use crate::store::RecordStore;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hour,
    Day,
    Week,
}

impl Cadence {
    pub fn all() -> [Cadence; 3] {
        [Cadence::Hour, Cadence::Day, Cadence::Week]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Hour => "hour",
            Cadence::Day => "day",
            Cadence::Week => "week",
        }
    }

    /// Configured interval in minutes.
    pub fn interval(self, settings: &Settings) -> u32 {
        match self {
            Cadence::Hour => settings.report_interval_hour,
            Cadence::Day => settings.report_interval_day,
            Cadence::Week => settings.report_interval_week,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ReportSchedule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSchedule {
    pub cadence: Cadence,
    pub target: String,
    pub interval_minutes: u32,
    pub last_sent: Option<DateTime<Utc>>,
}

impl ReportSchedule {
    /// Never-sent schedules are due immediately.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => (now - last).num_minutes() >= i64::from(self.interval_minutes),
        }
    }

    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self
            .last_sent
            .unwrap_or_else(|| now - Duration::minutes(i64::from(self.interval_minutes)));
        (start, now)
    }
}

// ---------------------------------------------------------------------------
// ReportScheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReportScheduler {
    schedules: BTreeMap<Cadence, ReportSchedule>,
}

impl ReportScheduler {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut s = Self::default();
        s.sync_with(settings);
        s
    }

    /// Re-read targets and intervals. Each cadence keeps its `last_sent`.
    /// Without a report target there are no schedules at all.
    pub fn sync_with(&mut self, settings: &Settings) {
        let Some(target) = settings.chat_id.as_deref() else {
            if !self.schedules.is_empty() {
                tracing::info!("report target cleared, schedules dropped");
            }
            self.schedules.clear();
            return;
        };
        for cadence in Cadence::all() {
            let interval_minutes = cadence.interval(settings);
            let last_sent = self.schedules.get(&cadence).and_then(|s| s.last_sent);
            self.schedules.insert(
                cadence,
                ReportSchedule {
                    cadence,
                    target: target.to_string(),
                    interval_minutes,
                    last_sent,
                },
            );
        }
    }

    pub fn schedules(&self) -> impl Iterator<Item = &ReportSchedule> {
        self.schedules.values()
    }

    pub fn get(&self, cadence: Cadence) -> Option<&ReportSchedule> {
        self.schedules.get(&cadence)
    }

    /// Send every due report. Returns the cadences that went out; failures
    /// are logged and retried on a later tick.
    pub fn tick<S, N>(&mut self, now: DateTime<Utc>, store: &S, channel: &N) -> Vec<Cadence>
    where
        S: RecordStore + ?Sized,
        N: NotificationChannel + ?Sized,
    {
        let mut sent = Vec::new();
        for schedule in self.schedules.values_mut() {
            if !schedule.is_due(now) {
                continue;
            }
            let (start, end) = schedule.window(now);
            match report::send_report(store, channel, &schedule.target, start, end) {
                Ok(()) => {
                    schedule.last_sent = Some(end);
                    tracing::info!(cadence = %schedule.cadence, chat_id = %schedule.target, "report sent");
                    sent.push(schedule.cadence);
                }
                Err(e) => {
                    tracing::error!(cadence = %schedule.cadence, chat_id = %schedule.target, error = %e, "report failed");
                }
            }
        }
        sent
    }

    /// Treat every schedule due at `now` as sent without sending it. Used
    /// when a tick died partway and some of its reports may already be out.
    pub fn skip_due(&mut self, now: DateTime<Utc>) -> Vec<Cadence> {
        let mut skipped = Vec::new();
        for schedule in self.schedules.values_mut() {
            if schedule.is_due(now) {
                schedule.last_sent = Some(now);
                skipped.push(schedule.cadence);
            }
        }
        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Stage;
    use crate::notify::MemoryChannel;
    use crate::store::FileStore;
    use tempfile::TempDir;

    fn settings(chat: Option<&str>) -> Settings {
        Settings {
            chat_id: chat.map(str::to_string),
            ..Settings::default()
        }
    }

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        store.save_stages(&[Stage::new("A", 1)]).unwrap();
        (dir, store)
    }

    #[test]
    fn no_target_no_schedules() {
        let s = ReportScheduler::from_settings(&settings(None));
        assert_eq!(s.schedules().count(), 0);
    }

    #[test]
    fn hourly_scenario() {
        let (_dir, store) = store();
        let ch = MemoryChannel::new();
        let mut s = ReportScheduler::from_settings(&settings(Some("-100")));
        let t0 = Utc::now();

        assert_eq!(s.tick(t0, &store, &ch), Cadence::all().to_vec());
        assert_eq!(s.get(Cadence::Hour).unwrap().last_sent, Some(t0));

        assert!(s.tick(t0 + Duration::minutes(59), &store, &ch).is_empty());

        let t1 = t0 + Duration::minutes(61);
        assert_eq!(s.tick(t1, &store, &ch), vec![Cadence::Hour]);
        let hour = s.get(Cadence::Hour).unwrap();
        assert_eq!(hour.last_sent, Some(t1));

        let msgs = ch.messages();
        assert_eq!(msgs.len(), 4);
        assert!(msgs[3].contains("за период 1 час"));
    }

    #[test]
    fn skipped_schedules_wait_a_full_interval() {
        let (_dir, store) = store();
        let ch = MemoryChannel::new();
        let mut s = ReportScheduler::from_settings(&settings(Some("-100")));
        let t0 = Utc::now();

        assert_eq!(s.skip_due(t0), Cadence::all().to_vec());
        assert!(s.skip_due(t0).is_empty());
        assert!(s.tick(t0 + Duration::minutes(30), &store, &ch).is_empty());
        assert!(ch.messages().is_empty());

        assert_eq!(s.tick(t0 + Duration::minutes(60), &store, &ch), vec![Cadence::Hour]);
        let (start, _) = s.get(Cadence::Day).unwrap().window(t0 + Duration::minutes(90));
        assert_eq!(start, t0);
    }

    #[test]
    fn first_window_looks_back_one_interval() {
        let s = ReportSchedule {
            cadence: Cadence::Day,
            target: "t".into(),
            interval_minutes: 1440,
            last_sent: None,
        };
        let now = Utc::now();
        assert_eq!(s.window(now), (now - Duration::days(1), now));
    }

    #[test]
    fn windows_tile_without_gaps() {
        let (_dir, store) = store();
        let ch = MemoryChannel::new();
        let mut s = ReportScheduler::from_settings(&settings(Some("-100")));
        let t0 = Utc::now();
        let mut previous_end = None;
        for minute in (0..400).step_by(7) {
            let now = t0 + Duration::minutes(minute);
            let before = s.get(Cadence::Hour).unwrap().clone();
            if before.is_due(now) {
                let (start, _) = before.window(now);
                if let Some(prev) = previous_end {
                    assert_eq!(start, prev);
                }
            }
            s.tick(now, &store, &ch);
            let after = s.get(Cadence::Hour).unwrap();
            if after.last_sent != before.last_sent {
                previous_end = after.last_sent;
            }
        }
        assert!(previous_end.is_some());
    }

    #[test]
    fn failed_send_keeps_last_sent() {
        let (_dir, store) = store();
        let ch = MemoryChannel::failing();
        let mut s = ReportScheduler::from_settings(&settings(Some("-100")));
        let t0 = Utc::now();
        assert!(s.tick(t0, &store, &ch).is_empty());
        assert_eq!(s.get(Cadence::Hour).unwrap().last_sent, None);

        ch.set_failing(false);
        assert_eq!(s.tick(t0 + Duration::minutes(1), &store, &ch).len(), 3);
    }

    #[test]
    fn resync_keeps_progress_and_picks_up_intervals() {
        let (_dir, store) = store();
        let ch = MemoryChannel::new();
        let mut s = ReportScheduler::from_settings(&settings(Some("-100")));
        let t0 = Utc::now();
        s.tick(t0, &store, &ch);

        let mut changed = settings(Some("-200"));
        changed.report_interval_hour = 30;
        s.sync_with(&changed);
        let hour = s.get(Cadence::Hour).unwrap();
        assert_eq!(hour.last_sent, Some(t0));
        assert_eq!(hour.interval_minutes, 30);
        assert_eq!(hour.target, "-200");
        assert_eq!(s.tick(t0 + Duration::minutes(31), &store, &ch), vec![Cadence::Hour]);

        s.sync_with(&settings(None));
        assert!(s.get(Cadence::Hour).is_none());
    }
}
