//! Work reports: per-stage counts over a time window, rendered for chat.

use crate::error::Result;
use crate::history::HistoryAction;
use crate::notify::{escape_html, NotificationChannel};
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub stage_id: String,
    pub stage_name: String,
    /// Active cards sitting in the stage now.
    pub remaining: usize,
    /// Moves into the stage recorded inside the window.
    pub moved: usize,
}

/// Stats for every visible stage, in pipeline order. The window is
/// `(start, end]`, so consecutive reports never count a move twice.
pub fn collect_stage_stats<S: RecordStore + ?Sized>(
    store: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<StageStats>> {
    let stages = store.list_stages()?;
    let cards = store.list_cards()?;
    let moves: Vec<_> = store
        .list_history(None)?
        .into_iter()
        .filter(|h| h.action == HistoryAction::Moved)
        .collect();

    Ok(stages
        .into_iter()
        .filter(|s| s.is_visible)
        .map(|s| StageStats {
            remaining: cards
                .iter()
                .filter(|c| !c.is_closed && c.stage_id == s.id)
                .count(),
            moved: moves
                .iter()
                .filter(|h| h.is_move_into(&s.id, start, end))
                .count(),
            stage_id: s.id,
            stage_name: s.name,
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Russian noun agreement: 1 день, 2 дня, 5 дней, 11 дней, 21 день.
pub fn plural_ru<'a>(n: i64, one: &'a str, few: &'a str, many: &'a str) -> &'a str {
    let n = n.abs();
    let (m10, m100) = (n % 10, n % 100);
    if m10 == 1 && m100 != 11 {
        one
    } else if (2..=4).contains(&m10) && !(12..=14).contains(&m100) {
        few
    } else {
        many
    }
}

/// The window length in the largest whole unit that fits: weeks, days,
/// hours, then minutes.
pub fn format_period(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let span = end - start;
    let days = span.num_days();
    if days >= 7 {
        let w = days / 7;
        format!("{w} {}", plural_ru(w, "неделя", "недели", "недель"))
    } else if days >= 1 {
        format!("{days} {}", plural_ru(days, "день", "дня", "дней"))
    } else if span.num_hours() >= 1 {
        let h = span.num_hours();
        format!("{h} {}", plural_ru(h, "час", "часа", "часов"))
    } else {
        let m = span.num_minutes().max(0);
        format!("{m} {}", plural_ru(m, "минута", "минуты", "минут"))
    }
}

pub fn format_report(period: &str, stats: &[StageStats]) -> String {
    let mut msg = format!("📊 <b>Отчет о проделанной работе за период {period}</b>\n\n");
    for s in stats {
        msg.push_str(&format!(
            "\"<b>{}</b>\"\nОсталось: {}\nВыполнено: {}\n\n",
            escape_html(&s.stage_name),
            s.remaining,
            s.moved
        ));
    }
    msg
}

/// Render the report for `(start, end]` without sending it.
pub fn build_report<S: RecordStore + ?Sized>(
    store: &S,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<String> {
    let stats = collect_stage_stats(store, start, end)?;
    Ok(format_report(&format_period(start, end), &stats))
}

/// Build and send. Store and channel errors both propagate; the scheduler
/// decides what a failure means.
pub fn send_report<S, N>(
    store: &S,
    channel: &N,
    target: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<()>
where
    S: RecordStore + ?Sized,
    N: NotificationChannel + ?Sized,
{
    let text = build_report(store, start, end)?;
    channel.send(target, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Stage;
    use crate::card::{Card, CardFields};
    use crate::history::CardHistory;
    use crate::notify::MemoryChannel;
    use crate::store::FileStore;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn plural_forms() {
        let days = |n| plural_ru(n, "день", "дня", "дней");
        assert_eq!(days(1), "день");
        assert_eq!(days(2), "дня");
        assert_eq!(days(4), "дня");
        assert_eq!(days(5), "дней");
        assert_eq!(days(11), "дней");
        assert_eq!(days(12), "дней");
        assert_eq!(days(21), "день");
        assert_eq!(days(22), "дня");
        assert_eq!(days(0), "дней");
    }

    #[test]
    fn period_picks_largest_unit() {
        let t0 = Utc::now();
        assert_eq!(format_period(t0, t0 + Duration::minutes(1)), "1 минута");
        assert_eq!(format_period(t0, t0 + Duration::minutes(61)), "1 час");
        assert_eq!(format_period(t0, t0 + Duration::hours(23)), "23 часа");
        assert_eq!(format_period(t0, t0 + Duration::days(1)), "1 день");
        assert_eq!(format_period(t0, t0 + Duration::days(6)), "6 дней");
        assert_eq!(format_period(t0, t0 + Duration::days(7)), "1 неделя");
        assert_eq!(format_period(t0, t0 + Duration::days(21)), "3 недели");
        assert_eq!(format_period(t0, t0 + Duration::seconds(30)), "0 минут");
    }

    #[test]
    fn report_layout() {
        let stats = vec![StageStats {
            stage_id: "s".into(),
            stage_name: "На ТО".into(),
            remaining: 3,
            moved: 1,
        }];
        assert_eq!(
            format_report("1 час", &stats),
            "📊 <b>Отчет о проделанной работе за период 1 час</b>\n\n\"<b>На ТО</b>\"\nОсталось: 3\nВыполнено: 1\n\n"
        );
    }

    #[test]
    fn stats_count_active_cards_and_windowed_moves() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let a = Stage::new("A", 1);
        let b = Stage::new("B", 2);
        let mut hidden = Stage::new("Hidden", 3);
        hidden.is_visible = false;
        store.save_stages(&[a.clone(), b.clone(), hidden]).unwrap();

        let t0 = Utc::now();
        let open = Card::new(CardFields::default(), &b.id, "p", "x", t0);
        let mut closed = Card::new(CardFields::default(), &b.id, "p", "x", t0);
        closed.is_closed = true;
        store.insert_card(&open).unwrap();
        store.insert_card(&closed).unwrap();

        let moved = |at| {
            CardHistory::new(&open.id, None, HistoryAction::Moved, at)
                .stages(Some(a.id.clone()), Some(b.id.clone()))
        };
        store.append_history(&moved(t0 - Duration::hours(2))).unwrap();
        store.append_history(&moved(t0 - Duration::minutes(30))).unwrap();
        store.append_history(&moved(t0)).unwrap();
        store
            .append_history(
                &CardHistory::new(&open.id, None, HistoryAction::PriorityChanged, t0)
                    .stages(Some(a.id.clone()), Some(b.id.clone())),
            )
            .unwrap();

        let stats = collect_stage_stats(&store, t0 - Duration::hours(1), t0).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!((stats[0].remaining, stats[0].moved), (0, 0));
        assert_eq!((stats[1].remaining, stats[1].moved), (1, 2));
    }

    #[test]
    fn move_on_shared_boundary_counts_in_one_window_only() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let a = Stage::new("A", 1);
        let b = Stage::new("B", 2);
        store.save_stages(&[a.clone(), b.clone()]).unwrap();

        let boundary = Utc::now() - Duration::hours(1);
        store
            .append_history(
                &CardHistory::new("c1", None, HistoryAction::Moved, boundary)
                    .stages(Some(a.id.clone()), Some(b.id.clone())),
            )
            .unwrap();

        let first = collect_stage_stats(&store, boundary - Duration::hours(1), boundary).unwrap();
        let second = collect_stage_stats(&store, boundary, boundary + Duration::hours(1)).unwrap();
        assert_eq!(first[1].moved, 1);
        assert_eq!(second[1].moved, 0);
    }

    #[test]
    fn send_report_goes_to_target() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        store.save_stages(&[Stage::new("A", 1)]).unwrap();
        let ch = MemoryChannel::new();
        let t0 = Utc::now();
        send_report(&store, &ch, "-100", t0 - Duration::hours(1), t0).unwrap();
        let msgs = ch.messages();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("за период 1 час"));
        assert!(msgs[0].contains("\"<b>A</b>\"\nОсталось: 0\nВыполнено: 0"));
    }
}
