//! Priority Escalation Engine.
//!
//! A pure classifier: given how long a card has been sitting in its stage
//! and that stage's yellow/red thresholds, pick the urgency tier. It never
//! touches storage; callers persist a changed tier themselves.

use crate::board::{Priority, Stage, TierLevel};
use crate::card::Card;
use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

// ---------------------------------------------------------------------------
// TierLadder
// ---------------------------------------------------------------------------

/// Configured priorities ranked by their declared `order`.
///
/// Rank 0 is normal, rank 1 warn, rank 2 critical. With fewer than three
/// priorities, warn falls back to rank 0 and critical to the last rank.
#[derive(Debug, Clone, Copy)]
pub struct TierLadder<'a> {
    normal: &'a Priority,
    warn: &'a Priority,
    critical: &'a Priority,
}

impl<'a> TierLadder<'a> {
    /// `None` when no priorities are configured.
    pub fn new(tiers: &'a [Priority]) -> Option<Self> {
        let mut ranked: Vec<&'a Priority> = tiers.iter().collect();
        ranked.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        let normal = *ranked.first()?;
        let warn = ranked.get(1).copied().unwrap_or(normal);
        let critical = ranked.get(2).copied().unwrap_or(ranked[ranked.len() - 1]);
        Some(Self {
            normal,
            warn,
            critical,
        })
    }

    pub fn get(&self, level: TierLevel) -> &'a Priority {
        match level {
            TierLevel::Normal => self.normal,
            TierLevel::Warn => self.warn,
            TierLevel::Critical => self.critical,
        }
    }

    /// The lowest-ranked priority, used for new cards.
    pub fn lowest(&self) -> &'a Priority {
        self.normal
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Fractional days between `entered` and `now`, never negative.
pub fn days_in_stage(entered: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let ms = (now - entered).num_milliseconds().max(0);
    ms as f64 / MILLIS_PER_DAY
}

/// A zero threshold counts as unset, like an absent one.
fn threshold(limit: Option<u32>) -> Option<f64> {
    limit.filter(|&d| d > 0).map(f64::from)
}

/// Red beats yellow beats normal; comparisons are `>=`.
pub fn resolve_level(stage: &Stage, days: f64) -> TierLevel {
    if threshold(stage.red_limit).is_some_and(|red| days >= red) {
        return TierLevel::Critical;
    }
    if threshold(stage.yellow_limit).is_some_and(|yellow| days >= yellow) {
        return TierLevel::Warn;
    }
    TierLevel::Normal
}

/// The priority a card should carry right now. `None` only when no
/// priorities exist at all.
pub fn resolve_priority<'a>(
    card: &Card,
    stage: &Stage,
    tiers: &'a [Priority],
    now: DateTime<Utc>,
) -> Option<&'a Priority> {
    let ladder = TierLadder::new(tiers)?;
    let level = resolve_level(stage, days_in_stage(card.updated_at, now));
    Some(ladder.get(level))
}
