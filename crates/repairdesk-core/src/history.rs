use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// HistoryAction
// ---------------------------------------------------------------------------

/// The audit labels. The Russian strings are the stored and displayed form;
/// report aggregation matches on [`HistoryAction::Moved`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    #[serde(rename = "Создана карточка")]
    Created,
    #[serde(rename = "Перемещена карточка")]
    Moved,
    #[serde(rename = "Изменен приоритет")]
    PriorityChanged,
    #[serde(rename = "Обновлена карточка")]
    Updated,
    #[serde(rename = "Закрыта карточка")]
    Closed,
}

impl HistoryAction {
    pub fn label(self) -> &'static str {
        match self {
            HistoryAction::Created => "Создана карточка",
            HistoryAction::Moved => "Перемещена карточка",
            HistoryAction::PriorityChanged => "Изменен приоритет",
            HistoryAction::Updated => "Обновлена карточка",
            HistoryAction::Closed => "Закрыта карточка",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// CardHistory
// ---------------------------------------------------------------------------

/// Immutable audit record. `actor` is `None` for system-originated entries
/// such as time-based escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardHistory {
    pub id: String,
    pub card_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_stage_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_priority_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_priority_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CardHistory {
    pub fn new(
        card_id: impl Into<String>,
        actor: Option<String>,
        action: HistoryAction,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            card_id: card_id.into(),
            actor,
            action,
            old_stage_id: None,
            new_stage_id: None,
            old_priority_id: None,
            new_priority_id: None,
            created_at: now,
        }
    }

    pub fn stages(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_stage_id = old;
        self.new_stage_id = new;
        self
    }

    pub fn priorities(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_priority_id = old;
        self.new_priority_id = new;
        self
    }

    /// True for a move into `stage_id` recorded within `(start, end]`.
    /// Back-to-back windows sharing a boundary count each move once.
    pub fn is_move_into(&self, stage_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.action == HistoryAction::Moved
            && self.new_stage_id.as_deref() == Some(stage_id)
            && self.created_at > start
            && self.created_at <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn action_serializes_as_russian_label() {
        let json = serde_json::to_string(&HistoryAction::Moved).unwrap();
        assert_eq!(json, "\"Перемещена карточка\"");
        let back: HistoryAction = serde_json::from_str("\"Закрыта карточка\"").unwrap();
        assert_eq!(back, HistoryAction::Closed);
    }

    #[test]
    fn move_window_is_open_at_start_closed_at_end() {
        let t0 = Utc::now();
        let entry = CardHistory::new("c1", None, HistoryAction::Moved, t0)
            .stages(Some("a".into()), Some("b".into()));
        assert!(entry.is_move_into("b", t0 - Duration::minutes(5), t0));
        assert!(!entry.is_move_into("b", t0, t0 + Duration::minutes(5)));
        assert!(entry.is_move_into("b", t0 - Duration::minutes(5), t0 + Duration::minutes(5)));
        assert!(!entry.is_move_into("a", t0 - Duration::minutes(5), t0));
        assert!(!entry.is_move_into("b", t0 + Duration::seconds(1), t0 + Duration::minutes(1)));
    }

    #[test]
    fn only_moves_count() {
        let t0 = Utc::now();
        let entry = CardHistory::new("c1", None, HistoryAction::PriorityChanged, t0)
            .stages(Some("a".into()), Some("b".into()));
        assert!(!entry.is_move_into("b", t0 - Duration::minutes(5), t0));
    }
}
