use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One ordered step of the workflow ("column" on the board).
///
/// `yellow_limit` / `red_limit` are dwell-time thresholds in days. `None`
/// (or zero) means cards never reach that tier through time in this stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub name: String,
    pub order: i32,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yellow_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_limit: Option<u32>,
}

fn default_visible() -> bool {
    true
}

impl Stage {
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            order,
            is_visible: true,
            yellow_limit: None,
            red_limit: None,
        }
    }

    pub fn with_limits(mut self, yellow: Option<u32>, red: Option<u32>) -> Self {
        self.yellow_limit = yellow;
        self.red_limit = red;
        self
    }
}

/// Sort stages into pipeline order. Ties keep their stored order.
pub fn sort_stages(stages: &mut [Stage]) {
    stages.sort_by_key(|s| s.order);
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Priority {
    pub id: String,
    pub name: String,
    pub color: String,
    pub order: i32,
}

impl Priority {
    pub fn new(name: impl Into<String>, color: impl Into<String>, order: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            color: color.into(),
            order,
        }
    }
}

// ---------------------------------------------------------------------------
// TierLevel
// ---------------------------------------------------------------------------

/// The three urgency levels the escalation engine reasons about. They map
/// onto configured priorities by rank, see [`crate::escalation::TierLadder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLevel {
    Normal,
    Warn,
    Critical,
}

impl TierLevel {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TierLevel::Normal => "normal",
            TierLevel::Warn => "warn",
            TierLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
