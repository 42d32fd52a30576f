use crate::error::{DeskError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw key/value form, as persisted in the Settings Store.
pub type SettingsMap = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

pub const KEY_EXECUTION_DEADLINE_DEFAULT: &str = "executionDeadlineDefault";
pub const KEY_NOTIFICATIONS_ENABLED: &str = "telegramNotificationsEnabled";
pub const KEY_CHAT_ID: &str = "telegramChatId";
pub const KEY_RESPONSIBLE_USER_IDS: &str = "responsibleUserIds";
pub const KEY_REPORT_INTERVAL_HOUR: &str = "reportIntervalHour";
pub const KEY_REPORT_INTERVAL_DAY: &str = "reportIntervalDay";
pub const KEY_REPORT_INTERVAL_WEEK: &str = "reportIntervalWeek";
pub const KEY_DEFAULT_ACTOR: &str = "defaultActor";

pub const DEFAULT_EXECUTION_DEADLINE_DAYS: i64 = 7;
pub const DEFAULT_REPORT_INTERVAL_HOUR: u32 = 60;
pub const DEFAULT_REPORT_INTERVAL_DAY: u32 = 1440;
pub const DEFAULT_REPORT_INTERVAL_WEEK: u32 = 10080;
pub const DEFAULT_ACTOR: &str = "system@telegram.bot";

// ---------------------------------------------------------------------------
// ResponsibleParty
// ---------------------------------------------------------------------------

/// Someone to tag when ingestion fails: a numeric chat user id or a handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsibleParty {
    Id(i64),
    Handle(String),
}

impl fmt::Display for ResponsibleParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponsibleParty::Id(id) => write!(f, "{id}"),
            ResponsibleParty::Handle(h) => write!(f, "@{}", h.trim_start_matches('@')),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Typed view over the settings map. Parsing is lenient: a value that
/// does not parse falls back to its default and is logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub execution_deadline_days: i64,
    pub notifications_enabled: bool,
    pub chat_id: Option<String>,
    pub responsible: Vec<ResponsibleParty>,
    pub report_interval_hour: u32,
    pub report_interval_day: u32,
    pub report_interval_week: u32,
    pub default_actor: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            execution_deadline_days: DEFAULT_EXECUTION_DEADLINE_DAYS,
            notifications_enabled: true,
            chat_id: None,
            responsible: Vec::new(),
            report_interval_hour: DEFAULT_REPORT_INTERVAL_HOUR,
            report_interval_day: DEFAULT_REPORT_INTERVAL_DAY,
            report_interval_week: DEFAULT_REPORT_INTERVAL_WEEK,
            default_actor: Some(DEFAULT_ACTOR.to_string()),
        }
    }
}

impl Settings {
    pub fn from_map(map: &SettingsMap) -> Self {
        let d = Self::default();
        Self {
            execution_deadline_days: number_or(
                map,
                KEY_EXECUTION_DEADLINE_DEFAULT,
                d.execution_deadline_days,
            ),
            notifications_enabled: map
                .get(KEY_NOTIFICATIONS_ENABLED)
                .map(|v| v.trim() == "true")
                .unwrap_or(d.notifications_enabled),
            chat_id: non_empty(map, KEY_CHAT_ID),
            responsible: responsible_from(map),
            report_interval_hour: positive_or(
                map,
                KEY_REPORT_INTERVAL_HOUR,
                d.report_interval_hour,
            ),
            report_interval_day: positive_or(map, KEY_REPORT_INTERVAL_DAY, d.report_interval_day),
            report_interval_week: positive_or(
                map,
                KEY_REPORT_INTERVAL_WEEK,
                d.report_interval_week,
            ),
            // An explicitly blank actor means "not configured".
            default_actor: match map.get(KEY_DEFAULT_ACTOR) {
                Some(v) if v.trim().is_empty() => None,
                Some(v) => Some(v.trim().to_string()),
                None => d.default_actor,
            },
        }
    }

    /// Target for lifecycle notifications, `None` when they are switched off.
    pub fn notification_target(&self) -> Option<&str> {
        if !self.notifications_enabled {
            return None;
        }
        self.chat_id.as_deref()
    }
}

/// The map written by `repairdesk init`.
pub fn default_map() -> SettingsMap {
    let mut m = SettingsMap::new();
    m.insert(
        KEY_EXECUTION_DEADLINE_DEFAULT.to_string(),
        DEFAULT_EXECUTION_DEADLINE_DAYS.to_string(),
    );
    m.insert(KEY_NOTIFICATIONS_ENABLED.to_string(), "true".to_string());
    m.insert(KEY_CHAT_ID.to_string(), String::new());
    m.insert(KEY_RESPONSIBLE_USER_IDS.to_string(), "[]".to_string());
    m.insert(
        KEY_REPORT_INTERVAL_HOUR.to_string(),
        DEFAULT_REPORT_INTERVAL_HOUR.to_string(),
    );
    m.insert(
        KEY_REPORT_INTERVAL_DAY.to_string(),
        DEFAULT_REPORT_INTERVAL_DAY.to_string(),
    );
    m.insert(
        KEY_REPORT_INTERVAL_WEEK.to_string(),
        DEFAULT_REPORT_INTERVAL_WEEK.to_string(),
    );
    m.insert(KEY_DEFAULT_ACTOR.to_string(), DEFAULT_ACTOR.to_string());
    m
}

/// Reject values the typed view would silently replace with a default.
/// Unknown keys are stored as-is.
pub fn validate(key: &str, value: &str) -> Result<()> {
    let v = value.trim();
    let ok = match key {
        KEY_EXECUTION_DEADLINE_DEFAULT => v.parse::<i64>().is_ok_and(|n| n >= 0),
        KEY_NOTIFICATIONS_ENABLED => v == "true" || v == "false",
        KEY_RESPONSIBLE_USER_IDS => {
            v.is_empty() || serde_json::from_str::<Vec<ResponsibleParty>>(v).is_ok()
        }
        KEY_REPORT_INTERVAL_HOUR | KEY_REPORT_INTERVAL_DAY | KEY_REPORT_INTERVAL_WEEK => {
            v.parse::<u32>().is_ok_and(|n| n > 0)
        }
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(DeskError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Validate every update, then apply them all. Nothing is applied if any
/// value is rejected.
pub fn merge(map: &mut SettingsMap, updates: &SettingsMap) -> Result<()> {
    for (k, v) in updates {
        validate(k, v)?;
    }
    for (k, v) in updates {
        map.insert(k.clone(), v.trim().to_string());
    }
    Ok(())
}

fn non_empty(map: &SettingsMap, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number_or(map: &SettingsMap, key: &str, default: i64) -> i64 {
    match non_empty(map, key) {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "unparseable setting, using default");
            default
        }),
    }
}

fn positive_or(map: &SettingsMap, key: &str, default: u32) -> u32 {
    match non_empty(map, key) {
        None => default,
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                tracing::warn!(key, value = %v, "interval must be a positive number of minutes, using default");
                default
            }
        },
    }
}

fn responsible_from(map: &SettingsMap) -> Vec<ResponsibleParty> {
    let Some(raw) = non_empty(map, KEY_RESPONSIBLE_USER_IDS) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "responsibleUserIds is not a JSON array of ids/handles");
        Vec::new()
    })
}
