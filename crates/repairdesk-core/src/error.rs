use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("not initialized: run 'repairdesk init'")]
    NotInitialized,

    #[error("card not found: {0}")]
    CardNotFound(String),

    #[error("stage not found: {0}")]
    StageNotFound(String),

    #[error("priority not found: {0}")]
    PriorityNotFound(String),

    #[error("card is closed: {0}")]
    CardClosed(String),

    #[error("card already closed: {0}")]
    AlreadyClosed(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("stage {id} still holds {active} active card(s)")]
    StageInUse { id: String, active: usize },

    #[error("invalid board change: {0}")]
    InvalidBoard(String),

    #[error("no stages configured")]
    NoStages,

    #[error("no priorities configured")]
    NoPriorities,

    #[error("invalid value for setting '{key}': {value}")]
    InvalidSetting { key: String, value: String },

    #[error("notification channel error: {0}")]
    Channel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DeskError>;
