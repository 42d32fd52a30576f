use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("TELEGRAM_BOT_TOKEN is not set")]
    MissingToken,

    #[error("HTTP error calling {method}: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Telegram API error in {method}: {description}")]
    Api { method: String, description: String },

    #[error("unexpected response from {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<TelegramError> for repairdesk_core::DeskError {
    fn from(e: TelegramError) -> Self {
        repairdesk_core::DeskError::Channel(e.to_string())
    }
}
