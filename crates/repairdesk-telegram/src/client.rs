//! Blocking Bot API client.
//!
//! Every method is `POST {api_base}/bot{token}/{method}` with a JSON body.
//! A reply whose envelope says `ok: false` is an error even when the HTTP
//! status is 200.

use crate::error::TelegramError;
use crate::types::{ApiResponse, WebhookInfo};
use crate::Result;
use repairdesk_core::notify::{tagged_failure_text, NotificationChannel};
use repairdesk_core::settings::ResponsibleParty;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const ACK_EMOJI: &str = "👍";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub timeout: Duration,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token: bot_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

pub struct TelegramClient {
    config: TelegramConfig,
    http: reqwest::blocking::Client,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(TelegramError::MissingToken);
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| TelegramError::Http {
                method: "client".into(),
                source,
            })?;
        Ok(Self { config, http })
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Call a Bot API method and return its `result`.
    pub fn call<T: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<T> {
        let http_err = |source| TelegramError::Http {
            method: method.to_string(),
            source,
        };
        let resp = self
            .http
            .post(self.url(method))
            .json(params)
            .send()
            .map_err(http_err)?;
        let status = resp.status();
        let body = resp.text().map_err(http_err)?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(TelegramError::Api {
                    method: method.to_string(),
                    description: status.to_string(),
                })
            }
            Err(source) => {
                return Err(TelegramError::Decode {
                    method: method.to_string(),
                    source,
                })
            }
        };
        if !envelope.ok || !status.is_success() {
            return Err(TelegramError::Api {
                method: method.to_string(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        envelope.result.ok_or_else(|| TelegramError::Api {
            method: method.to_string(),
            description: "response has no result".to_string(),
        })
    }

    // ─── Methods ──────────────────────────────────────────────────────────

    pub fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        self.call::<Value>(
            "sendMessage",
            &json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" }),
        )?;
        Ok(())
    }

    pub fn set_message_reaction(&self, chat_id: &str, message_id: i64, emoji: &str) -> Result<()> {
        self.call::<Value>(
            "setMessageReaction",
            &json!({
                "chat_id": chat_id,
                "message_id": message_id,
                "reaction": [{ "type": "emoji", "emoji": emoji }],
            }),
        )?;
        Ok(())
    }

    /// React with 👍; when reactions are unavailable, reply with 👍
    /// instead. The reaction error is still returned after a fallback.
    pub fn like_message(&self, chat_id: &str, message_id: i64) -> Result<()> {
        let Err(e) = self.set_message_reaction(chat_id, message_id, ACK_EMOJI) else {
            return Ok(());
        };
        tracing::warn!(chat_id, message_id, error = %e, "reaction failed, replying instead");
        if let Err(fallback) = self.call::<Value>(
            "sendMessage",
            &json!({ "chat_id": chat_id, "text": ACK_EMOJI, "reply_to_message_id": message_id }),
        ) {
            tracing::error!(chat_id, message_id, error = %fallback, "fallback reply failed");
        }
        Err(e)
    }

    pub fn send_error_with_tags(
        &self,
        chat_id: &str,
        message_id: i64,
        reason: &str,
        responsible: &[ResponsibleParty],
    ) -> Result<()> {
        self.call::<Value>(
            "sendMessage",
            &json!({
                "chat_id": chat_id,
                "text": tagged_failure_text(reason, responsible),
                "parse_mode": "HTML",
                "reply_to_message_id": message_id,
            }),
        )?;
        Ok(())
    }

    pub fn set_webhook(&self, url: &str) -> Result<()> {
        self.call::<bool>("setWebhook", &json!({ "url": url }))?;
        Ok(())
    }

    pub fn get_webhook_info(&self) -> Result<WebhookInfo> {
        self.call("getWebhookInfo", &json!({}))
    }
}

impl NotificationChannel for TelegramClient {
    fn send(&self, target: &str, text: &str) -> repairdesk_core::Result<()> {
        Ok(self.send_message(target, text)?)
    }

    fn acknowledge(&self, target: &str, message_id: i64) -> repairdesk_core::Result<()> {
        Ok(self.like_message(target, message_id)?)
    }

    fn send_tagged(
        &self,
        target: &str,
        message_id: i64,
        text: &str,
        responsible: &[ResponsibleParty],
    ) -> repairdesk_core::Result<()> {
        Ok(self.send_error_with_tags(target, message_id, text, responsible)?)
    }
}
