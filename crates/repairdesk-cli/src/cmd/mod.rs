pub mod card;
pub mod init;
pub mod parse;
pub mod report;
pub mod serve;
pub mod settings;
pub mod stage;
pub mod webhook;

use anyhow::Context;
use clap::Args;
use repairdesk_core::notify::{LogChannel, NotificationChannel};
use repairdesk_core::store::FileStore;
use repairdesk_telegram::{TelegramClient, TelegramConfig};
use std::path::Path;
use std::sync::Arc;

/// Telegram connection flags shared by every command that talks to the chat.
#[derive(Args, Clone, Default)]
pub struct ChannelArgs {
    /// Bot token; without it notifications are only logged
    #[arg(long, global = true, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Bot API base URL
    #[arg(long, global = true, env = "TELEGRAM_API_BASE")]
    pub telegram_api_base: Option<String>,
}

impl ChannelArgs {
    /// A Telegram client, or an error naming the missing flag.
    pub fn client(&self) -> anyhow::Result<TelegramClient> {
        let token = self
            .telegram_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .context("a bot token is required: pass --telegram-token or set TELEGRAM_BOT_TOKEN")?;
        let mut config = TelegramConfig::new(token);
        if let Some(base) = self.telegram_api_base.as_deref() {
            config = config.with_api_base(base);
        }
        TelegramClient::new(config).context("failed to build Telegram client")
    }

    /// The Telegram client when a token is configured, else a channel that
    /// only logs.
    pub fn channel(&self) -> anyhow::Result<Arc<dyn NotificationChannel>> {
        if self.telegram_token.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            Ok(Arc::new(self.client()?))
        } else {
            tracing::warn!("no bot token configured, notifications will only be logged");
            Ok(Arc::new(LogChannel))
        }
    }
}

pub fn open_store(root: &Path) -> anyhow::Result<FileStore> {
    FileStore::open(root).with_context(|| {
        format!(
            "no data directory under {} (run `repairdesk init`)",
            root.display()
        )
    })
}
