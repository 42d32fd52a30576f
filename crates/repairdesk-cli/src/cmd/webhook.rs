use super::ChannelArgs;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum WebhookSubcommand {
    /// Point the bot at this server's webhook URL
    Set {
        /// Public URL, normally ending in /api/telegram/webhook
        url: String,
    },
    /// Show the current webhook registration
    Info,
}

pub fn run(subcmd: WebhookSubcommand, channel: &ChannelArgs, json: bool) -> anyhow::Result<()> {
    let client = channel.client()?;
    match subcmd {
        WebhookSubcommand::Set { url } => {
            client
                .set_webhook(&url)
                .with_context(|| format!("failed to set webhook to {url}"))?;
            if json {
                print_json(&serde_json::json!({ "url": url }))?;
            } else {
                println!("Webhook set to {url}");
            }
        }
        WebhookSubcommand::Info => {
            let info = client.get_webhook_info().context("failed to fetch webhook info")?;
            if json {
                print_json(&info)?;
            } else {
                let url = if info.url.is_empty() { "(none)" } else { &info.url };
                println!("URL:              {url}");
                println!("Pending updates:  {}", info.pending_update_count);
                if let Some(msg) = &info.last_error_message {
                    println!("Last error:       {msg}");
                }
            }
        }
    }
    Ok(())
}
