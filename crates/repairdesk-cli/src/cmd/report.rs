use super::{open_store, ChannelArgs};
use crate::output::print_json;
use anyhow::Context;
use chrono::{Duration, Utc};
use clap::Subcommand;
use repairdesk_core::report;
use repairdesk_core::store::RecordStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum ReportSubcommand {
    /// Print the report for the last N minutes without sending it
    Preview {
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(i64).range(1..))]
        minutes: i64,
    },
    /// Send the report for the last N minutes now
    Send {
        #[arg(long, default_value = "60", value_parser = clap::value_parser!(i64).range(1..))]
        minutes: i64,
        /// Target chat (default: telegramChatId setting)
        #[arg(long, allow_hyphen_values = true)]
        chat: Option<String>,
    },
}

pub fn run(
    root: &Path,
    subcmd: ReportSubcommand,
    channel: &ChannelArgs,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let end = Utc::now();

    match subcmd {
        ReportSubcommand::Preview { minutes } => {
            let start = end - Duration::minutes(minutes);
            let stats = report::collect_stage_stats(&store, start, end)?;
            if json {
                print_json(&serde_json::json!({
                    "start": start,
                    "end": end,
                    "stages": stats,
                }))?;
            } else {
                print!(
                    "{}",
                    report::format_report(&report::format_period(start, end), &stats)
                );
            }
            Ok(())
        }
        ReportSubcommand::Send { minutes, chat } => {
            let target = match chat {
                Some(c) => c,
                None => store
                    .settings()?
                    .chat_id
                    .context("no target chat: pass --chat or set telegramChatId")?,
            };
            let client = channel.client()?;
            report::send_report(
                &store,
                &client,
                &target,
                end - Duration::minutes(minutes),
                end,
            )
            .with_context(|| format!("failed to send report to {target}"))?;
            if json {
                print_json(&serde_json::json!({ "sent": true, "chat_id": target, "minutes": minutes }))?;
            } else {
                println!("Report for the last {minutes} minutes sent to {target}");
            }
            Ok(())
        }
    }
}
