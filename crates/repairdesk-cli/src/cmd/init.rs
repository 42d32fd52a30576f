use crate::output::print_json;
use anyhow::Context;
use repairdesk_core::{paths, seed};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (_, report) = seed::init(root)
        .with_context(|| format!("failed to initialize {}", root.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": report,
        }));
    }

    println!("Initializing repairdesk in: {}", root.display());
    for (file, created) in [
        (paths::STAGES_FILE, report.stages),
        (paths::PRIORITIES_FILE, report.priorities),
        (paths::SETTINGS_FILE, report.settings),
    ] {
        if created {
            println!("  created: {file}");
        } else {
            println!("  exists:  {file}");
        }
    }
    println!("\nSet the report chat with:");
    println!("  repairdesk settings set telegramChatId <chat id>");
    Ok(())
}
