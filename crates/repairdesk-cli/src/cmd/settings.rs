use super::open_store;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use repairdesk_core::settings::{self, Settings, SettingsMap};
use repairdesk_core::store::RecordStore;
use std::path::Path;

#[derive(Subcommand)]
pub enum SettingsSubcommand {
    /// Show every stored setting
    List,
    /// Print one setting
    Get { key: String },
    /// Change one setting
    Set {
        key: String,
        /// Chat ids are negative, so leading hyphens are accepted
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

pub fn run(root: &Path, subcmd: SettingsSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    match subcmd {
        SettingsSubcommand::List => {
            let map = store.settings_map()?;
            if json {
                return print_json(&serde_json::json!({
                    "values": map,
                    "effective": Settings::from_map(&map),
                }));
            }
            let rows = map.into_iter().map(|(k, v)| vec![k, v]).collect();
            print_table(&["KEY", "VALUE"], rows);
            Ok(())
        }
        SettingsSubcommand::Get { key } => {
            let map = store.settings_map()?;
            let value = map
                .get(&key)
                .with_context(|| format!("setting '{key}' is not set"))?;
            if json {
                print_json(&serde_json::json!({ "key": key, "value": value }))?;
            } else {
                println!("{value}");
            }
            Ok(())
        }
        SettingsSubcommand::Set { key, value } => {
            let mut map = store.settings_map()?;
            let update = SettingsMap::from([(key.clone(), value)]);
            settings::merge(&mut map, &update)?;
            store.save_settings_map(&map)?;
            let stored = map.get(&key).cloned().unwrap_or_default();
            if json {
                print_json(&serde_json::json!({ "key": key, "value": stored }))?;
            } else {
                println!("{key} = {stored}");
            }
            Ok(())
        }
    }
}
