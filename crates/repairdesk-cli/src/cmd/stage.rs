use super::open_store;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use repairdesk_core::board::Stage;
use repairdesk_core::columns::{self, NewPriority, NewStage, StageOrder, StagePatch};
use repairdesk_core::store::RecordStore;
use std::collections::HashSet;
use std::path::Path;

#[derive(Subcommand)]
pub enum StageSubcommand {
    /// List stages in pipeline order
    List,
    /// Add a stage (appended after the last one unless --order is given)
    Add {
        name: String,
        #[arg(long, allow_hyphen_values = true)]
        order: Option<i32>,
        /// Create the stage hidden from reports
        #[arg(long)]
        hidden: bool,
        /// Days in stage before the warn tier
        #[arg(long)]
        yellow: Option<u32>,
        /// Days in stage before the critical tier
        #[arg(long)]
        red: Option<u32>,
    },
    /// Change a stage
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_hyphen_values = true)]
        order: Option<i32>,
        #[arg(long)]
        visible: Option<bool>,
        #[arg(long, conflicts_with = "clear_yellow")]
        yellow: Option<u32>,
        #[arg(long, conflicts_with = "clear_red")]
        red: Option<u32>,
        #[arg(long)]
        clear_yellow: bool,
        #[arg(long)]
        clear_red: bool,
    },
    /// Remove a stage that holds no active cards
    Remove { id: String },
    /// Put the given stages first, in this order; the rest follow unchanged
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum PrioritySubcommand {
    /// List priorities in tier order
    List,
    /// Add a priority (ranked last unless --order is given)
    Add {
        name: String,
        /// Display colour, e.g. "#722ed1"
        #[arg(long)]
        color: String,
        #[arg(long, allow_hyphen_values = true)]
        order: Option<i32>,
    },
}

fn limit(value: Option<u32>) -> String {
    value.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

fn print_stages(stages: &[Stage]) {
    let rows = stages
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.order.to_string(),
                s.name.clone(),
                (if s.is_visible { "yes" } else { "no" }).to_string(),
                limit(s.yellow_limit),
                limit(s.red_limit),
            ]
        })
        .collect();
    print_table(&["ID", "ORDER", "NAME", "VISIBLE", "YELLOW", "RED"], rows);
}

fn print_stage(stage: &Stage, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(stage);
    }
    println!("{verb} stage {} ({})", stage.name, stage.id);
    Ok(())
}

/// Listed ids take orders 1..=n; every other stage keeps its relative
/// position after them.
fn full_order(current: &[Stage], ids: &[String]) -> anyhow::Result<Vec<StageOrder>> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.as_str()) {
            anyhow::bail!("stage {id} is listed twice");
        }
    }
    let rest = current.iter().filter(|s| !seen.contains(s.id.as_str())).map(|s| &s.id);
    Ok(ids
        .iter()
        .chain(rest)
        .zip(1..)
        .map(|(id, order)| StageOrder {
            id: id.clone(),
            order,
        })
        .collect())
}

pub fn run_stage(root: &Path, subcmd: StageSubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    match subcmd {
        StageSubcommand::List => {
            let stages = store.list_stages()?;
            if json {
                return print_json(&stages);
            }
            print_stages(&stages);
            Ok(())
        }
        StageSubcommand::Add {
            name,
            order,
            hidden,
            yellow,
            red,
        } => {
            let stage = columns::create_stage(
                &store,
                NewStage {
                    name,
                    order,
                    is_visible: Some(!hidden),
                    yellow_limit: yellow,
                    red_limit: red,
                },
            )?;
            print_stage(&stage, "Added", json)
        }
        StageSubcommand::Edit {
            id,
            name,
            order,
            visible,
            yellow,
            red,
            clear_yellow,
            clear_red,
        } => {
            let patch = StagePatch {
                name,
                order,
                is_visible: visible,
                yellow_limit: if clear_yellow { Some(None) } else { yellow.map(Some) },
                red_limit: if clear_red { Some(None) } else { red.map(Some) },
            };
            let stage = columns::update_stage(&store, &id, patch)?;
            print_stage(&stage, "Updated", json)
        }
        StageSubcommand::Remove { id } => {
            let stage = columns::delete_stage(&store, &id)?;
            print_stage(&stage, "Removed", json)
        }
        StageSubcommand::Reorder { ids } => {
            let orders = full_order(&store.list_stages()?, &ids)?;
            let stages = columns::reorder_stages(&store, &orders)?;
            if json {
                return print_json(&stages);
            }
            print_stages(&stages);
            Ok(())
        }
    }
}

pub fn run_priority(root: &Path, subcmd: PrioritySubcommand, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    match subcmd {
        PrioritySubcommand::List => {
            let priorities = store.list_priorities()?;
            if json {
                return print_json(&priorities);
            }
            let rows = priorities
                .into_iter()
                .map(|p| vec![p.id, p.order.to_string(), p.name, p.color])
                .collect();
            print_table(&["ID", "ORDER", "NAME", "COLOR"], rows);
            Ok(())
        }
        PrioritySubcommand::Add { name, color, order } => {
            let priority =
                columns::create_priority(&store, NewPriority { name, color, order })?;
            if json {
                return print_json(&priority);
            }
            println!("Added priority {} ({})", priority.name, priority.id);
            Ok(())
        }
    }
}
