use super::{open_store, ChannelArgs};
use crate::output::{print_json, print_table, truncate};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Subcommand, ValueEnum};
use repairdesk_core::card::{parse_shipping_date, CardFields, CardPatch};
use repairdesk_core::lifecycle::{CardFilter, CardView, Lifecycle};
use repairdesk_core::notify::NotificationChannel;
use repairdesk_core::store::FileStore;
use std::path::Path;

#[derive(Clone, Copy, ValueEnum)]
pub enum FilterArg {
    Active,
    Closed,
    All,
}

impl From<FilterArg> for CardFilter {
    fn from(f: FilterArg) -> Self {
        match f {
            FilterArg::Active => CardFilter::Active,
            FilterArg::Closed => CardFilter::Closed,
            FilterArg::All => CardFilter::All,
        }
    }
}

#[derive(Subcommand)]
pub enum CardSubcommand {
    /// List cards (escalates overdue active cards as a side effect)
    List {
        #[arg(long, value_enum, default_value = "active")]
        filter: FilterArg,
    },
    /// Show one card
    Show { id: String },
    /// Create a card by hand
    Create {
        #[arg(long)]
        instruments: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        contacts: String,
        #[arg(long)]
        organization: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        postal_order: Option<String>,
        /// Day-first date, e.g. 15.03.2024
        #[arg(long, value_parser = parse_date_arg)]
        shipping_date: Option<NaiveDate>,
        /// Stage id (default: first stage)
        #[arg(long)]
        stage: Option<String>,
    },
    /// Edit card fields
    Edit {
        id: String,
        #[arg(long)]
        instruments: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        contacts: Option<String>,
        #[arg(long)]
        organization: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        postal_order: Option<String>,
        #[arg(long, value_parser = parse_date_arg)]
        shipping_date: Option<NaiveDate>,
    },
    /// Move a card to another stage
    Move { id: String, stage: String },
    /// Close a card
    Close {
        id: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Show the audit trail of a card
    History { id: String },
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_shipping_date(s).ok_or_else(|| format!("unrecognised date '{s}'"))
}

pub fn run(
    root: &Path,
    subcmd: CardSubcommand,
    actor: &str,
    channel: &ChannelArgs,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let channel = channel.channel()?;
    let desk = Lifecycle::new(&store, channel.as_ref());

    match subcmd {
        CardSubcommand::List { filter } => list(&desk, filter.into(), json),
        CardSubcommand::Show { id } => show(&desk, &id, json),
        CardSubcommand::Create {
            instruments,
            address,
            contacts,
            organization,
            notes,
            postal_order,
            shipping_date,
            stage,
        } => {
            let fields = CardFields {
                instruments,
                delivery_address: address,
                contacts,
                organization,
                notes,
                postal_order,
                shipping_date,
                execution_deadline: None,
            };
            let card = desk
                .create_card(fields, stage.as_deref(), actor, Utc::now())
                .context("failed to create card")?;
            if json {
                print_json(&card)?;
            } else {
                println!("Created card {}", card.id);
            }
            Ok(())
        }
        CardSubcommand::Edit {
            id,
            instruments,
            address,
            contacts,
            organization,
            notes,
            postal_order,
            shipping_date,
        } => {
            let patch = CardPatch {
                instruments,
                delivery_address: address,
                contacts,
                organization,
                notes: notes.map(Some),
                postal_order: postal_order.map(Some),
                shipping_date: shipping_date.map(Some),
                ..CardPatch::default()
            };
            let card = desk
                .update(&id, &patch, actor, Utc::now())
                .with_context(|| format!("failed to edit card '{id}'"))?;
            if json {
                print_json(&card)?;
            } else {
                println!("Updated card {}", card.id);
            }
            Ok(())
        }
        CardSubcommand::Move { id, stage } => {
            let card = desk
                .move_card(&id, &stage, actor, Utc::now())
                .with_context(|| format!("failed to move card '{id}'"))?;
            if json {
                print_json(&card)?;
            } else {
                println!("Moved card {} to {}", card.id, card.stage_id);
            }
            Ok(())
        }
        CardSubcommand::Close { id, comment } => {
            let card = desk
                .close(&id, comment.as_deref(), actor, Utc::now())
                .with_context(|| format!("failed to close card '{id}'"))?;
            if json {
                print_json(&card)?;
            } else {
                println!("Closed card {}", card.id);
            }
            Ok(())
        }
        CardSubcommand::History { id } => history(&desk, &id, json),
    }
}

type Desk<'a> = Lifecycle<'a, FileStore, dyn NotificationChannel>;

fn list(desk: &Desk<'_>, filter: CardFilter, json: bool) -> anyhow::Result<()> {
    let cards = desk.list_cards(filter, Utc::now())?;
    if json {
        return print_json(&cards);
    }
    if cards.is_empty() {
        println!("No cards.");
        return Ok(());
    }
    let rows = cards.iter().map(row).collect();
    print_table(
        &["ID", "ORGANIZATION", "INSTRUMENTS", "STAGE", "PRIORITY", "DEADLINE"],
        rows,
    );
    Ok(())
}

fn row(v: &CardView) -> Vec<String> {
    let deadline = match v.card.execution_deadline {
        Some(d) if v.deadline_expired => format!("{} (!)", d.format("%d.%m.%Y")),
        Some(d) => d.format("%d.%m.%Y").to_string(),
        None => "-".to_string(),
    };
    vec![
        v.card.id.clone(),
        truncate(&v.card.organization, 24),
        truncate(&v.card.instruments, 32),
        v.stage_name.clone().unwrap_or_else(|| v.card.stage_id.clone()),
        v.priority_name.clone().unwrap_or_default(),
        deadline,
    ]
}

fn show(desk: &Desk<'_>, id: &str, json: bool) -> anyhow::Result<()> {
    let view = desk
        .get(id, Utc::now())
        .with_context(|| format!("card '{id}' not found"))?;
    if json {
        return print_json(&view);
    }
    let c = &view.card;
    println!("Card:          {}", c.id);
    println!(
        "Stage:         {}",
        view.stage_name.as_deref().unwrap_or(&c.stage_id)
    );
    println!(
        "Priority:      {}",
        view.priority_name.as_deref().unwrap_or(&c.priority_id)
    );
    println!("Organization:  {}", c.organization);
    println!("Instruments:   {}", c.instruments);
    println!("Address:       {}", c.delivery_address);
    println!("Contacts:      {}", c.contacts);
    if let Some(n) = &c.notes {
        println!("Notes:         {n}");
    }
    if let Some(o) = &c.postal_order {
        println!("Postal order:  {o}");
    }
    if let Some(d) = c.shipping_date {
        println!("Shipped:       {}", d.format("%d.%m.%Y"));
    }
    if let Some(d) = c.execution_deadline {
        let flag = if view.deadline_expired { " (expired)" } else { "" };
        println!("Deadline:      {}{flag}", d.format("%d.%m.%Y %H:%M"));
    }
    println!("Created by:    {}", c.created_by);
    if c.is_closed {
        println!(
            "Closed:        {} by {}",
            c.closed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            c.closed_by.as_deref().unwrap_or("-")
        );
        if let Some(comment) = &c.closed_comment {
            println!("Comment:       {comment}");
        }
    }
    Ok(())
}

fn history(desk: &Desk<'_>, id: &str, json: bool) -> anyhow::Result<()> {
    let entries = desk.history(id)?;
    if json {
        return print_json(&entries);
    }
    let rows = entries
        .iter()
        .map(|h| {
            vec![
                h.created_at.format("%d.%m.%Y %H:%M").to_string(),
                h.action.label().to_string(),
                h.actor.clone().unwrap_or_else(|| "system".to_string()),
            ]
        })
        .collect();
    print_table(&["WHEN", "ACTION", "ACTOR"], rows);
    Ok(())
}
