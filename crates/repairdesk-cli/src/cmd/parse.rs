use crate::output::print_json;
use anyhow::Context;
use repairdesk_core::parser::{self, ParseError};
use std::io::Read;
use std::path::Path;

/// Parse a message without touching the store. Exits non-zero when the
/// message would be rejected.
pub fn run(file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let bytes = match file {
        Some(p) => std::fs::read(p).with_context(|| format!("failed to read {}", p.display()))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let parsed = match parser::parse_bytes(&bytes) {
        Ok(p) => p,
        Err(ParseError::MissingFields(fields)) => {
            if json {
                print_json(&serde_json::json!({ "missing": fields }))?;
            }
            let labels: Vec<&str> = fields.iter().map(|f| f.label()).collect();
            anyhow::bail!("missing required fields: {}", labels.join(", "));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        return print_json(&parsed);
    }

    println!("Instruments:       {}", parsed.instruments);
    for entry in &parsed.instrument_entries {
        println!("  - {entry}");
    }
    println!("Delivery address:  {}", parsed.delivery_address);
    println!("Contacts:          {}", parsed.contacts);
    println!("Organization:      {}", parsed.organization);
    if let Some(date) = &parsed.shipping_date {
        println!("Shipping date:     {date}");
    }
    if let Some(notes) = &parsed.notes {
        println!("Notes:             {notes}");
    }
    if let Some(order) = &parsed.postal_order {
        println!("Postal order:      {order}");
    }
    Ok(())
}
