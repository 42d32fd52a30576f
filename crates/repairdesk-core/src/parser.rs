//! Message Parser: free-text service request → structured card fields.
//!
//! Requests arrive as chat messages with semi-fixed Russian section labels
//! ("Приборы", "Адрес доставки", "Контактные данные", "Организация",
//! "Дата отправки", "Сообщение заказчика"), separated either by the next
//! label or by long runs of `_`, `-` or whitespace.
//!
//! Every section is extracted by an ordered list of [`Matcher`]s, most
//! specific first; [`first_capture`] returns the first non-empty capture.
//! A message that lacks required sections is not an error condition of the
//! parser; it yields [`ParseError::MissingFields`] naming exactly what is
//! absent.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Canonical token substituted for every run of 3+ separator characters.
pub const SEPARATOR: &str = "___SEPARATOR___";

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequiredField {
    Instruments,
    DeliveryAddress,
    Contacts,
    Organization,
}

impl RequiredField {
    pub fn all() -> &'static [RequiredField] {
        &[
            RequiredField::Instruments,
            RequiredField::DeliveryAddress,
            RequiredField::Contacts,
            RequiredField::Organization,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequiredField::Instruments => "instruments",
            RequiredField::DeliveryAddress => "deliveryAddress",
            RequiredField::Contacts => "contacts",
            RequiredField::Organization => "organization",
        }
    }

    /// Section label as the sender writes it.
    pub fn label(self) -> &'static str {
        match self {
            RequiredField::Instruments => "Приборы",
            RequiredField::DeliveryAddress => "Адрес доставки",
            RequiredField::Contacts => "Контактные данные",
            RequiredField::Organization => "Организация",
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing required fields: {}", join_fields(.0))]
    MissingFields(Vec<RequiredField>),

    #[error("message is not valid UTF-8: {0}")]
    Encoding(String),
}

fn join_fields(fields: &[RequiredField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// One line of the "Приборы" section after best-effort decomposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstrumentEntry {
    Serial {
        #[serde(skip_serializing_if = "Option::is_none")]
        device_type: Option<String>,
        serial: String,
        model: String,
    },
    Raw {
        text: String,
    },
}

impl fmt::Display for InstrumentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentEntry::Serial {
                device_type: Some(t),
                serial,
                model,
            } => write!(f, "{t} S/N: {serial} {model}"),
            InstrumentEntry::Serial {
                device_type: None,
                serial,
                model,
            } => write!(f, "S/N: {serial} {model}"),
            InstrumentEntry::Raw { text } => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub instruments: String,
    pub instrument_entries: Vec<InstrumentEntry>,
    pub delivery_address: String,
    pub contacts: String,
    pub organization: String,
    /// Raw text; converted to a date downstream.
    pub shipping_date: Option<String>,
    pub notes: Option<String>,
    pub postal_order: Option<String>,
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// A named extraction strategy: a regex whose first group is the value.
pub struct Matcher {
    pub id: String,
    regex: Regex,
}

impl Matcher {
    fn new(id: impl Into<String>, pattern: &str) -> Self {
        Self {
            id: id.into(),
            regex: Regex::new(pattern).expect("parser pattern must compile"),
        }
    }

    /// The trimmed first capture group, if the pattern matches and the
    /// capture is non-empty once separators are stripped.
    pub fn capture(&self, text: &str) -> Option<String> {
        let caps = self.regex.captures(text)?;
        let raw = caps.get(1)?.as_str();
        let cleaned = raw.trim().replace(SEPARATOR, "");
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned.to_string())
        }
    }
}

/// First-success combinator over an ordered matcher list.
pub fn first_capture<'m>(matchers: &'m [Matcher], text: &str) -> Option<(&'m str, String)> {
    matchers
        .iter()
        .find_map(|m| m.capture(text).map(|v| (m.id.as_str(), v)))
}

// ---------------------------------------------------------------------------
// Pattern tables
// ---------------------------------------------------------------------------

struct Patterns {
    separator_run: Regex,
    instruments: Vec<Matcher>,
    delivery_address: Vec<Matcher>,
    contacts: Vec<Matcher>,
    organization: Vec<Matcher>,
    shipping_date: Vec<Matcher>,
    notes: Vec<Matcher>,
    postal_order: Vec<Matcher>,
    instrument_with_type: Regex,
    instrument_serial: Regex,
    instrument_bare: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

/// Labels terminating a section, in addition to the separator and end of text.
const INSTRUMENTS_END: &[&str] = &["Адрес доставки", "Контактные данные", "Организация"];
const ADDRESS_END: &[&str] = &["Контактные данные", "Организация", "Дата отправки"];
const CONTACTS_END: &[&str] = &["Организация", "Дата отправки", "Сообщение заказчика"];
const ORGANIZATION_END: &[&str] = &["Дата отправки", "Сообщение заказчика", "AUTOLIGHTEXPRESS"];
const SHIPPING_DATE_END: &[&str] = &["Сообщение заказчика", "AUTOLIGHTEXPRESS"];
const NOTES_END: &[&str] = &["AUTOLIGHTEXPRESS", "ордер"];

const SERIAL_LABEL: &str = r"(?:S/N|S\.N\.|Серийный номер|С/Н)";
const MODEL: &str = r"([А-Яа-яA-Za-z0-9\s\-]+)";

/// Two strategies per label: label followed by optional colon/newline
/// (precise), then label followed by at least one colon/space (loose).
fn section(name: &str, labels: &[&str], ends: &[&str]) -> Vec<Matcher> {
    let mut stops: Vec<String> = vec![SEPARATOR.to_string()];
    stops.extend(ends.iter().map(|e| regex::escape(e)));
    let stops = stops.join("|");

    let mut matchers = Vec::with_capacity(labels.len() * 2);
    for label in labels {
        let label_re = regex::escape(label);
        matchers.push(Matcher::new(
            format!("{name}:{label}:labelled"),
            &format!(r"(?i){label_re}[:\s]*\n?([\s\S]*?)(?:{stops}|$)"),
        ));
        matchers.push(Matcher::new(
            format!("{name}:{label}:loose"),
            &format!(r"(?i){label_re}[:\s]+([\s\S]*?)(?:{stops}|$)"),
        ));
    }
    matchers
}

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        separator_run: Regex::new(r"[_\-\s]{3,}").expect("separator pattern must compile"),
        instruments: section("instruments", &["Приборы"], INSTRUMENTS_END),
        delivery_address: section("delivery_address", &["Адрес доставки"], ADDRESS_END),
        contacts: section("contacts", &["Контактные данные", "Контакты"], CONTACTS_END),
        organization: section("organization", &["Организация"], ORGANIZATION_END),
        shipping_date: section("shipping_date", &["Дата отправки"], SHIPPING_DATE_END),
        notes: section("notes", &["Сообщение заказчика"], NOTES_END),
        postal_order: vec![
            Matcher::new(
                "postal_order:courier",
                r"(?i)AUTOLIGHTEXPRESS\s+ордер\s*[№#]?\s*(\d+)",
            ),
            Matcher::new("postal_order:ru", r"(?i)ордер\s*[№#]?\s*(\d+)"),
            Matcher::new("postal_order:en", r"(?i)order\s*[№#]?\s*(\d+)"),
        ],
        instrument_with_type: Regex::new(&format!(
            r"(?i)^([А-Яа-яA-Za-z\s]+?)\s+{SERIAL_LABEL}[:\s]*(\d+)\s+{MODEL}$"
        ))
        .expect("instrument pattern must compile"),
        instrument_serial: Regex::new(&format!(r"(?i)^{SERIAL_LABEL}[:\s]*(\d+)\s+{MODEL}$"))
            .expect("instrument pattern must compile"),
        instrument_bare: Regex::new(&format!(r"^(\d+)\s+{MODEL}$"))
            .expect("instrument pattern must compile"),
    })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Collapse separator runs into [`SEPARATOR`] and unify line endings.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    patterns()
        .separator_run
        .replace_all(&unified, SEPARATOR)
        .into_owned()
}

/// Decompose one instrument line. Returns `None` when no sub-pattern fits.
pub fn parse_instrument_line(line: &str) -> Option<InstrumentEntry> {
    let p = patterns();
    if let Some(c) = p.instrument_with_type.captures(line) {
        return Some(InstrumentEntry::Serial {
            device_type: Some(c[1].trim().to_string()),
            serial: c[2].to_string(),
            model: c[3].trim().to_string(),
        });
    }
    p.instrument_serial
        .captures(line)
        .or_else(|| p.instrument_bare.captures(line))
        .map(|c| InstrumentEntry::Serial {
            device_type: None,
            serial: c[1].to_string(),
            model: c[2].trim().to_string(),
        })
}

/// Split the equipment section into entries. Unrecognized lines are kept
/// verbatim; decomposition never fails the parse.
pub fn decompose_instruments(section: &str) -> Vec<InstrumentEntry> {
    section
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            parse_instrument_line(line).unwrap_or_else(|| InstrumentEntry::Raw {
                text: line.to_string(),
            })
        })
        .collect()
}

/// Parse raw bytes, rejecting invalid UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<ParsedMessage, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding(e.to_string()))?;
    parse(text)
}

pub fn parse(text: &str) -> Result<ParsedMessage, ParseError> {
    let p = patterns();
    let normalized = normalize(text);
    tracing::debug!(len = text.len(), "parsing inbound message");

    let section_text = |matchers: &[Matcher]| {
        first_capture(matchers, &normalized).map(|(id, value)| {
            tracing::debug!(matcher = id, "section matched");
            value
        })
    };

    let raw_instruments = section_text(&p.instruments);
    let delivery_address = section_text(&p.delivery_address);
    let contacts = section_text(&p.contacts);
    let organization = section_text(&p.organization);
    let shipping_date = section_text(&p.shipping_date);
    let notes = section_text(&p.notes);
    // Order numbers are searched in the raw text, anywhere.
    let postal_order = first_capture(&p.postal_order, text).map(|(_, v)| v);

    let mut missing = Vec::new();
    if raw_instruments.is_none() {
        missing.push(RequiredField::Instruments);
    }
    if delivery_address.is_none() {
        missing.push(RequiredField::DeliveryAddress);
    }
    if contacts.is_none() {
        missing.push(RequiredField::Contacts);
    }
    if organization.is_none() {
        missing.push(RequiredField::Organization);
    }
    if !missing.is_empty() {
        tracing::debug!(missing = %join_fields(&missing), "message lacks required sections");
        return Err(ParseError::MissingFields(missing));
    }

    let raw_instruments = raw_instruments.unwrap_or_default();
    let entries = decompose_instruments(&raw_instruments);
    let structured = entries
        .iter()
        .any(|e| matches!(e, InstrumentEntry::Serial { .. }));
    let instruments = if structured {
        entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        raw_instruments
    };

    Ok(ParsedMessage {
        instruments,
        instrument_entries: entries,
        delivery_address: delivery_address.unwrap_or_default(),
        contacts: contacts.unwrap_or_default(),
        organization: organization.unwrap_or_default(),
        shipping_date,
        notes,
        postal_order,
    })
}
