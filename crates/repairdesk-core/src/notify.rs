//! Notification Channel contract and message rendering.
//!
//! The lifecycle engine and the report scheduler talk to the outside world
//! only through [`NotificationChannel`]. Every call is best-effort from the
//! engine's point of view: callers log and drop the error.

use crate::board::{Priority, Stage};
use crate::card::Card;
use crate::error::Result;
use crate::history::HistoryAction;
use crate::settings::ResponsibleParty;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// NotificationChannel
// ---------------------------------------------------------------------------

pub trait NotificationChannel: Send + Sync {
    /// Post an HTML-formatted message to `target`.
    fn send(&self, target: &str, text: &str) -> Result<()>;

    /// Mark an inbound message as seen. An `Err` means the preferred signal
    /// was not delivered, even if a fallback was.
    fn acknowledge(&self, target: &str, message_id: i64) -> Result<()>;

    /// Reply to `message_id` with a failure report that mentions every
    /// responsible party.
    fn send_tagged(
        &self,
        target: &str,
        message_id: i64,
        text: &str,
        responsible: &[ResponsibleParty],
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Escape the three characters the HTML parse mode cares about.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Numeric ids become user links, handles stay plain `@handle` mentions.
pub fn render_mention(party: &ResponsibleParty) -> String {
    match party {
        ResponsibleParty::Id(id) => format!("<a href=\"tg://user?id={id}\">@user</a>"),
        ResponsibleParty::Handle(_) => escape_html(&party.to_string()),
    }
}

/// Body of an ingestion failure reply.
pub fn tagged_failure_text(reason: &str, responsible: &[ResponsibleParty]) -> String {
    let mut msg = format!("❌ <b>Не удалось создать заявку</b>\n\n{}", escape_html(reason));
    if !responsible.is_empty() {
        let tags: Vec<String> = responsible.iter().map(render_mention).collect();
        msg.push_str("\n\nОтветственные: ");
        msg.push_str(&tags.join(" "));
    }
    msg
}

/// What happened to a card, with enough context to render a message.
#[derive(Debug, Clone, Copy)]
pub struct CardEvent<'a> {
    pub action: HistoryAction,
    pub card: &'a Card,
    pub stage: Option<&'a Stage>,
    pub priority: Option<&'a Priority>,
    pub old_stage: Option<&'a Stage>,
    pub old_priority: Option<&'a Priority>,
}

impl CardEvent<'_> {
    pub fn render(&self) -> String {
        let name = |s: Option<&str>| escape_html(s.unwrap_or("—"));
        let card = self.card;
        let mut msg = format!("<b>{}</b>\n\n", self.action.label());
        msg.push_str(&format!("<b>Карточка:</b> {}\n", escape_html(&card.organization)));
        msg.push_str(&format!(
            "<b>Текущая колонка:</b> {}\n",
            name(self.stage.map(|s| s.name.as_str()))
        ));
        msg.push_str(&format!(
            "<b>Приоритет:</b> {}\n",
            name(self.priority.map(|p| p.name.as_str()))
        ));
        if let Some(old) = self.old_stage.filter(|s| s.id != card.stage_id) {
            msg.push_str(&format!("<b>Предыдущая колонка:</b> {}\n", escape_html(&old.name)));
        }
        if let Some(old) = self.old_priority.filter(|p| p.id != card.priority_id) {
            msg.push_str(&format!("<b>Предыдущий приоритет:</b> {}\n", escape_html(&old.name)));
        }
        msg.push_str(&format!("\n<b>Организация:</b> {}\n", escape_html(&card.organization)));
        msg.push_str(&format!("<b>Адрес:</b> {}\n", escape_html(&card.delivery_address)));
        msg.push_str(&format!("<b>Контакты:</b> {}", escape_html(&card.contacts)));
        msg
    }
}

// ---------------------------------------------------------------------------
// Built-in channels
// ---------------------------------------------------------------------------

/// Writes every notification to the log. Used when no bot token is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn send(&self, target: &str, text: &str) -> Result<()> {
        tracing::info!(chat_id = target, %text, "notification");
        Ok(())
    }

    fn acknowledge(&self, target: &str, message_id: i64) -> Result<()> {
        tracing::info!(chat_id = target, message_id, "acknowledged");
        Ok(())
    }

    fn send_tagged(
        &self,
        target: &str,
        message_id: i64,
        text: &str,
        responsible: &[ResponsibleParty],
    ) -> Result<()> {
        let text = tagged_failure_text(text, responsible);
        tracing::warn!(chat_id = target, message_id, %text, "ingestion failure reply");
        Ok(())
    }
}

/// One call observed by a [`MemoryChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { target: String, text: String },
    Ack { target: String, message_id: i64 },
    Tagged {
        target: String,
        message_id: i64,
        text: String,
        responsible: Vec<ResponsibleParty>,
    },
}

/// In-memory channel that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    sent: Mutex<Vec<Sent>>,
    failing: Mutex<bool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let ch = Self::default();
        ch.set_failing(true);
        ch
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut f) = self.failing.lock() {
            *f = failing;
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Text of every plain message, in order.
    pub fn messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Message { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, entry: Sent) -> Result<()> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(crate::DeskError::Channel("channel unavailable".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(entry);
        }
        Ok(())
    }
}

impl NotificationChannel for MemoryChannel {
    fn send(&self, target: &str, text: &str) -> Result<()> {
        self.record(Sent::Message {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn acknowledge(&self, target: &str, message_id: i64) -> Result<()> {
        self.record(Sent::Ack {
            target: target.to_string(),
            message_id,
        })
    }

    fn send_tagged(
        &self,
        target: &str,
        message_id: i64,
        text: &str,
        responsible: &[ResponsibleParty],
    ) -> Result<()> {
        self.record(Sent::Tagged {
            target: target.to_string(),
            message_id,
            text: text.to_string(),
            responsible: responsible.to_vec(),
        })
    }
}
