//! `repairdesk-telegram`: Telegram Bot API plumbing for the desk.
//!
//! ```text
//! webhook JSON ──▶ Update::classify ──▶ InboundMessage ──▶ Lifecycle::ingest
//!                                                             │
//! TelegramClient ◀── NotificationChannel (send / ack / tagged) ┘
//! ```
//!
//! The client is blocking on purpose: the engine it serves is synchronous
//! and the server already runs it on the blocking pool.

pub mod client;
pub mod error;
pub mod types;

pub use client::{TelegramClient, TelegramConfig, DEFAULT_API_BASE};
pub use error::TelegramError;
pub use types::{Chat, Message, Update, UpdateKind, WebhookInfo};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, TelegramError>;
