use repairdesk_core::lifecycle::InboundMessage;
use serde::{Deserialize, Serialize};

// ─── Webhook payload ──────────────────────────────────────────────────────

/// One webhook delivery. Only the fields the desk acts on are modelled;
/// everything else in the payload is ignored.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_post: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// What the webhook handler should do with an [`Update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateKind {
    Ingest(InboundMessage),
    /// Edits never re-ingest: the card already exists or was rejected.
    Edited,
    NoText,
}

impl Update {
    /// Ordinary messages and channel posts are ingested alike.
    pub fn classify(&self) -> UpdateKind {
        if let Some(msg) = self.message.as_ref().or(self.channel_post.as_ref()) {
            if let Some(inbound) = msg.to_inbound() {
                return UpdateKind::Ingest(inbound);
            }
        }
        if self.edited_message.as_ref().is_some_and(|m| m.text.is_some()) {
            return UpdateKind::Edited;
        }
        UpdateKind::NoText
    }
}

impl Message {
    pub fn to_inbound(&self) -> Option<InboundMessage> {
        let text = self.text.as_ref()?;
        Some(InboundMessage {
            text: text.clone(),
            chat_id: self.chat.id.to_string(),
            thread_id: self.message_thread_id,
            message_id: self.message_id,
        })
    }
}

// ─── API results ──────────────────────────────────────────────────────────

/// Envelope every Bot API method returns.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub result: Option<T>,
}

/// `getWebhookInfo` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WebhookInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub has_custom_certificate: bool,
    #[serde(default)]
    pub pending_update_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
}
