use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// A single service/repair request.
///
/// `updated_at` is the moment the card entered its current stage. It is
/// reset only when the stage changes; field edits and priority changes
/// leave it alone, because dwell time is measured from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub instruments: String,
    pub delivery_address: String,
    pub contacts: String,
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_order: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_deadline: Option<DateTime<Utc>>,
    pub stage_id: String,
    pub priority_id: String,
    pub created_by: String,
    #[serde(default)]
    pub is_closed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn new(
        fields: CardFields,
        stage_id: impl Into<String>,
        priority_id: impl Into<String>,
        created_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instruments: fields.instruments,
            delivery_address: fields.delivery_address,
            contacts: fields.contacts,
            organization: fields.organization,
            notes: fields.notes,
            postal_order: fields.postal_order,
            shipping_date: fields.shipping_date,
            execution_deadline: fields.execution_deadline,
            stage_id: stage_id.into(),
            priority_id: priority_id.into(),
            created_by: created_by.into(),
            is_closed: false,
            closed_at: None,
            closed_comment: None,
            closed_by: None,
            updated_at: now,
            created_at: now,
        }
    }

    pub fn is_deadline_expired(&self, now: DateTime<Utc>) -> bool {
        self.execution_deadline.map(|d| now > d).unwrap_or(false)
    }

    /// Apply the free-text/date part of a patch. Returns true if anything
    /// changed. The stage reference is handled by the lifecycle controller.
    pub fn apply_fields(&mut self, patch: &CardPatch) -> bool {
        let before = self.clone();
        if let Some(v) = &patch.instruments {
            self.instruments = v.clone();
        }
        if let Some(v) = &patch.delivery_address {
            self.delivery_address = v.clone();
        }
        if let Some(v) = &patch.contacts {
            self.contacts = v.clone();
        }
        if let Some(v) = &patch.organization {
            self.organization = v.clone();
        }
        if let Some(v) = &patch.notes {
            self.notes = v.clone();
        }
        if let Some(v) = &patch.postal_order {
            self.postal_order = v.clone();
        }
        if let Some(v) = patch.shipping_date {
            self.shipping_date = v;
        }
        if let Some(v) = patch.execution_deadline {
            self.execution_deadline = v;
        }
        *self != before
    }
}

// ---------------------------------------------------------------------------
// CardFields / CardPatch
// ---------------------------------------------------------------------------

/// Field values for a new card, from the parser or a manual form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardFields {
    pub instruments: String,
    pub delivery_address: String,
    pub contacts: String,
    pub organization: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub postal_order: Option<String>,
    #[serde(default)]
    pub shipping_date: Option<NaiveDate>,
    #[serde(default)]
    pub execution_deadline: Option<DateTime<Utc>>,
}

/// Partial update. Outer `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardPatch {
    #[serde(default)]
    pub instruments: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub contacts: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default, with = "nullable")]
    pub notes: Option<Option<String>>,
    #[serde(default, with = "nullable")]
    pub postal_order: Option<Option<String>>,
    #[serde(default, with = "nullable")]
    pub shipping_date: Option<Option<NaiveDate>>,
    #[serde(default, with = "nullable")]
    pub execution_deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub stage_id: Option<String>,
}

impl CardPatch {
    pub fn move_to(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: Some(stage_id.into()),
            ..Self::default()
        }
    }
}

/// Distinguishes an absent key from an explicit `null` in a JSON patch.
pub(crate) mod nullable {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(d).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Shipping date
// ---------------------------------------------------------------------------

// Two-digit years first: chrono's `%Y` would happily read "24" as year 24.
const DATE_FORMATS: &[&str] = &["%d.%m.%y", "%d.%m.%Y", "%d/%m/%Y", "%Y-%m-%d"];

/// Best-effort conversion of the raw "Дата отправки" text into a date.
///
/// Only the first whitespace-separated token is considered, so trailing
/// words ("12.03.2024 утром") do not defeat the match.
pub fn parse_shipping_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.split_whitespace().next()?;
    let token = token.trim_end_matches(|c: char| c == ',' || c == ';' || c == '.');
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}
