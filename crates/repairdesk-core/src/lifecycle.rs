//! Card Lifecycle Controller.
//!
//! Every card is either `Active@stage` or `Closed`. Transitions are
//! ingest, create, edit/move and close; each one performs a single card
//! write, then a single history append, then a best-effort notification.
//! Storage errors abort the transition and surface to the caller.
//! Notification errors are logged and dropped.

use crate::board::{Priority, Stage};
use crate::card::{parse_shipping_date, Card, CardFields, CardPatch};
use crate::error::{DeskError, Result};
use crate::escalation::{resolve_priority, TierLadder};
use crate::history::{CardHistory, HistoryAction};
use crate::notify::{CardEvent, NotificationChannel};
use crate::parser::{self, ParseError, RequiredField};
use crate::settings::Settings;
use crate::store::RecordStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Inbound / outcome types
// ---------------------------------------------------------------------------

/// A chat message handed to [`Lifecycle::ingest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub text: String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    pub message_id: i64,
}

/// Why an inbound message did not become a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum IngestFailure {
    ParseFailure,
    MissingRequiredFields { fields: Vec<RequiredField> },
    NoStageConfigured,
    NoTierConfigured,
    NoDefaultActor,
}

impl IngestFailure {
    pub fn code(&self) -> &'static str {
        match self {
            IngestFailure::ParseFailure => "parse_failure",
            IngestFailure::MissingRequiredFields { .. } => "missing_required_fields",
            IngestFailure::NoStageConfigured => "no_stage_configured",
            IngestFailure::NoTierConfigured => "no_tier_configured",
            IngestFailure::NoDefaultActor => "no_default_actor",
        }
    }

    /// The reason shown to the sender in the chat reply.
    pub fn user_message(&self) -> String {
        match self {
            IngestFailure::ParseFailure => {
                "Не удалось распарсить сообщение. Проверьте формат заявки.".to_string()
            }
            IngestFailure::MissingRequiredFields { fields } => {
                let labels: Vec<&str> = fields.iter().map(|f| f.label()).collect();
                format!(
                    "В сообщении отсутствуют обязательные поля: {}.",
                    labels.join(", ")
                )
            }
            IngestFailure::NoStageConfigured => {
                "В системе не найдено ни одной колонки. Обратитесь к администратору.".to_string()
            }
            IngestFailure::NoTierConfigured => {
                "В системе не найдено ни одного приоритета. Обратитесь к администратору."
                    .to_string()
            }
            IngestFailure::NoDefaultActor => {
                "Системный пользователь не найден. Обратитесь к администратору.".to_string()
            }
        }
    }
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Created(Card),
    Rejected(IngestFailure),
}

/// Which cards a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFilter {
    #[default]
    Active,
    Closed,
    All,
}

impl CardFilter {
    fn admits(self, card: &Card) -> bool {
        match self {
            CardFilter::Active => !card.is_closed,
            CardFilter::Closed => card.is_closed,
            CardFilter::All => true,
        }
    }
}

/// A card joined with the names a board needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardView {
    #[serde(flatten)]
    pub card: Card,
    pub stage_name: Option<String>,
    pub priority_name: Option<String>,
    pub priority_color: Option<String>,
    pub deadline_expired: bool,
}

impl CardView {
    fn new(card: Card, stages: &[Stage], priorities: &[Priority], now: DateTime<Utc>) -> Self {
        let stage = stages.iter().find(|s| s.id == card.stage_id);
        let priority = priorities.iter().find(|p| p.id == card.priority_id);
        Self {
            stage_name: stage.map(|s| s.name.clone()),
            priority_name: priority.map(|p| p.name.clone()),
            priority_color: priority.map(|p| p.color.clone()),
            deadline_expired: card.is_deadline_expired(now),
            card,
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Drives card transitions against a store and a notification channel.
pub struct Lifecycle<'a, S: ?Sized, N: ?Sized> {
    store: &'a S,
    channel: &'a N,
}

impl<'a, S, N> Lifecycle<'a, S, N>
where
    S: RecordStore + ?Sized,
    N: NotificationChannel + ?Sized,
{
    pub fn new(store: &'a S, channel: &'a N) -> Self {
        Self { store, channel }
    }

    // -- ingest -------------------------------------------------------------

    /// Turn a chat message into a card in the first stage. Input and
    /// configuration problems are answered in the chat and returned as
    /// [`IngestOutcome::Rejected`]; only storage failures are `Err`.
    pub fn ingest(&self, msg: &InboundMessage, now: DateTime<Utc>) -> Result<IngestOutcome> {
        let settings = self.store.settings()?;
        match self.try_ingest(msg, &settings, now)? {
            Ok(card) => {
                tracing::info!(card_id = %card.id, chat_id = %msg.chat_id, "card created from message");
                if let Err(e) = self.channel.acknowledge(&msg.chat_id, msg.message_id) {
                    tracing::warn!(chat_id = %msg.chat_id, error = %e, "failed to acknowledge message");
                }
                Ok(IngestOutcome::Created(card))
            }
            Err(failure) => {
                tracing::warn!(chat_id = %msg.chat_id, reason = %failure, "message rejected");
                if let Err(e) = self.channel.send_tagged(
                    &msg.chat_id,
                    msg.message_id,
                    &failure.user_message(),
                    &settings.responsible,
                ) {
                    tracing::warn!(chat_id = %msg.chat_id, error = %e, "failed to report rejection");
                }
                Ok(IngestOutcome::Rejected(failure))
            }
        }
    }

    fn try_ingest(
        &self,
        msg: &InboundMessage,
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<Card, IngestFailure>> {
        let parsed = match parser::parse(&msg.text) {
            Ok(p) => p,
            Err(ParseError::MissingFields(fields)) => {
                return Ok(Err(IngestFailure::MissingRequiredFields { fields }))
            }
            Err(ParseError::Encoding(_)) => return Ok(Err(IngestFailure::ParseFailure)),
        };

        let stages = self.store.list_stages()?;
        let Some(first_stage) = stages.first() else {
            return Ok(Err(IngestFailure::NoStageConfigured));
        };
        let priorities = self.store.list_priorities()?;
        let Some(ladder) = TierLadder::new(&priorities) else {
            return Ok(Err(IngestFailure::NoTierConfigured));
        };
        let Some(actor) = settings.default_actor.as_deref() else {
            return Ok(Err(IngestFailure::NoDefaultActor));
        };

        let shipping_date = parsed.shipping_date.as_deref().and_then(|raw| {
            let date = parse_shipping_date(raw);
            if date.is_none() {
                tracing::warn!(raw, "unrecognised shipping date, dropping it");
            }
            date
        });

        let fields = CardFields {
            instruments: parsed.instruments,
            delivery_address: parsed.delivery_address,
            contacts: parsed.contacts,
            organization: parsed.organization,
            notes: parsed.notes,
            postal_order: parsed.postal_order,
            shipping_date,
            execution_deadline: Some(now + Duration::days(settings.execution_deadline_days)),
        };
        let card = Card::new(fields, &first_stage.id, &ladder.lowest().id, actor, now);
        self.store.insert_card(&card)?;
        self.store.append_history(&CardHistory::new(
            &card.id,
            Some(actor.to_string()),
            HistoryAction::Created,
            now,
        ))?;
        Ok(Ok(card))
    }

    // -- create -------------------------------------------------------------

    /// Manual creation with explicit fields, in `stage_id` or the first
    /// stage. A missing deadline gets the configured default.
    pub fn create_card(
        &self,
        mut fields: CardFields,
        stage_id: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let stage = match stage_id {
            Some(id) => self.store.get_stage(id)?,
            None => self
                .store
                .list_stages()?
                .into_iter()
                .next()
                .ok_or(DeskError::NoStages)?,
        };
        let priorities = self.store.list_priorities()?;
        let ladder = TierLadder::new(&priorities).ok_or(DeskError::NoPriorities)?;
        if fields.execution_deadline.is_none() {
            let days = self.store.settings()?.execution_deadline_days;
            fields.execution_deadline = Some(now + Duration::days(days));
        }
        let card = Card::new(fields, &stage.id, &ladder.lowest().id, actor, now);
        self.store.insert_card(&card)?;
        self.store.append_history(&CardHistory::new(
            &card.id,
            Some(actor.to_string()),
            HistoryAction::Created,
            now,
        ))?;
        tracing::info!(card_id = %card.id, stage = %stage.name, "card created");
        Ok(card)
    }

    // -- edit / move --------------------------------------------------------

    /// Apply a patch. A stage change restarts the dwell clock; the priority
    /// is then re-resolved. One history entry is written, the most
    /// informative of: priority change, move, plain update.
    pub fn update(
        &self,
        id: &str,
        patch: &CardPatch,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let mut card = self.store.get_card(id)?;
        if card.is_closed {
            return Err(DeskError::CardClosed(id.to_string()));
        }

        let stages = self.store.list_stages()?;
        let priorities = self.store.list_priorities()?;
        let settings = self.store.settings()?;
        let old_stage_id = card.stage_id.clone();
        let old_priority_id = card.priority_id.clone();

        let moved = match patch.stage_id.as_deref() {
            Some(target) if target != card.stage_id => {
                if !stages.iter().any(|s| s.id == target) {
                    return Err(DeskError::StageNotFound(target.to_string()));
                }
                card.stage_id = target.to_string();
                card.updated_at = now;
                true
            }
            _ => false,
        };
        let edited = card.apply_fields(patch);

        if let Some(stage) = stages.iter().find(|s| s.id == card.stage_id) {
            if let Some(p) = resolve_priority(&card, stage, &priorities, now) {
                card.priority_id = p.id.clone();
            }
        }
        let reprioritized = card.priority_id != old_priority_id;

        if !moved && !edited && !reprioritized {
            return Ok(card);
        }

        self.store.update_card(&card)?;

        let entry = CardHistory::new(&card.id, Some(actor.to_string()), action_for(moved, reprioritized), now);
        let entry = if reprioritized {
            entry.priorities(Some(old_priority_id.clone()), Some(card.priority_id.clone()))
        } else {
            entry
        };
        let entry = if moved {
            entry.stages(Some(old_stage_id.clone()), Some(card.stage_id.clone()))
        } else {
            entry
        };
        self.store.append_history(&entry)?;

        tracing::info!(card_id = %card.id, action = %entry.action, "card updated");

        if moved || reprioritized {
            let old_stage = stages.iter().find(|s| s.id == old_stage_id);
            let old_priority = priorities.iter().find(|p| p.id == old_priority_id);
            self.notify(
                settings.notification_target(),
                CardEvent {
                    action: entry.action,
                    card: &card,
                    stage: stages.iter().find(|s| s.id == card.stage_id),
                    priority: priorities.iter().find(|p| p.id == card.priority_id),
                    old_stage,
                    old_priority,
                },
            );
        }
        Ok(card)
    }

    /// Move to another stage. Moving onto the current stage is rejected.
    pub fn move_card(
        &self,
        id: &str,
        stage_id: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let card = self.store.get_card(id)?;
        if card.is_closed {
            return Err(DeskError::CardClosed(id.to_string()));
        }
        if card.stage_id == stage_id {
            return Err(DeskError::InvalidTransition {
                from: card.stage_id,
                to: stage_id.to_string(),
                reason: "card is already in this stage".to_string(),
            });
        }
        self.update(id, &CardPatch::move_to(stage_id), actor, now)
    }

    // -- close --------------------------------------------------------------

    /// Terminal transition. Closing twice is rejected and leaves the first
    /// close untouched.
    pub fn close(
        &self,
        id: &str,
        comment: Option<&str>,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<Card> {
        let mut card = self.store.get_card(id)?;
        if card.is_closed {
            return Err(DeskError::AlreadyClosed(id.to_string()));
        }
        card.is_closed = true;
        card.closed_at = Some(now);
        card.closed_comment = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        card.closed_by = Some(actor.to_string());
        self.store.update_card(&card)?;
        self.store.append_history(
            &CardHistory::new(&card.id, Some(actor.to_string()), HistoryAction::Closed, now)
                .stages(Some(card.stage_id.clone()), None),
        )?;
        tracing::info!(card_id = %card.id, "card closed");
        Ok(card)
    }

    // -- queries ------------------------------------------------------------

    /// List cards, newest first. Active cards are re-classified first and
    /// any escalation is persisted, audited and announced.
    pub fn list_cards(&self, filter: CardFilter, now: DateTime<Utc>) -> Result<Vec<CardView>> {
        let stages = self.store.list_stages()?;
        let priorities = self.store.list_priorities()?;
        let target = self.store.settings()?.notification_target().map(str::to_string);
        let mut out = Vec::new();
        for mut card in self.store.list_cards()? {
            if !card.is_closed {
                self.escalate(&mut card, &stages, &priorities, target.as_deref(), now)?;
            }
            if filter.admits(&card) {
                out.push(CardView::new(card, &stages, &priorities, now));
            }
        }
        Ok(out)
    }

    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Result<CardView> {
        let card = self.store.get_card(id)?;
        let stages = self.store.list_stages()?;
        let priorities = self.store.list_priorities()?;
        Ok(CardView::new(card, &stages, &priorities, now))
    }

    pub fn history(&self, id: &str) -> Result<Vec<CardHistory>> {
        self.store.get_card(id)?;
        self.store.list_history(Some(id))
    }

    // -- internals ----------------------------------------------------------

    fn escalate(
        &self,
        card: &mut Card,
        stages: &[Stage],
        priorities: &[Priority],
        target: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let Some(stage) = stages.iter().find(|s| s.id == card.stage_id) else {
            return Ok(());
        };
        let Some(resolved) = resolve_priority(card, stage, priorities, now) else {
            return Ok(());
        };
        if resolved.id == card.priority_id {
            return Ok(());
        }
        let old_priority_id = std::mem::replace(&mut card.priority_id, resolved.id.clone());
        self.store.update_card(card)?;
        self.store.append_history(
            &CardHistory::new(&card.id, None, HistoryAction::PriorityChanged, now)
                .priorities(Some(old_priority_id.clone()), Some(card.priority_id.clone())),
        )?;
        tracing::info!(card_id = %card.id, priority = %resolved.name, "priority escalated");
        self.notify(
            target,
            CardEvent {
                action: HistoryAction::PriorityChanged,
                card,
                stage: Some(stage),
                priority: Some(resolved),
                old_stage: None,
                old_priority: priorities.iter().find(|p| p.id == old_priority_id),
            },
        );
        Ok(())
    }

    /// Best-effort. Settings are read before any write, so by the time
    /// this runs the mutation is committed and only delivery can fail.
    fn notify(&self, target: Option<&str>, event: CardEvent<'_>) {
        let Some(target) = target else {
            return;
        };
        if let Err(e) = self.channel.send(target, &event.render()) {
            tracing::warn!(card_id = %event.card.id, chat_id = target, error = %e, "notification failed");
        }
    }
}

fn action_for(moved: bool, reprioritized: bool) -> HistoryAction {
    match (moved, reprioritized) {
        (_, true) => HistoryAction::PriorityChanged,
        (true, false) => HistoryAction::Moved,
        (false, false) => HistoryAction::Updated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{MemoryChannel, Sent};
    use crate::settings::{self as cfg, ResponsibleParty, SettingsMap};
    use crate::store::FileStore;
    use tempfile::TempDir;

    const MESSAGE: &str = "Приборы:\nАлкотестер S/N: 12345 Модель X\n___\nАдрес доставки:\nг. Минск\n___\nКонтактные данные:\nИванов +375...\n___\nОрганизация\nООО Ромашка";

    struct Fixture {
        _dir: TempDir,
        store: FileStore,
        stages: Vec<Stage>,
        priorities: Vec<Priority>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let stages = vec![
            Stage::new("Заявка принята", 1).with_limits(Some(1), Some(3)),
            Stage::new("В пути в СЦ", 2).with_limits(Some(2), Some(5)),
            Stage::new("Отправлен клиенту", 3),
        ];
        let priorities = vec![
            Priority::new("normal", "#52c41a", 1),
            Priority::new("warn", "#faad14", 2),
            Priority::new("crit", "#ff4d4f", 3),
        ];
        store.save_stages(&stages).unwrap();
        store.save_priorities(&priorities).unwrap();
        let mut map = cfg::default_map();
        map.insert(cfg::KEY_CHAT_ID.into(), "-100".into());
        map.insert(cfg::KEY_RESPONSIBLE_USER_IDS.into(), "[42]".into());
        store.save_settings_map(&map).unwrap();
        Fixture {
            _dir: dir,
            store,
            stages,
            priorities,
        }
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage {
            text: text.to_string(),
            chat_id: "-555".to_string(),
            thread_id: None,
            message_id: 17,
        }
    }

    fn created(outcome: IngestOutcome) -> Card {
        match outcome {
            IngestOutcome::Created(card) => card,
            other => panic!("expected a card, got {other:?}"),
        }
    }

    #[test]
    fn ingest_creates_card_in_first_stage_and_acks() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let now = Utc::now();

        let card = created(lc.ingest(&inbound(MESSAGE), now).unwrap());
        assert_eq!(card.stage_id, f.stages[0].id);
        assert_eq!(card.priority_id, f.priorities[0].id);
        assert_eq!(card.organization, "ООО Ромашка");
        assert_eq!(card.created_by, cfg::DEFAULT_ACTOR);
        assert_eq!(card.execution_deadline, Some(now + Duration::days(7)));

        let history = f.store.list_history(Some(&card.id)).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(
            ch.sent(),
            vec![Sent::Ack {
                target: "-555".into(),
                message_id: 17
            }]
        );
    }

    #[test]
    fn ingest_uses_configured_deadline_and_shipping_date() {
        let f = fixture();
        let mut map = f.store.settings_map().unwrap();
        map.insert(cfg::KEY_EXECUTION_DEADLINE_DEFAULT.into(), "3".into());
        f.store.save_settings_map(&map).unwrap();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let now = Utc::now();

        let text = format!("{MESSAGE}\n___\nДата отправки: 12.03.2024");
        let card = created(lc.ingest(&inbound(&text), now).unwrap());
        assert_eq!(card.execution_deadline, Some(now + Duration::days(3)));
        assert_eq!(
            card.shipping_date,
            chrono::NaiveDate::from_ymd_opt(2024, 3, 12)
        );
    }

    #[test]
    fn ingest_missing_fields_replies_with_tags() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);

        let outcome = lc.ingest(&inbound("Приборы: Динго"), Utc::now()).unwrap();
        let IngestOutcome::Rejected(failure) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(failure.code(), "missing_required_fields");
        assert!(f.store.list_cards().unwrap().is_empty());

        match &ch.sent()[..] {
            [Sent::Tagged {
                target,
                message_id,
                text,
                responsible,
            }] => {
                assert_eq!(target, "-555");
                assert_eq!(*message_id, 17);
                assert!(text.contains("Адрес доставки"));
                assert!(!text.contains("Приборы"));
                assert_eq!(responsible, &vec![ResponsibleParty::Id(42)]);
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[test]
    fn ingest_without_configuration_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&store, &ch);
        let now = Utc::now();

        let outcome = lc.ingest(&inbound(MESSAGE), now).unwrap();
        assert_eq!(outcome, IngestOutcome::Rejected(IngestFailure::NoStageConfigured));

        store.save_stages(&[Stage::new("a", 1)]).unwrap();
        let outcome = lc.ingest(&inbound(MESSAGE), now).unwrap();
        assert_eq!(outcome, IngestOutcome::Rejected(IngestFailure::NoTierConfigured));

        store.save_priorities(&[Priority::new("p", "#fff", 1)]).unwrap();
        let mut map = SettingsMap::new();
        map.insert(cfg::KEY_DEFAULT_ACTOR.into(), "".into());
        store.save_settings_map(&map).unwrap();
        let outcome = lc.ingest(&inbound(MESSAGE), now).unwrap();
        assert_eq!(outcome, IngestOutcome::Rejected(IngestFailure::NoDefaultActor));

        assert!(store.list_cards().unwrap().is_empty());
        assert_eq!(ch.sent().len(), 3);
    }

    #[test]
    fn ingest_survives_channel_failure() {
        let f = fixture();
        let ch = MemoryChannel::failing();
        let lc = Lifecycle::new(&f.store, &ch);
        created(lc.ingest(&inbound(MESSAGE), Utc::now()).unwrap());
        let outcome = lc.ingest(&inbound(""), Utc::now()).unwrap();
        assert!(matches!(outcome, IngestOutcome::Rejected(_)));
        assert_eq!(f.store.list_cards().unwrap().len(), 1);
    }

    #[test]
    fn move_resets_dwell_clock_and_notifies() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let t0 = Utc::now() - Duration::hours(2);
        let card = created(lc.ingest(&inbound(MESSAGE), t0).unwrap());

        let now = Utc::now();
        let moved = lc.move_card(&card.id, &f.stages[1].id, "operator", now).unwrap();
        assert_eq!(moved.stage_id, f.stages[1].id);
        assert_eq!(moved.updated_at, now);
        assert_eq!(moved.created_at, t0);

        let history = lc.history(&card.id).unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.action, HistoryAction::Moved);
        assert_eq!(last.old_stage_id.as_deref(), Some(f.stages[0].id.as_str()));
        assert_eq!(last.new_stage_id.as_deref(), Some(f.stages[1].id.as_str()));
        assert_eq!(last.actor.as_deref(), Some("operator"));

        let messages = ch.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("<b>Перемещена карточка</b>"));
        assert!(messages[0].contains("<b>Предыдущая колонка:</b> Заявка принята"));
    }

    #[test]
    fn move_onto_same_stage_is_rejected() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let card = created(lc.ingest(&inbound(MESSAGE), Utc::now()).unwrap());
        assert!(matches!(
            lc.move_card(&card.id, &f.stages[0].id, "op", Utc::now()),
            Err(DeskError::InvalidTransition { .. })
        ));
        assert!(matches!(
            lc.move_card(&card.id, "nowhere", "op", Utc::now()),
            Err(DeskError::StageNotFound(_))
        ));
    }

    #[test]
    fn escalated_priority_supersedes_move_entry() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let t0 = Utc::now() - Duration::days(4);
        let card = created(lc.ingest(&inbound(MESSAGE), t0).unwrap());

        // Four days in stage 0 (red at 3) makes it critical on a plain edit.
        let patch = CardPatch {
            notes: Some(Some("позвонить".into())),
            ..CardPatch::default()
        };
        let edited = lc.update(&card.id, &patch, "op", Utc::now()).unwrap();
        assert_eq!(edited.priority_id, f.priorities[2].id);
        assert_eq!(edited.updated_at, t0);

        let last = lc.history(&card.id).unwrap().pop().unwrap();
        assert_eq!(last.action, HistoryAction::PriorityChanged);
        assert_eq!(last.old_priority_id.as_deref(), Some(f.priorities[0].id.as_str()));
        assert_eq!(last.new_priority_id.as_deref(), Some(f.priorities[2].id.as_str()));
        assert!(ch.messages()[0].contains("<b>Предыдущий приоритет:</b> normal"));

        // Moving restarts the clock, so the tier drops back with a single entry.
        let moved = lc.move_card(&card.id, &f.stages[1].id, "op", Utc::now()).unwrap();
        assert_eq!(moved.priority_id, f.priorities[0].id);
        let last = lc.history(&card.id).unwrap().pop().unwrap();
        assert_eq!(last.action, HistoryAction::PriorityChanged);
        assert_eq!(last.new_stage_id.as_deref(), Some(f.stages[1].id.as_str()));
        assert_eq!(lc.history(&card.id).unwrap().len(), 3);
    }

    #[test]
    fn plain_edit_logs_update_without_notification() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let t0 = Utc::now();
        let card = created(lc.ingest(&inbound(MESSAGE), t0).unwrap());

        let patch = CardPatch {
            contacts: Some("Петров".into()),
            ..CardPatch::default()
        };
        let edited = lc.update(&card.id, &patch, "op", t0 + Duration::minutes(5)).unwrap();
        assert_eq!(edited.contacts, "Петров");
        assert_eq!(edited.updated_at, t0);
        assert_eq!(
            lc.history(&card.id).unwrap().last().unwrap().action,
            HistoryAction::Updated
        );
        assert!(ch.messages().is_empty());

        // A no-op patch writes nothing.
        lc.update(&card.id, &patch, "op", t0 + Duration::minutes(6)).unwrap();
        assert_eq!(lc.history(&card.id).unwrap().len(), 2);
    }

    #[test]
    fn notifications_respect_switch() {
        let f = fixture();
        let mut map = f.store.settings_map().unwrap();
        map.insert(cfg::KEY_NOTIFICATIONS_ENABLED.into(), "false".into());
        f.store.save_settings_map(&map).unwrap();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let card = created(lc.ingest(&inbound(MESSAGE), Utc::now()).unwrap());
        lc.move_card(&card.id, &f.stages[1].id, "op", Utc::now()).unwrap();
        assert!(ch.messages().is_empty());
    }

    #[test]
    fn close_is_terminal_and_rejects_second_close() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let card = created(lc.ingest(&inbound(MESSAGE), Utc::now()).unwrap());

        let t1 = Utc::now();
        let closed = lc.close(&card.id, Some("выдан"), "op", t1).unwrap();
        assert!(closed.is_closed);
        assert_eq!(closed.closed_at, Some(t1));
        assert_eq!(closed.closed_comment.as_deref(), Some("выдан"));
        assert_eq!(closed.closed_by.as_deref(), Some("op"));

        let err = lc.close(&card.id, Some("ещё раз"), "other", t1 + Duration::hours(1));
        assert!(matches!(err, Err(DeskError::AlreadyClosed(_))));
        let stored = f.store.get_card(&card.id).unwrap();
        assert_eq!(stored.closed_at, Some(t1));
        assert_eq!(stored.closed_comment.as_deref(), Some("выдан"));

        assert!(matches!(
            lc.move_card(&card.id, &f.stages[1].id, "op", Utc::now()),
            Err(DeskError::CardClosed(_))
        ));
        let last = lc.history(&card.id).unwrap().pop().unwrap();
        assert_eq!(last.action, HistoryAction::Closed);
        assert_eq!(last.old_stage_id.as_deref(), Some(f.stages[0].id.as_str()));
    }

    #[test]
    fn listing_escalates_active_cards_only() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let old = Utc::now() - Duration::days(2);
        let stale = created(lc.ingest(&inbound(MESSAGE), old).unwrap());
        let done = created(lc.ingest(&inbound(MESSAGE), old).unwrap());
        lc.close(&done.id, None, "op", old).unwrap();

        let active = lc.list_cards(CardFilter::Active, Utc::now()).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].card.id, stale.id);
        assert_eq!(active[0].priority_name.as_deref(), Some("warn"));
        assert_eq!(active[0].stage_name.as_deref(), Some("Заявка принята"));

        let entry = lc.history(&stale.id).unwrap().pop().unwrap();
        assert_eq!(entry.action, HistoryAction::PriorityChanged);
        assert_eq!(entry.actor, None);
        assert_eq!(ch.messages().len(), 1);

        // A second listing finds nothing new to escalate.
        lc.list_cards(CardFilter::Active, Utc::now()).unwrap();
        assert_eq!(lc.history(&stale.id).unwrap().len(), 2);

        let closed = lc.list_cards(CardFilter::Closed, Utc::now()).unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].priority_name.as_deref(), Some("normal"));
        assert_eq!(lc.list_cards(CardFilter::All, Utc::now()).unwrap().len(), 2);
    }

    #[test]
    fn listing_flags_expired_deadlines() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        let fields = CardFields {
            instruments: "Динго".into(),
            delivery_address: "Минск".into(),
            contacts: "8029".into(),
            organization: "ОАО".into(),
            execution_deadline: Some(Utc::now() - Duration::hours(1)),
            ..CardFields::default()
        };
        let card = lc.create_card(fields, Some(&f.stages[2].id), "op", Utc::now()).unwrap();
        let view = lc.get(&card.id, Utc::now()).unwrap();
        assert!(view.deadline_expired);
        assert_eq!(view.stage_name.as_deref(), Some("Отправлен клиенту"));
    }

    #[test]
    fn history_of_unknown_card_is_not_found() {
        let f = fixture();
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&f.store, &ch);
        assert!(matches!(lc.history("missing"), Err(DeskError::CardNotFound(_))));
    }

    /// FileStore whose settings document becomes unreadable on demand.
    struct BrokenSettings {
        inner: FileStore,
        broken: std::sync::atomic::AtomicBool,
    }

    impl BrokenSettings {
        fn new(inner: FileStore) -> Self {
            Self {
                inner,
                broken: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn break_settings(&self) {
            self.broken.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl RecordStore for BrokenSettings {
        fn list_stages(&self) -> Result<Vec<Stage>> {
            self.inner.list_stages()
        }
        fn save_stages(&self, stages: &[Stage]) -> Result<()> {
            self.inner.save_stages(stages)
        }
        fn list_priorities(&self) -> Result<Vec<Priority>> {
            self.inner.list_priorities()
        }
        fn save_priorities(&self, priorities: &[Priority]) -> Result<()> {
            self.inner.save_priorities(priorities)
        }
        fn list_cards(&self) -> Result<Vec<Card>> {
            self.inner.list_cards()
        }
        fn get_card(&self, id: &str) -> Result<Card> {
            self.inner.get_card(id)
        }
        fn insert_card(&self, card: &Card) -> Result<()> {
            self.inner.insert_card(card)
        }
        fn update_card(&self, card: &Card) -> Result<()> {
            self.inner.update_card(card)
        }
        fn append_history(&self, entry: &CardHistory) -> Result<()> {
            self.inner.append_history(entry)
        }
        fn list_history(&self, card_id: Option<&str>) -> Result<Vec<CardHistory>> {
            self.inner.list_history(card_id)
        }
        fn settings_map(&self) -> Result<SettingsMap> {
            if self.broken.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(std::io::Error::other("settings.yaml unreadable").into());
            }
            self.inner.settings_map()
        }
        fn save_settings_map(&self, map: &SettingsMap) -> Result<()> {
            self.inner.save_settings_map(map)
        }
    }

    #[test]
    fn unreadable_settings_abort_move_before_any_write() {
        let f = fixture();
        let store = BrokenSettings::new(f.store.clone());
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&store, &ch);
        let card = created(lc.ingest(&inbound(MESSAGE), Utc::now()).unwrap());

        store.break_settings();
        let err = lc
            .move_card(&card.id, &f.stages[1].id, "op", Utc::now())
            .unwrap_err();
        assert!(matches!(err, DeskError::Io(_)));

        // Nothing committed, so a retry is not a duplicate.
        assert_eq!(f.store.get_card(&card.id).unwrap().stage_id, f.stages[0].id);
        assert_eq!(f.store.list_history(Some(&card.id)).unwrap().len(), 1);
        assert_eq!(ch.messages().len(), 0);
    }

    #[test]
    fn unreadable_settings_abort_listing_before_escalation() {
        let f = fixture();
        let store = BrokenSettings::new(f.store.clone());
        let ch = MemoryChannel::new();
        let lc = Lifecycle::new(&store, &ch);
        let t0 = Utc::now() - Duration::days(4);
        let card = created(lc.ingest(&inbound(MESSAGE), t0).unwrap());

        store.break_settings();
        assert!(lc.list_cards(CardFilter::Active, Utc::now()).is_err());
        assert_eq!(f.store.get_card(&card.id).unwrap().priority_id, f.priorities[0].id);
        assert_eq!(f.store.list_history(Some(&card.id)).unwrap().len(), 1);
    }
}
