//! Record Store: CRUD over cards, stages, priorities, history and settings.
//!
//! The lifecycle engine only sees the [`RecordStore`] trait. [`FileStore`]
//! is the shipped backend: YAML documents under `.repairdesk/`, one file per
//! card so that a single card update is one atomic rename, and an
//! append-only JSON Lines history log.

use crate::board::{sort_stages, Priority, Stage};
use crate::card::Card;
use crate::error::{DeskError, Result};
use crate::history::CardHistory;
use crate::settings::{Settings, SettingsMap};
use crate::{io, paths};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

pub trait RecordStore: Send + Sync {
    /// All stages in pipeline order.
    fn list_stages(&self) -> Result<Vec<Stage>>;
    fn save_stages(&self, stages: &[Stage]) -> Result<()>;

    /// All priorities in declared order.
    fn list_priorities(&self) -> Result<Vec<Priority>>;
    fn save_priorities(&self, priorities: &[Priority]) -> Result<()>;

    fn list_cards(&self) -> Result<Vec<Card>>;
    fn get_card(&self, id: &str) -> Result<Card>;
    fn insert_card(&self, card: &Card) -> Result<()>;
    fn update_card(&self, card: &Card) -> Result<()>;

    fn append_history(&self, entry: &CardHistory) -> Result<()>;
    /// History in insertion order, optionally restricted to one card.
    fn list_history(&self, card_id: Option<&str>) -> Result<Vec<CardHistory>>;

    fn settings_map(&self) -> Result<SettingsMap>;
    fn save_settings_map(&self, map: &SettingsMap) -> Result<()>;

    fn get_stage(&self, id: &str) -> Result<Stage> {
        self.list_stages()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| DeskError::StageNotFound(id.to_string()))
    }

    fn get_priority(&self, id: &str) -> Result<Priority> {
        self.list_priorities()?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| DeskError::PriorityNotFound(id.to_string()))
    }

    fn settings(&self) -> Result<Settings> {
        Ok(Settings::from_map(&self.settings_map()?))
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open an initialized data directory.
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::desk_dir(root).is_dir() {
            return Err(DeskError::NotInitialized);
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create the directory tree if needed and open it.
    pub fn create(root: &Path) -> Result<Self> {
        io::ensure_dir(&paths::cards_dir(root))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_yaml_list<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    fn write_yaml<T: serde::Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let data = serde_yaml::to_string(value)?;
        io::atomic_write(path, data.as_bytes())
    }

    fn card_path(&self, id: &str) -> Result<PathBuf> {
        if !paths::is_valid_id(id) {
            return Err(DeskError::CardNotFound(id.to_string()));
        }
        Ok(paths::card_path(&self.root, id))
    }
}

impl RecordStore for FileStore {
    fn list_stages(&self) -> Result<Vec<Stage>> {
        let mut stages: Vec<Stage> = self.read_yaml_list(&paths::stages_path(&self.root))?;
        sort_stages(&mut stages);
        Ok(stages)
    }

    fn save_stages(&self, stages: &[Stage]) -> Result<()> {
        self.write_yaml(&paths::stages_path(&self.root), stages)
    }

    fn list_priorities(&self) -> Result<Vec<Priority>> {
        let mut priorities: Vec<Priority> =
            self.read_yaml_list(&paths::priorities_path(&self.root))?;
        priorities.sort_by_key(|p| p.order);
        Ok(priorities)
    }

    fn save_priorities(&self, priorities: &[Priority]) -> Result<()> {
        self.write_yaml(&paths::priorities_path(&self.root), priorities)
    }

    fn list_cards(&self) -> Result<Vec<Card>> {
        let dir = paths::cards_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut cards = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            cards.push(serde_yaml::from_str::<Card>(&data)?);
        }
        // Newest first, like the board.
        cards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cards)
    }

    fn get_card(&self, id: &str) -> Result<Card> {
        let path = self.card_path(id)?;
        if !path.exists() {
            return Err(DeskError::CardNotFound(id.to_string()));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    fn insert_card(&self, card: &Card) -> Result<()> {
        let path = self.card_path(&card.id)?;
        self.write_yaml(&path, card)
    }

    fn update_card(&self, card: &Card) -> Result<()> {
        let path = self.card_path(&card.id)?;
        if !path.exists() {
            return Err(DeskError::CardNotFound(card.id.clone()));
        }
        self.write_yaml(&path, card)
    }

    fn append_history(&self, entry: &CardHistory) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        io::append_line(&paths::history_path(&self.root), &line)
    }

    fn list_history(&self, card_id: Option<&str>) -> Result<Vec<CardHistory>> {
        let path = paths::history_path(&self.root);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&path)?;
        let mut entries = Vec::new();
        for line in data.lines().filter(|l| !l.trim().is_empty()) {
            let entry: CardHistory = serde_json::from_str(line)?;
            if card_id.map(|id| entry.card_id == id).unwrap_or(true) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    fn settings_map(&self) -> Result<SettingsMap> {
        let path = paths::settings_path(&self.root);
        if !path.exists() {
            return Ok(SettingsMap::new());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(SettingsMap::new());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    fn save_settings_map(&self, map: &SettingsMap) -> Result<()> {
        self.write_yaml(&paths::settings_path(&self.root), map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardFields;
    use crate::history::HistoryAction;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn card(now: chrono::DateTime<Utc>) -> Card {
        let fields = CardFields {
            instruments: "Алкотестер".into(),
            delivery_address: "Минск".into(),
            contacts: "+375".into(),
            organization: "ООО".into(),
            ..CardFields::default()
        };
        Card::new(fields, "s1", "p1", "system", now)
    }

    #[test]
    fn open_requires_init() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            FileStore::open(dir.path()),
            Err(DeskError::NotInitialized)
        ));
        FileStore::create(dir.path()).unwrap();
        assert!(FileStore::open(dir.path()).is_ok());
    }

    #[test]
    fn card_crud() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let now = Utc::now();
        let mut c = card(now);
        store.insert_card(&c).unwrap();
        assert_eq!(store.get_card(&c.id).unwrap(), c);

        c.organization = "ООО Ромашка".into();
        store.update_card(&c).unwrap();
        assert_eq!(store.get_card(&c.id).unwrap().organization, "ООО Ромашка");

        assert_eq!(store.list_cards().unwrap().len(), 1);
        assert!(matches!(
            store.get_card("missing"),
            Err(DeskError::CardNotFound(_))
        ));
    }

    #[test]
    fn update_missing_card_fails() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let c = card(Utc::now());
        assert!(matches!(
            store.update_card(&c),
            Err(DeskError::CardNotFound(_))
        ));
    }

    #[test]
    fn traversal_ids_are_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        assert!(matches!(
            store.get_card("../settings"),
            Err(DeskError::CardNotFound(_))
        ));
    }

    #[test]
    fn cards_list_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let now = Utc::now();
        let old = card(now - Duration::days(1));
        let new = card(now);
        store.insert_card(&old).unwrap();
        store.insert_card(&new).unwrap();
        let ids: Vec<_> = store.list_cards().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
    }

    #[test]
    fn stages_come_back_ordered() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        store
            .save_stages(&[Stage::new("second", 2), Stage::new("first", 1)])
            .unwrap();
        let stages = store.list_stages().unwrap();
        assert_eq!(stages[0].name, "first");
        let found = store.get_stage(&stages[1].id).unwrap();
        assert_eq!(found.name, "second");
        assert!(matches!(
            store.get_stage("nope"),
            Err(DeskError::StageNotFound(_))
        ));
    }

    #[test]
    fn history_filters_by_card() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        let now = Utc::now();
        store
            .append_history(&CardHistory::new("a", None, HistoryAction::Created, now))
            .unwrap();
        store
            .append_history(&CardHistory::new("b", None, HistoryAction::Created, now))
            .unwrap();
        store
            .append_history(&CardHistory::new("a", Some("u".into()), HistoryAction::Closed, now))
            .unwrap();
        assert_eq!(store.list_history(None).unwrap().len(), 3);
        let a = store.list_history(Some("a")).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[1].action, HistoryAction::Closed);
    }

    #[test]
    fn settings_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::create(dir.path()).unwrap();
        assert!(store.settings_map().unwrap().is_empty());
        let mut map = SettingsMap::new();
        map.insert("telegramChatId".into(), "-1001".into());
        store.save_settings_map(&map).unwrap();
        assert_eq!(store.settings().unwrap().chat_id.as_deref(), Some("-1001"));
    }
}
