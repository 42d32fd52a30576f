//! First-run data: the default workflow, tiers and settings.

use crate::board::{Priority, Stage};
use crate::error::Result;
use crate::settings;
use crate::store::FileStore;
use crate::{io, paths};
use serde::Serialize;
use std::path::Path;

/// (name, yellow days, red days) in pipeline order.
const DEFAULT_STAGES: &[(&str, Option<u32>, Option<u32>)] = &[
    ("Заявка принята", Some(1), Some(3)),
    ("В пути в СЦ", Some(2), Some(5)),
    ("Принят в СЦ", Some(1), Some(3)),
    ("Ожидает ТО", Some(2), Some(5)),
    ("На ТО", Some(3), Some(7)),
    ("Ожидает ЦСМС", Some(2), Some(5)),
    ("В ЦСМС", Some(3), Some(7)),
    ("После ЦСМС", Some(1), Some(3)),
    ("Ожидает отправки", Some(2), Some(5)),
    ("Отправлен клиенту", None, None),
    ("Ожидает оплату", Some(5), Some(10)),
];

const DEFAULT_PRIORITIES: &[(&str, &str)] = &[
    ("normal", "#52c41a"),
    ("warn", "#faad14"),
    ("crit", "#ff4d4f"),
];

pub fn default_stages() -> Vec<Stage> {
    DEFAULT_STAGES
        .iter()
        .zip(1..)
        .map(|(&(name, yellow, red), order)| Stage::new(name, order).with_limits(yellow, red))
        .collect()
}

pub fn default_priorities() -> Vec<Priority> {
    DEFAULT_PRIORITIES
        .iter()
        .zip(1..)
        .map(|(&(name, color), order)| Priority::new(name, color, order))
        .collect()
}

/// Which files `init` actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub stages: bool,
    pub priorities: bool,
    pub settings: bool,
}

/// Create the data directory and seed whatever is missing. Existing files
/// are never touched, so running it twice is harmless.
pub fn init(root: &Path) -> Result<(FileStore, InitReport)> {
    let store = FileStore::create(root)?;
    let report = InitReport {
        stages: io::write_if_missing(
            &paths::stages_path(root),
            serde_yaml::to_string(&default_stages())?.as_bytes(),
        )?,
        priorities: io::write_if_missing(
            &paths::priorities_path(root),
            serde_yaml::to_string(&default_priorities())?.as_bytes(),
        )?,
        settings: io::write_if_missing(
            &paths::settings_path(root),
            serde_yaml::to_string(&settings::default_map())?.as_bytes(),
        )?,
    };
    tracing::info!(root = %root.display(), ?report, "data directory initialized");
    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::store::RecordStore;
    use tempfile::TempDir;

    #[test]
    fn seeds_defaults() {
        let dir = TempDir::new().unwrap();
        let (store, report) = init(dir.path()).unwrap();
        assert_eq!(
            report,
            InitReport {
                stages: true,
                priorities: true,
                settings: true
            }
        );

        let stages = store.list_stages().unwrap();
        assert_eq!(stages.len(), 11);
        assert_eq!(stages[0].name, "Заявка принята");
        assert_eq!(stages[4].yellow_limit, Some(3));
        assert_eq!(stages[4].red_limit, Some(7));
        assert_eq!(stages[9].red_limit, None);

        let priorities = store.list_priorities().unwrap();
        let names: Vec<_> = priorities.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["normal", "warn", "crit"]);

        assert_eq!(store.settings().unwrap(), Settings::default());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (store, _) = init(dir.path()).unwrap();
        let ids: Vec<_> = store.list_stages().unwrap().into_iter().map(|s| s.id).collect();

        let (store, report) = init(dir.path()).unwrap();
        assert_eq!(report, InitReport::default());
        let again: Vec<_> = store.list_stages().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, again);
    }
}
