use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DESK_DIR: &str = ".repairdesk";
pub const CARDS_DIR: &str = ".repairdesk/cards";

pub const STAGES_FILE: &str = ".repairdesk/stages.yaml";
pub const PRIORITIES_FILE: &str = ".repairdesk/priorities.yaml";
pub const SETTINGS_FILE: &str = ".repairdesk/settings.yaml";
pub const HISTORY_FILE: &str = ".repairdesk/history.jsonl";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn desk_dir(root: &Path) -> PathBuf {
    root.join(DESK_DIR)
}

pub fn cards_dir(root: &Path) -> PathBuf {
    root.join(CARDS_DIR)
}

pub fn card_path(root: &Path, id: &str) -> PathBuf {
    cards_dir(root).join(format!("{id}.yaml"))
}

pub fn stages_path(root: &Path) -> PathBuf {
    root.join(STAGES_FILE)
}

pub fn priorities_path(root: &Path) -> PathBuf {
    root.join(PRIORITIES_FILE)
}

pub fn settings_path(root: &Path) -> PathBuf {
    root.join(SETTINGS_FILE)
}

pub fn history_path(root: &Path) -> PathBuf {
    root.join(HISTORY_FILE)
}

/// Card ids become file names; only uuid-like ids are accepted so a crafted
/// id can never escape `cards/`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_path_is_under_cards_dir() {
        let p = card_path(Path::new("/srv"), "abc");
        assert_eq!(p, PathBuf::from("/srv/.repairdesk/cards/abc.yaml"));
    }

    #[test]
    fn rejects_path_like_ids() {
        assert!(is_valid_id("0b6f2c1e-8a43-4c59-9e0e-2a1f3a7c9d10"));
        assert!(!is_valid_id("../etc/passwd"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("a/b"));
    }
}
