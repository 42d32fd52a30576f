use repairdesk_core::paths;
use std::path::{Path, PathBuf};

/// Resolve the repairdesk root directory.
///
/// Priority:
/// 1. `--root` flag / `REPAIRDESK_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.repairdesk/`
/// 3. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_desk_dir(&cwd).unwrap_or(cwd)
}

fn find_desk_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(paths::DESK_DIR).is_dir())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let dir = TempDir::new().unwrap();
        let result = resolve_root(Some(dir.path()));
        assert_eq!(result, dir.path());
    }

    #[test]
    fn finds_desk_dir_from_subdirectory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".repairdesk")).unwrap();
        let subdir = dir.path().join("inbox/2024");
        std::fs::create_dir_all(&subdir).unwrap();

        assert_eq!(find_desk_dir(&subdir).as_deref(), Some(dir.path()));
    }

    #[test]
    fn no_desk_dir_found() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_desk_dir(dir.path()), None);
    }
}
