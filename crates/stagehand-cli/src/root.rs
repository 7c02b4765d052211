use stagehand_core::config::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve which config file to load.
///
/// Priority:
/// 1. `--config` flag / `STAGEHAND_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `stagehand.yaml`
/// 3. None: built-in defaults
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let cwd = std::env::current_dir().ok()?;
    find_upward(&cwd)
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}
