use std::env;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::error::Result;

/// Overrides the platform save directory.
pub const SAVE_DIR_ENV: &str = "W3R_SAVE_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveFileInfo {
    pub path: PathBuf,
    pub modified: DateTime<Local>,
}

/// `$W3R_SAVE_DIR`, else `<profile>/Documents/The Witcher 3/gamesaves`.
pub fn default_save_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os(SAVE_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }
    let profile = env::var_os("USERPROFILE").or_else(|| env::var_os("HOME"))?;
    Some(
        PathBuf::from(profile)
            .join("Documents")
            .join("The Witcher 3")
            .join("gamesaves"),
    )
}

pub fn is_save_file(p: &Path) -> bool {
    p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("sav")
}

/// `.sav` files directly inside `dir`, sorted by path.
pub fn find_save_files(dir: &Path) -> Result<Vec<SaveFileInfo>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        let path = entry.path();
        if !is_save_file(path) {
            continue;
        }
        let modified = entry
            .metadata()
            .map_err(|e| std::io::Error::other(e.to_string()))?
            .modified()?;
        out.push(SaveFileInfo {
            path: path.to_path_buf(),
            modified: DateTime::<Local>::from(modified),
        });
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// Most recently modified save in `dir`.
pub fn latest_save(dir: &Path) -> Result<Option<SaveFileInfo>> {
    Ok(find_save_files(dir)?
        .into_iter()
        .max_by_key(|s| s.modified))
}
