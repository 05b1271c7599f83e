use std::path::PathBuf;

use constants::{APP_NAME, CACHE_SUBDIR};

pub fn get_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|p| p.join(APP_NAME))
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME))
}

pub fn get_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(APP_NAME))
}

/// Root directory the coordinator's LRU file cache is rooted under:
/// `<cache_dir>/http_cache`.
pub fn cache_root() -> Option<PathBuf> {
    get_cache_path().map(|p| p.join(CACHE_SUBDIR))
}

/// Path to the external key/value persistence file, `<documents>/_persist_values`.
pub fn persist_values_path() -> Option<PathBuf> {
    get_data_path().map(|p| p.join("_persist_values"))
}

pub fn create_paths(path: &PathBuf) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
