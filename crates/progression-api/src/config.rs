use std::env;
use std::path::PathBuf;

pub const SQLITE_PATH_ENV: &str = "PROGRESSION_SQLITE_PATH";
pub const CATALOG_PATH_ENV: &str = "PROGRESSION_CATALOG_PATH";

/// Where the tracker keeps its state and which reference catalog it reads.
/// `None` means in-memory state and the built-in catalog respectively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerConfig {
    pub sqlite_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
}

impl TrackerConfig {
    pub fn from_env() -> Self {
        Self {
            sqlite_path: env_path(SQLITE_PATH_ENV),
            catalog_path: env_path(CATALOG_PATH_ENV),
        }
    }

    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite_path = Some(path.into());
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
