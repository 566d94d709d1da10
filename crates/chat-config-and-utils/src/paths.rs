//! File system paths for chatsync.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for config, database, and logs (~/.chatsync)
    base_dir: PathBuf,
}

impl Paths {
    /// Uses `~/.chatsync`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(".chatsync"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.chatsync).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.chatsync/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the local message database path (~/.chatsync/chatsync.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join("chatsync.sqlite")
    }

    /// Get the logs directory (~/.chatsync/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.chatsync/logs/chatsync.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("chatsync.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
