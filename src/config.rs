//! Settings file parser for `<base>/settings.toml`, plus the on-disk layout
//! of the application base directory.
//!
//! The settings file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted, though we log a warning when the file contains
//! potential typos.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Settings file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Application settings.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Refresh workers per cycle. `None` uses the host's available
    /// parallelism; 0 is treated as 1.
    pub workers: Option<usize>,

    /// Seconds a worker waits on an empty queue before re-checking whether
    /// the cycle is still active. 0 is treated as 1.
    pub queue_wait_secs: u64,

    /// Milliseconds between checks for a drained queue.
    pub poll_interval_ms: u64,

    /// HTTP request timeout for feed fetches, in seconds.
    pub fetch_timeout_secs: u64,

    /// Default log level, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: None,
            queue_wait_secs: 3,
            poll_interval_ms: 250,
            fetch_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Maximum settings file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "workers",
        "queue_wait_secs",
        "poll_interval_ms",
        "fetch_timeout_secs",
        "log_level",
    ];

    /// Load settings from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Settings file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No settings file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Settings file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Settings file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in settings file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "Loaded settings");
        Ok(config)
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Files and folders under the application base directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub base: PathBuf,
}

impl AppPaths {
    const DIR_NAME: &'static str = ".podroll.d";

    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// `$HOME/.podroll.d`
    pub fn from_home() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(Self::new(PathBuf::from(home).join(Self::DIR_NAME)))
    }

    pub fn database(&self) -> PathBuf {
        self.base.join("podroll.db")
    }

    pub fn log_file(&self) -> PathBuf {
        self.base.join("podroll.log")
    }

    pub fn settings(&self) -> PathBuf {
        self.base.join("settings.toml")
    }

    /// Root under which each feed gets its media folder.
    pub fn downloads(&self) -> PathBuf {
        self.base.join("downloads")
    }

    /// Create the base and download directories if missing.
    pub fn ensure(&self) -> Result<()> {
        let downloads = self.downloads();
        std::fs::create_dir_all(&downloads).with_context(|| {
            format!(
                "Failed to create application directory '{}'",
                downloads.display()
            )
        })?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
