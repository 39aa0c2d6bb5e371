//! Configuration file for ~/.config/gator/config.toml.
//!
//! The file is optional; a missing file yields `Config::default()`. Besides
//! user settings it holds `current_user_name`, which `register` and `login`
//! rewrite via [`Config::save`].
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Relative paths resolve against the config
    /// file's directory; unset means `gator.db` next to the config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// User that commands act as. Set by `register` and `login`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_user_name: Option<String>,

    /// Sent as the `User-Agent` header on every feed request.
    pub user_agent: String,

    /// Upper bound on a single feed request, in seconds.
    pub fetch_timeout_secs: u64,

    /// Upper bound on fetching plus storing one feed, in seconds.
    pub feed_budget_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            current_user_name: None,
            user_agent: "gator".to_string(),
            fetch_timeout_secs: 30,
            feed_budget_secs: 120,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "current_user_name",
    "user_agent",
    "fetch_timeout_secs",
    "feed_budget_secs",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.config/gator`, or `./.gator` when no home directory is known.
    pub fn default_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("gator"))
            .unwrap_or_else(|| PathBuf::from(".gator"))
    }

    pub fn default_path() -> PathBuf {
        Self::default_dir().join("config.toml")
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            user = ?config.current_user_name,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Write the configuration to `path`.
    ///
    /// The file is written to a sibling temp file and renamed into place, so
    /// a crash never leaves a half-written config. On Unix the file is
    /// readable by the owner only.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let tmp_path = path.with_extension("toml.tmp");
        {
            let mut options = std::fs::OpenOptions::new();
            options.write(true).create(true).truncate(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(ConfigError::Io(e));
        }

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Resolve the database file for a config loaded from `config_path`.
    pub fn database_path(&self, config_path: &Path) -> PathBuf {
        let base = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        match &self.database_path {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            Some(p) => base.join(p),
            None => base.join("gator.db"),
        }
    }

    pub fn set_current_user(&mut self, name: &str) {
        self.current_user_name = Some(name.to_string());
    }
}

// ============================================================================
// Tests
// ============================================================================
