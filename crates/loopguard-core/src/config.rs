//! # Configuration
//!
//! Single JSON configuration document, read once per invocation. Every
//! recognized option has a default so a partial (or missing) file still
//! yields a working configuration; the tool must never refuse to make a
//! queue decision because of a config problem.
//!
//! Secrets (*arr API keys, notifier tokens) are redacted from `Debug`
//! output so configuration can be logged safely.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Errors raised while loading the configuration document.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON or has a field of the wrong shape.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Log verbosity. `ALL` logs everything, `ERROR` only errors, `INFO`
/// informational and above, `NONE` disables file logging entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    All,
    Error,
    Info,
    None,
}

impl LogLevel {
    /// Canonical uppercase name, as written in the config file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Error => "ERROR",
            Self::Info => "INFO",
            Self::None => "NONE",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(Self::All),
            "ERROR" => Ok(Self::Error),
            "INFO" => Ok(Self::Info),
            "NONE" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LogLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// An unrecognized level falls back to ALL instead of failing the whole
// document, matching the fallback applied to a missing config file.
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|_| {
            eprintln!("invalid log_level {raw:?}, using ALL");
            Self::All
        }))
    }
}

/// A configured Radarr or Sonarr instance, selected by exact category match.
#[derive(Clone, Serialize, Deserialize)]
pub struct ArrInstance {
    /// SABnzbd category this instance is responsible for.
    pub category: String,
    /// Base URL of the instance (e.g. `http://localhost:7878`).
    pub url: Url,
    /// API key for the v3 API.
    pub api_key: String,
}

impl std::fmt::Debug for ArrInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrInstance")
            .field("category", &self.category)
            .field("url", &self.url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Notifier selection and service settings.
///
/// `name` selects a variant from the notifier registry; an unknown name
/// disables notification rather than failing the handler.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub name: String,
    pub url: Option<Url>,
    pub token: Option<String>,
    pub priority: Option<i64>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: "Gotify".to_string(),
            url: None,
            token: None,
            priority: None,
        }
    }
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("enabled", &self.enabled)
            .field("name", &self.name)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("priority", &self.priority)
            .finish()
    }
}

/// The full configuration document.
///
/// Unknown keys are ignored, recognized keys override the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Duration in minutes before a history entry becomes inactive.
    pub time_window_minutes: u64,
    /// Path of the persisted download history.
    pub history_file: PathBuf,
    /// Path of the log file.
    pub log_file: PathBuf,
    /// Log file size threshold (MiB) that triggers rotation.
    pub max_log_size_mb: u64,
    /// Number of rotated log files to keep.
    pub max_log_backups: u32,
    pub log_level: LogLevel,
    /// Categories exempt from duplicate detection.
    pub ignored_categories: Vec<String>,
    /// Exempt downloads that carry no category at all.
    pub ignore_no_category: bool,
    /// Verify TLS certificates on outbound *arr/notifier calls.
    pub verify_ssl: bool,
    /// Pass the full structured event to notifiers instead of title/body.
    pub wants_raw_data: bool,
    /// Prefer the host-supplied duplicate key over name matching.
    pub use_duplicate_key: bool,
    /// Send a notification for every reconciled completion.
    pub notify_on_completion: bool,
    pub radarr_instances: Vec<ArrInstance>,
    pub sonarr_instances: Vec<ArrInstance>,
    pub notifier: NotifierConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_window_minutes: 1440,
            history_file: PathBuf::from("download_history.json"),
            log_file: PathBuf::from("loopguard.log"),
            max_log_size_mb: 10,
            max_log_backups: 3,
            log_level: LogLevel::All,
            ignored_categories: Vec::new(),
            ignore_no_category: false,
            verify_ssl: true,
            wants_raw_data: false,
            use_duplicate_key: true,
            notify_on_completion: false,
            radarr_instances: Vec::new(),
            sonarr_instances: Vec::new(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load the configuration, falling back to defaults on any problem.
    ///
    /// A missing or malformed file is reported on stderr (the log file is
    /// not configured yet at this point) and never blocks the invocation.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("config {}: {err}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// The duplicate-detection window in seconds.
    pub fn time_window_secs(&self) -> i64 {
        self.time_window_minutes as i64 * 60
    }

    /// Whether a download with this category is exempt from tracking.
    pub fn is_ignored_category(&self, category: Option<&str>) -> bool {
        match category {
            Some(cat) => self.ignored_categories.iter().any(|c| c == cat),
            None => self.ignore_no_category,
        }
    }
}
