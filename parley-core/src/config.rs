//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/parley/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/parley/` (~/.config/parley/)
//! - Data: `$XDG_DATA_HOME/parley/` (~/.local/share/parley/)
//! - State/Logs: `$XDG_STATE_HOME/parley/` (~/.local/state/parley/)

use crate::entities::EntityCatalog;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Intent classifier tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Per-user action history bounds
    #[serde(default)]
    pub history: HistoryConfig,

    /// Response cache bounds
    #[serde(default)]
    pub cache: CacheConfig,

    /// Conversation thread store bounds
    #[serde(default)]
    pub threads: ThreadConfig,

    /// Known repos and companies
    #[serde(default)]
    pub entities: EntityCatalog,

    /// Experiment framework settings
    #[serde(default)]
    pub experiments: ExperimentConfig,
}

/// Relative weight of each confidence factor.
///
/// The score is normalized by the weight sum, so the weights need not add
/// up to exactly 1.0, only to something positive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ConfidenceWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_context_weight")]
    pub context: f64,
    #[serde(default = "default_history_weight")]
    pub history: f64,
    #[serde(default = "default_specificity_weight")]
    pub specificity: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword_weight(),
            context: default_context_weight(),
            history: default_history_weight(),
            specificity: default_specificity_weight(),
        }
    }
}

impl ConfidenceWeights {
    pub fn sum(&self) -> f64 {
        self.keyword + self.context + self.history + self.specificity
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            ("keyword", self.keyword),
            ("context", self.context),
            ("history", self.history),
            ("specificity", self.specificity),
        ];
        for (name, value) in all {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidWeights(format!(
                    "{name} weight {value} must be between 0 and 1"
                )));
            }
        }
        if self.sum() <= 0.0 {
            return Err(Error::InvalidWeights(
                "weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_keyword_weight() -> f64 {
    0.4
}

fn default_context_weight() -> f64 {
    0.25
}

fn default_history_weight() -> f64 {
    0.15
}

fn default_specificity_weight() -> f64 {
    0.2
}

/// Intent classifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub weights: ConfidenceWeights,

    /// Below this confidence a result is ambiguous and needs a clarifying question
    #[serde(default = "default_clarification_threshold")]
    pub clarification_threshold: f64,

    /// Below this confidence the intent is reported as unknown
    #[serde(default = "default_unknown_threshold")]
    pub unknown_threshold: f64,

    /// Maximum edit distance for correcting a misspelled command verb
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,

    /// Confidence multiplier per recorded correction: `1 / (1 + penalty * count)`
    #[serde(default = "default_correction_penalty")]
    pub correction_penalty: f64,

    /// Recent corrections retained for inspection
    #[serde(default = "default_correction_log_size")]
    pub correction_log_size: usize,

    /// Target words that mark a production environment
    #[serde(default = "default_production_markers")]
    pub production_markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            weights: ConfidenceWeights::default(),
            clarification_threshold: default_clarification_threshold(),
            unknown_threshold: default_unknown_threshold(),
            max_edit_distance: default_max_edit_distance(),
            correction_penalty: default_correction_penalty(),
            correction_log_size: default_correction_log_size(),
            production_markers: default_production_markers(),
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        validate_thresholds(self.clarification_threshold, self.unknown_threshold)?;
        if self.correction_penalty <= 0.0 {
            return Err(Error::Config(
                "classifier.correction_penalty must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Check a clarification/unknown threshold pair.
pub fn validate_thresholds(clarification: f64, unknown: f64) -> Result<()> {
    check_unit("clarification_threshold", clarification)?;
    check_unit("unknown_threshold", unknown)?;
    if unknown > clarification {
        return Err(Error::InvalidThreshold {
            name: "unknown_threshold",
            value: unknown,
            reason: format!("must not exceed clarification_threshold ({clarification})"),
        });
    }
    Ok(())
}

fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidThreshold {
            name,
            value,
            reason: "must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

fn default_clarification_threshold() -> f64 {
    0.6
}

fn default_unknown_threshold() -> f64 {
    0.3
}

fn default_max_edit_distance() -> usize {
    2
}

fn default_correction_penalty() -> f64 {
    0.25
}

fn default_correction_log_size() -> usize {
    500
}

fn default_production_markers() -> Vec<String> {
    ["prod", "production", "live", "main", "master"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Per-user action history bounds
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// Actions remembered per user
    #[serde(default = "default_actions_per_user")]
    pub max_actions_per_user: usize,

    /// Users tracked before the least recently seen is evicted
    #[serde(default = "default_max_users")]
    pub max_users: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_actions_per_user: default_actions_per_user(),
            max_users: default_max_users(),
        }
    }
}

fn default_actions_per_user() -> usize {
    20
}

fn default_max_users() -> usize {
    1000
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Seconds before an entry is stale
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_capacity() -> usize {
    500
}

fn default_cache_ttl() -> u64 {
    300
}

/// Conversation thread store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadConfig {
    /// Repos remembered per chat for "the other one"
    #[serde(default = "default_repo_history")]
    pub repo_history: usize,

    /// Chats tracked before the least recently active is evicted
    #[serde(default = "default_max_chats")]
    pub max_chats: usize,

    /// Minutes of inactivity before a chat's state is dropped
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            repo_history: default_repo_history(),
            max_chats: default_max_chats(),
            idle_minutes: default_idle_minutes(),
        }
    }
}

fn default_repo_history() -> usize {
    5
}

fn default_max_chats() -> usize {
    1000
}

fn default_idle_minutes() -> u64 {
    60
}

/// Experiment framework configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExperimentConfig {
    /// Where ended experiments are archived (defaults to the data dir)
    pub archive_dir: Option<PathBuf>,

    /// Experiment whose variant params drive classifier thresholds
    pub threshold_experiment: Option<String>,
}

impl ExperimentConfig {
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("experiments"))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be at least 1".to_string()));
        }
        if self.threads.max_chats == 0 || self.threads.repo_history == 0 {
            return Err(Error::Config(
                "threads.max_chats and threads.repo_history must be at least 1".to_string(),
            ));
        }
        if self.history.max_users == 0 || self.history.max_actions_per_user == 0 {
            return Err(Error::Config(
                "history.max_users and history.max_actions_per_user must be at least 1"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/parley/config.toml` (~/.config/parley/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("parley").join("config.toml")
    }

    /// Returns the data directory path (for experiment archives)
    ///
    /// `$XDG_DATA_HOME/parley/` (~/.local/share/parley/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("parley")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/parley/` (~/.local/state/parley/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("parley")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/parley/parley.log` (~/.local/state/parley/parley.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("parley.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
