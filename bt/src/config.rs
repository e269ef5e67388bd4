//! BreakTime configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::BreakCategory;
use crate::state::{DEFAULT_LOOKBACK_DAYS, DEFAULT_REASON_TIMEOUT_SECS, MAX_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS};
use crate::sync::BreakerConfig;

/// Main BreakTime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event log location
    pub storage: StorageConfig,

    /// Reminder thresholds and cadence
    pub reminders: ReminderConfig,

    /// Orphan recovery and admin reset
    pub recovery: RecoveryConfig,

    /// Remote sheet replication
    pub sync: SyncConfig,

    /// End-of-day report
    pub report: ReportConfig,
}

impl Config {
    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        let lookback = self.recovery.lookback_days;
        if !(MIN_LOOKBACK_DAYS..=MAX_LOOKBACK_DAYS).contains(&lookback) {
            return Err(eyre::eyre!(
                "recovery.lookback-days must be between {} and {}, got {}",
                MIN_LOOKBACK_DAYS,
                MAX_LOOKBACK_DAYS,
                lookback
            ));
        }

        if self.reminders.interval_secs == 0 {
            return Err(eyre::eyre!("reminders.interval-secs must be greater than zero"));
        }

        if self.sync.enabled {
            if self.sync.file_id.trim().is_empty() {
                return Err(eyre::eyre!("sync.file-id is required when sync is enabled"));
            }
            if std::env::var(&self.sync.token_env).is_err() {
                return Err(eyre::eyre!(
                    "Sync token not found. Set the {} environment variable.",
                    self.sync.token_env
                ));
            }
        }
        Ok(())
    }

    /// `--config`, then `./.breaktime.yml`, then the user config dir, then defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // An explicit path must load
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .breaktime.yml
        let local_config = PathBuf::from(".breaktime.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/breaktime/breaktime.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("breaktime").join("breaktime.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map(|home| home.join(rest)).unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the event log and runtime files
    #[serde(rename = "data-dir")]
    pub data_dir: String,

    /// File name prefix of every day partition
    #[serde(rename = "file-prefix")]
    pub file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("breaktime"))
            .unwrap_or_else(|| PathBuf::from(".breaktime"));
        Self {
            data_dir: data_dir.to_string_lossy().to_string(),
            file_prefix: "break_logs".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }

    /// Directory holding the monthly partition folders
    pub fn database_path(&self) -> PathBuf {
        self.data_path().join("database")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_path().join("logs")
    }
}

/// Reminder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Seconds between scheduler ticks
    #[serde(rename = "interval-secs")]
    pub interval_secs: u64,

    #[serde(rename = "meal-minutes")]
    pub meal_minutes: Option<u32>,

    #[serde(rename = "restroom-minutes")]
    pub restroom_minutes: Option<u32>,

    #[serde(rename = "smoke-minutes")]
    pub smoke_minutes: Option<u32>,

    #[serde(rename = "other-minutes")]
    pub other_minutes: Option<u32>,

    /// How long a break may wait for its reason
    #[serde(rename = "reason-timeout-secs")]
    pub reason_timeout_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            meal_minutes: BreakCategory::Meal.default_reminder_minutes(),
            restroom_minutes: BreakCategory::Restroom.default_reminder_minutes(),
            smoke_minutes: BreakCategory::Smoke.default_reminder_minutes(),
            other_minutes: BreakCategory::Other.default_reminder_minutes(),
            reason_timeout_secs: DEFAULT_REASON_TIMEOUT_SECS as u64,
        }
    }
}

impl ReminderConfig {
    /// Threshold in minutes for `category`, if it is reminded at all
    pub fn threshold(&self, category: BreakCategory) -> Option<u32> {
        match category {
            BreakCategory::Meal => self.meal_minutes,
            BreakCategory::Restroom => self.restroom_minutes,
            BreakCategory::Smoke => self.smoke_minutes,
            BreakCategory::Other => self.other_minutes,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reason_timeout(&self) -> chrono::Duration {
        let secs = i64::try_from(self.reason_timeout_secs).unwrap_or(i64::MAX);
        chrono::Duration::seconds(secs.min(i64::MAX / 1000))
    }
}

/// Recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Days of log replayed by reconciliation, today included
    #[serde(rename = "lookback-days")]
    pub lookback_days: u32,

    /// Flag file whose appearance requests a reset; defaults to `<data-dir>/reset.flag`
    #[serde(rename = "reset-flag")]
    pub reset_flag: Option<String>,

    /// Seconds between checks for the flag file
    #[serde(rename = "poll-secs")]
    pub poll_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            reset_flag: None,
            poll_secs: 10,
        }
    }
}

impl RecoveryConfig {
    pub fn reset_flag_path(&self, storage: &StorageConfig) -> PathBuf {
        match &self.reset_flag {
            Some(path) => expand_home(path),
            None => storage.data_path().join("reset.flag"),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(1))
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Workbook holding the break table
    #[serde(rename = "file-id")]
    pub file_id: String,

    #[serde(rename = "table-name")]
    pub table_name: String,

    /// Environment variable containing the bearer token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Consecutive failures that open the circuit
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,

    /// Hard limit on one push in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Events buffered before new ones are dropped
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            file_id: String::new(),
            table_name: "BreakLog".to_string(),
            token_env: "GRAPH_ACCESS_TOKEN".to_string(),
            failure_threshold: 3,
            cooldown_secs: 300,
            timeout_ms: 5000,
            queue_capacity: 256,
        }
    }
}

impl SyncConfig {
    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            cooldown: Duration::from_secs(self.cooldown_secs),
            call_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Read the bearer token from the configured environment variable
    pub fn get_token(&self) -> Result<String> {
        std::env::var(&self.token_env).context(format!("Environment variable {} not set", self.token_env))
    }
}

/// End-of-day report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,

    /// Send each person their day summary
    #[serde(rename = "send-summaries")]
    pub send_summaries: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            send_summaries: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.reminders.interval_secs, 60);
        assert_eq!(config.reminders.threshold(BreakCategory::Meal), Some(60));
        assert_eq!(config.reminders.threshold(BreakCategory::Smoke), Some(15));
        assert_eq!(config.reminders.threshold(BreakCategory::Restroom), None);
        assert_eq!(config.recovery.lookback_days, 3);
        assert!(!config.sync.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
storage:
  data-dir: /srv/breaktime
  file-prefix: logs

reminders:
  interval-secs: 30
  smoke-minutes: 10
  restroom-minutes: 20

recovery:
  lookback-days: 5
  reset-flag: /tmp/reset-me

sync:
  enabled: true
  file-id: ABC123
  table-name: Breaks
  failure-threshold: 4
  cooldown-secs: 60
  timeout-ms: 2500
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.storage.database_path(), PathBuf::from("/srv/breaktime/database"));
        assert_eq!(config.storage.file_prefix, "logs");
        assert_eq!(config.reminders.threshold(BreakCategory::Smoke), Some(10));
        assert_eq!(config.reminders.threshold(BreakCategory::Restroom), Some(20));
        assert_eq!(config.reminders.threshold(BreakCategory::Meal), Some(60));
        assert_eq!(config.recovery.lookback_days, 5);
        assert_eq!(
            config.recovery.reset_flag_path(&config.storage),
            PathBuf::from("/tmp/reset-me")
        );

        let breaker = config.sync.breaker();
        assert_eq!(breaker.failure_threshold, 4);
        assert_eq!(breaker.cooldown, Duration::from_secs(60));
        assert_eq!(breaker.call_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
reminders:
  meal-minutes: 45
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.reminders.threshold(BreakCategory::Meal), Some(45));
        assert_eq!(config.reminders.reason_timeout_secs, 600);
        assert_eq!(config.sync.table_name, "BreakLog");
        assert_eq!(
            config.recovery.reset_flag_path(&config.storage),
            config.storage.data_path().join("reset.flag")
        );
    }

    #[test]
    fn test_validate_rejects_bad_lookback() {
        let mut config = Config::default();
        config.recovery.lookback_days = 0;
        assert!(config.validate().is_err());
        config.recovery.lookback_days = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_validate_sync_requires_token() {
        let mut config = Config::default();
        config.sync.enabled = true;
        config.sync.file_id = "ABC".to_string();
        config.sync.token_env = "BREAKTIME_TEST_SYNC_TOKEN".to_string();

        unsafe { std::env::remove_var("BREAKTIME_TEST_SYNC_TOKEN") };
        assert!(config.validate().is_err());

        unsafe { std::env::set_var("BREAKTIME_TEST_SYNC_TOKEN", "secret") };
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.get_token().unwrap(), "secret");
        unsafe { std::env::remove_var("BREAKTIME_TEST_SYNC_TOKEN") };
    }
}
