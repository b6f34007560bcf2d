//! Configuration for moksha-karma

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::KarmaError;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moksha-karma")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the database and config file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite database file name, relative to `data_dir`
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Seconds between accrual runs
    #[serde(default = "default_accrual_interval")]
    pub accrual_interval_secs: u64,

    /// Seconds between reminder runs
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,

    /// A life reminded within this many days is not reminded again
    #[serde(default = "default_reminder_window_days")]
    pub reminder_window_days: u32,

    /// Public site URL used in outbound mail
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Outbound SMTP relay; mail is only logged when absent
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

/// SMTP relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    pub username: String,

    pub password: String,

    /// Envelope sender address
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,
}

fn default_database_file() -> String {
    "karma.db".to_string()
}

fn default_accrual_interval() -> u64 {
    3600
}

fn default_reminder_interval() -> u64 {
    7 * 24 * 3600
}

fn default_reminder_window_days() -> u32 {
    28
}

fn default_site_url() -> String {
    "https://moksha.example".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_sender_name() -> String {
    "Moksha Protocol".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            accrual_interval_secs: default_accrual_interval(),
            reminder_interval_secs: default_reminder_interval(),
            reminder_window_days: default_reminder_window_days(),
            site_url: default_site_url(),
            smtp: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KarmaError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| KarmaError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), KarmaError> {
        let content = toml::to_string_pretty(self).map_err(|e| KarmaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<(), KarmaError> {
        if self.accrual_interval_secs == 0 {
            return Err(KarmaError::Config("accrual_interval_secs must be positive".into()));
        }
        if self.reminder_interval_secs == 0 {
            return Err(KarmaError::Config("reminder_interval_secs must be positive".into()));
        }
        if let Some(smtp) = &self.smtp {
            if smtp.host.trim().is_empty() {
                return Err(KarmaError::Config("smtp.host is empty".into()));
            }
            if !smtp.sender_email.contains('@') {
                return Err(KarmaError::Config(format!(
                    "smtp.sender_email '{}' is not an address",
                    smtp.sender_email
                )));
            }
        }
        Ok(())
    }

    pub fn accrual_interval(&self) -> Duration {
        Duration::from_secs(self.accrual_interval_secs)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    pub fn reminder_window(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.reminder_window_days))
    }

    /// Get database path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
