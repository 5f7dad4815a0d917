//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tg_core::{GuardConfig, MatchPolicy};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Period of the usage flush tick.
    pub flush_interval_ms: u64,
    /// Period of the alarm check.
    pub alarm_check_interval_ms: u64,

    /// Extension page shown in the warning popup.
    pub warning_page: String,
    pub warning_width: u32,
    pub warning_height: u32,
    pub warning_close_ms: i64,
    pub ui_settle_ms: i64,

    pub notification_title: String,
    pub notification_message: String,
    pub notification_icon: String,

    /// How blacklist entries match hostnames.
    pub match_policy: MatchPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let guard = GuardConfig::default();
        Self {
            database_path: data_dir.join("tabguard.db"),
            flush_interval_ms: 3_000,
            alarm_check_interval_ms: 1_000,
            warning_page: guard.warning_page,
            warning_width: guard.warning_width,
            warning_height: guard.warning_height,
            warning_close_ms: guard.warning_close_ms,
            ui_settle_ms: guard.ui_settle_ms,
            notification_title: guard.notification_title,
            notification_message: guard.notification_message,
            notification_icon: guard.notification_icon,
            match_policy: guard.match_policy,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TABGUARD_"));

        figment.extract()
    }

    /// Settings for the focus guard.
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            warning_page: self.warning_page.clone(),
            warning_width: self.warning_width,
            warning_height: self.warning_height,
            warning_close_ms: self.warning_close_ms,
            ui_settle_ms: self.ui_settle_ms,
            notification_title: self.notification_title.clone(),
            notification_message: self.notification_message.clone(),
            notification_icon: self.notification_icon.clone(),
            match_policy: self.match_policy,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn alarm_check_interval(&self) -> Duration {
        Duration::from_millis(self.alarm_check_interval_ms.max(1))
    }
}

/// Returns the platform-specific config directory for tabguard.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tabguard"))
}

/// Returns the platform-specific data directory for tabguard.
///
/// On Linux: `~/.local/share/tabguard`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tabguard"))
}
