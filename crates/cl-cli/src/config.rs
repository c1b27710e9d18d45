//! Configuration loading and management.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Directory holding one log file per day.
    pub chatlog_dir: PathBuf,
    pub fetch: FetchConfig,
}

/// Settings for downloading logs from the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub url: String,
    /// First day the archive has a log for.
    pub first_date: NaiveDate,
    pub max_attempts: u32,
    /// Pause between attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            url: "http://arklegacy.duckdns.org/chat.html".to_string(),
            first_date: NaiveDate::from_ymd_opt(2017, 7, 3).unwrap_or_default(),
            max_attempts: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("chatlog.db"),
            chatlog_dir: data_dir.join("logs"),
            fetch: FetchConfig::default(),
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

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (CL_*, nested keys split on `__`)
        figment = figment.merge(Env::prefixed("CL_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for chatlog.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("chatlog"))
}

/// Returns the platform-specific data directory for chatlog.
///
/// On Linux: `~/.local/share/chatlog`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("chatlog"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_chatlog() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "chatlog");
    }

    #[test]
    fn test_default_config_uses_data_dir() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("chatlog.db"));
        assert_eq!(config.chatlog_dir, data_dir.join("logs"));
        assert_eq!(config.fetch.first_date.to_string(), "2017-07-03");
        assert_eq!(config.fetch.max_attempts, 3);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "chatlog_dir = \"/srv/logs\"\n\n[fetch]\nmax_attempts = 5\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.chatlog_dir, PathBuf::from("/srv/logs"));
        assert_eq!(config.fetch.max_attempts, 5);
        assert_eq!(config.fetch.retry_delay_secs, 2);
    }

    #[test]
    fn test_malformed_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[fetch]\nmax_attempts = \"many\"\n").unwrap();

        assert!(Config::load_from(Some(&path)).is_err());
    }
}
