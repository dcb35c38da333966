// Runtime configuration: built-in defaults, then an optional TOML file, then
// DELAY_WATCH_* environment variables.
//
// Example file:
//
//   endpoint_url = "https://api.tfl.gov.uk/Line/Mode/tube/Status"
//   poll_interval_secs = 30
//   retention_days = 7
//   timezone = "Europe/London"

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::fetcher::DEFAULT_STATUS_URL;
use crate::history::{Calendar, HistorySettings, DEFAULT_RETENTION_DAYS, DEFAULT_STORAGE_KEY};
use crate::poller::DEFAULT_POLL_INTERVAL;

pub const ENV_PREFIX: &str = "DELAY_WATCH";
/// Ten years of daily records.
pub const MAX_RETENTION_DAYS: u32 = 3650;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub endpoint_url: String,
    pub poll_interval_secs: u64,
    pub retention_days: u32,
    pub storage_key: String,
    /// Directory for the history file; the user cache dir when unset.
    pub storage_dir: Option<PathBuf>,
    /// IANA zone deciding calendar days; local time when unset.
    pub timezone: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        Self::build(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Config::builder()
            .set_default("endpoint_url", DEFAULT_STATUS_URL)?
            .set_default("poll_interval_secs", DEFAULT_POLL_INTERVAL.as_secs() as i64)?
            .set_default("retention_days", i64::from(DEFAULT_RETENTION_DAYS))?
            .set_default("storage_key", DEFAULT_STORAGE_KEY)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Message("endpoint_url must not be empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Message("poll_interval_secs must be at least 1".to_string()));
        }
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention_days) {
            return Err(ConfigError::Message(format!(
                "retention_days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Message("storage_key must not be empty".to_string()));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConfigError::Message(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.calendar()?;
        Ok(())
    }

    pub fn calendar(&self) -> Result<Calendar> {
        match &self.timezone {
            None => Ok(Calendar::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(Calendar::Zone)
                .map_err(|e| ConfigError::Message(format!("invalid timezone '{}': {}", name, e))),
        }
    }

    pub fn history_settings(&self) -> Result<HistorySettings> {
        Ok(HistorySettings {
            storage_key: self.storage_key.clone(),
            retention_days: self.retention_days,
            calendar: self.calendar()?,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::config::FileFormat;
    use std::io::Write;

    fn with_toml(toml: &str) -> Result<AppConfig> {
        AppConfig::build(AppConfig::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    #[test]
    fn test_defaults() {
        let config = with_toml("").unwrap();
        assert_eq!(config.endpoint_url, DEFAULT_STATUS_URL);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.storage_key, "transport-delay-history");
        assert!(config.storage_dir.is_none());
        assert!(config.request_timeout().is_none());
        assert_eq!(config.calendar().unwrap(), Calendar::Local);
    }

    #[test]
    fn test_overrides() {
        let config = with_toml(
            r#"
            endpoint_url = "http://localhost:8080/status"
            poll_interval_secs = 10
            retention_days = 14
            storage_dir = "/var/lib/delay-watch"
            timezone = "Europe/London"
            request_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint_url, "http://localhost:8080/status");
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.storage_dir, Some(PathBuf::from("/var/lib/delay-watch")));

        let settings = config.history_settings().unwrap();
        assert_eq!(settings.retention_days, 14);
        assert_eq!(settings.calendar, Calendar::Zone(chrono_tz::Europe::London));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(with_toml("poll_interval_secs = 0").is_err());
        assert!(with_toml("timezone = \"Mars/Olympus_Mons\"").is_err());
        assert!(with_toml("storage_key = \"  \"").is_err());
        assert!(with_toml("request_timeout_secs = 0").is_err());
    }

    #[test]
    fn test_retention_days_bounds() {
        assert!(with_toml("retention_days = 0").is_err());
        assert!(with_toml("retention_days = 3651").is_err());
        assert!(with_toml("retention_days = 200000000").is_err());
        assert_eq!(with_toml("retention_days = 1").unwrap().retention_days, 1);
        assert_eq!(with_toml("retention_days = 3650").unwrap().retention_days, 3650);
    }

    fn load_with_env(path: Option<&Path>, vars: &[(&str, &str)]) -> Result<AppConfig> {
        // SAFETY: every caller is #[serial], so no other test reads the
        // environment concurrently.
        unsafe {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
        }
        let result = AppConfig::load(path);
        unsafe {
            for (key, _) in vars {
                std::env::remove_var(key);
            }
        }
        result
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "retention_days = 3").unwrap();
        writeln!(file, "poll_interval_secs = 10").unwrap();

        let config = load_with_env(
            Some(file.path()),
            &[
                ("DELAY_WATCH_RETENTION_DAYS", "14"),
                ("DELAY_WATCH_TIMEZONE", "Europe/London"),
            ],
        )
        .unwrap();

        assert_eq!(config.retention_days, 14);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.calendar().unwrap(), Calendar::Zone(chrono_tz::Europe::London));
        assert_eq!(config.endpoint_url, DEFAULT_STATUS_URL);
    }

    #[test]
    #[serial_test::serial]
    fn test_environment_values_are_validated() {
        let result = load_with_env(None, &[("DELAY_WATCH_RETENTION_DAYS", "200000000")]);
        assert!(result.is_err());

        let result = load_with_env(None, &[("DELAY_WATCH_POLL_INTERVAL_SECS", "0")]);
        assert!(result.is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "retention_days = 3").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.retention_days, 3);
    }
}
