//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment variable that overrides `paths.output_base_dir`.
pub const OUTPUT_DIR_ENV: &str = "NBA_GAMES_FOLDER";

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Task runner limits and retry policy
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_output_dir_override(std::env::var(OUTPUT_DIR_ENV).ok());
    }

    fn apply_output_dir_override(&mut self, value: Option<String>) {
        if let Some(dir) = value.filter(|v| !v.trim().is_empty()) {
            log::debug!("Output directory overridden by {}: {}", OUTPUT_DIR_ENV, dir);
            self.paths.output_base_dir = dir;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.paths.output_base_dir.trim().is_empty() {
            return Err(AppError::validation("paths.output_base_dir is empty"));
        }
        if self.scraper.base_url.trim().is_empty() {
            return Err(AppError::validation("scraper.base_url is empty"));
        }
        url::Url::parse(&self.scraper.base_url).map_err(|e| {
            AppError::validation(format!(
                "scraper.base_url '{}' is not a valid URL: {}",
                self.scraper.base_url, e
            ))
        })?;
        if self.scraper.user_agent.trim().is_empty() {
            return Err(AppError::validation("scraper.user_agent is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.engine.max_active_tasks == 0 {
            return Err(AppError::validation("engine.max_active_tasks must be > 0"));
        }
        Ok(())
    }

    /// Base directory for the per-day output folders.
    pub fn output_base_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_base_dir)
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one sub-folder per scraped day
    #[serde(default = "defaults::output_base_dir")]
    pub output_base_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_base_dir: defaults::output_base_dir(),
        }
    }
}

/// HTTP client and scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Site root; listing and game URLs are built from it
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Task runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum task instances running at once inside a single DAG run
    #[serde(default = "defaults::max_active_tasks")]
    pub max_active_tasks: usize,

    /// Retries applied to tasks that don't set their own
    #[serde(default)]
    pub default_retries: u32,

    /// Delay between attempts in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_active_tasks: defaults::max_active_tasks(),
            default_retries: 0,
            retry_delay_ms: defaults::retry_delay(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub fn output_base_dir() -> String {
        "data/games".into()
    }

    pub fn base_url() -> String {
        "https://www.nba.com".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; courtside/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    pub fn max_active_tasks() -> usize {
        16
    }
    pub fn retry_delay() -> u64 {
        1000
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_output_dir() {
        let mut config = Config::default();
        config.paths.output_base_dir = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.scraper.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.engine.max_active_tasks = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paths]
            output_base_dir = "/srv/nba"

            [engine]
            default_retries = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.output_base_dir, "/srv/nba");
        assert_eq!(config.engine.default_retries, 2);
        assert_eq!(config.engine.max_active_tasks, 16);
        assert_eq!(config.scraper.base_url, "https://www.nba.com");
    }

    #[test]
    fn load_reads_file_and_reports_missing_one() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = Config::load(tmp.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, AppError::Io(_)));

        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.paths.output_base_dir, "data/games");
    }

    #[test]
    fn env_override_replaces_output_dir() {
        let mut config = Config::default();
        config.apply_output_dir_override(Some("/tmp/games".to_string()));
        assert_eq!(config.output_base_dir(), PathBuf::from("/tmp/games"));

        config.apply_output_dir_override(Some("".to_string()));
        assert_eq!(config.output_base_dir(), PathBuf::from("/tmp/games"));

        config.apply_output_dir_override(None);
        assert_eq!(config.output_base_dir(), PathBuf::from("/tmp/games"));
    }
}
