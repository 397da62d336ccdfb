//! # configs
//!
//! Layered settings for statuslog.
//!
//! # Loading order
//! 1. `.env` (via `dotenvy`), so the variables below can live in a file
//! 2. Built-in defaults (`config/defaults.toml`, embedded at compile time)
//! 3. `config/statuslog.toml`, or the file named by `STATUSLOG_CONFIG` (optional)
//! 4. `STATUSLOG__SECTION__KEY` environment variables (highest priority)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "STATUSLOG";
pub const CONFIG_PATH_VAR: &str = "STATUSLOG_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/statuslog.toml";
const DEFAULTS: &str = include_str!("../config/defaults.toml");

/// Mastodon never returns more than this many statuses per page.
pub const MAX_PAGE_SIZE: u32 = 40;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub remote: RemoteSettings,
    pub sync: SyncSettings,
    pub display: DisplaySettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `sqlite://…` or `postgres://…`; may carry credentials.
    pub url: SecretString,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    pub scheme: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    pub pacing_interval_ms: u64,
    pub backfill_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySettings {
    /// IANA name, e.g. `Asia/Tokyo`
    pub time_zone: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directives; `RUST_LOG` takes precedence when set.
    pub filter: String,
    pub format: LogFormat,
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("server address: {e}")))
    }
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl RemoteSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SyncSettings {
    pub fn pacing_interval(&self) -> Duration {
        Duration::from_millis(self.pacing_interval_ms)
    }

    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_secs(self.backfill_timeout_secs)
    }
}

impl DisplaySettings {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown time zone '{}'", self.time_zone)))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.expose_secret().trim().is_empty() {
            return Err(ConfigError::Invalid("database.url must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".into(),
            ));
        }
        if self.remote.page_size == 0 || self.remote.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "remote.page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.remote.page_size
            )));
        }
        if !matches!(self.remote.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "remote.scheme must be http or https, got '{}'",
                self.remote.scheme
            )));
        }
        self.display.tz()?;
        self.server.addr()?;
        Ok(())
    }
}

/// Loads settings from `.env`, the defaults, the optional settings file and
/// the process environment.
pub fn load() -> Result<Settings, ConfigError> {
    dotenvy::dotenv().ok();
    let path = std::env::var(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    load_from(&path, ENV_PREFIX)
}

/// Same as [`load`] minus `.env`, with an explicit file and env prefix.
pub fn load_from(path: &Path, env_prefix: &str) -> Result<Settings, ConfigError> {
    debug!(path = %path.display(), env_prefix, "loading configuration");
    let settings: Settings = config::Config::builder()
        .add_source(config::File::from_str(DEFAULTS, config::FileFormat::Toml))
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn missing_file() -> PathBuf {
        PathBuf::from("does/not/exist/statuslog.toml")
    }

    #[test]
    fn test_defaults_load_and_validate() {
        let settings = load_from(&missing_file(), "STATUSLOG_TEST_DEFAULTS").unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.remote.page_size, 40);
        assert_eq!(settings.remote.scheme, "https");
        assert_eq!(settings.sync.pacing_interval(), Duration::from_secs(2));
        assert_eq!(settings.display.tz().unwrap(), Tz::UTC);
        assert_eq!(settings.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_file_then_env_override() {
        let dir = std::env::temp_dir().join(format!("statuslog-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("statuslog.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[remote]\npage_size = 20\n[display]\ntime_zone = \"Asia/Tokyo\"\n[log]\nformat = \"json\""
        )
        .unwrap();

        std::env::set_var("STATUSLOG_TEST_OVERRIDE__REMOTE__PAGE_SIZE", "10");
        std::env::set_var("STATUSLOG_TEST_OVERRIDE__DATABASE__URL", "postgres://db/statuslog");
        let settings = load_from(&path, "STATUSLOG_TEST_OVERRIDE").unwrap();

        assert_eq!(settings.remote.page_size, 10);
        assert_eq!(settings.display.tz().unwrap(), chrono_tz::Asia::Tokyo);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.database.url.expose_secret(), "postgres://db/statuslog");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_rejects_page_size_above_remote_limit() {
        std::env::set_var("STATUSLOG_TEST_PAGE__REMOTE__PAGE_SIZE", "41");
        let err = load_from(&missing_file(), "STATUSLOG_TEST_PAGE").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("page_size")));
    }

    #[test]
    fn test_rejects_zero_page_size() {
        std::env::set_var("STATUSLOG_TEST_ZERO__REMOTE__PAGE_SIZE", "0");
        assert!(load_from(&missing_file(), "STATUSLOG_TEST_ZERO").is_err());
    }

    #[test]
    fn test_rejects_unknown_time_zone() {
        std::env::set_var("STATUSLOG_TEST_TZ__DISPLAY__TIME_ZONE", "Mars/Olympus");
        let err = load_from(&missing_file(), "STATUSLOG_TEST_TZ").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("time zone")));
    }

    #[test]
    fn test_rejects_empty_database_url() {
        std::env::set_var("STATUSLOG_TEST_DB__DATABASE__URL", " ");
        assert!(load_from(&missing_file(), "STATUSLOG_TEST_DB").is_err());
    }
}
