//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_DATA_PATH: &str = "termsandcondition/user_data/user_data.json";
pub const DEFAULT_OUTPUT_DIR: &str = "termsandcondition/generated";

/// Telegram channel settings.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Bot configuration.
#[derive(Debug)]
pub struct BotConfig {
    /// Enabled when `TELEGRAM_BOT_TOKEN` is set.
    pub telegram: Option<TelegramConfig>,
    /// Whether the stdin/stdout channel runs.
    pub cli_enabled: bool,
    /// JSON file holding company profiles.
    pub data_path: PathBuf,
    /// Directory receiving generated documents.
    pub output_dir: PathBuf,
    /// Sessions idle longer than this are dropped. `None` keeps them forever.
    pub session_idle_timeout: Option<Duration>,
    /// Optional directory for daily-rotated log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            cli_enabled: true,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            session_idle_timeout: None,
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let telegram = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: lookup("TELEGRAM_ALLOWED_USERS")
                    .unwrap_or_else(|| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            });

        let cli_enabled = match lookup("TERMS_BOT_CLI") {
            Some(v) => parse_bool("TERMS_BOT_CLI", &v)?,
            None => defaults.cli_enabled,
        };

        let session_idle_timeout = match lookup("TERMS_BOT_SESSION_IDLE_SECS") {
            Some(v) => {
                let secs: u64 = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "TERMS_BOT_SESSION_IDLE_SECS".to_string(),
                    message: format!("expected a number of seconds, got {v:?}"),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => None,
        };

        let config = Self {
            telegram,
            cli_enabled,
            data_path: lookup("TERMS_BOT_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_path),
            output_dir: lookup("TERMS_BOT_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            session_idle_timeout,
            log_dir: lookup("TERMS_BOT_LOG_DIR").map(PathBuf::from),
        };

        if config.telegram.is_none() && !config.cli_enabled {
            return Err(ConfigError::NoChannels);
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got {value:?}"),
        }),
    }
}
