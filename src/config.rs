//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::registration::Schema;

/// Which chat transport the bot runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    Cli,
}

/// Bot configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Transport to run.
    pub channel: ChannelKind,
    /// Telegram bot token. Present whenever `channel` is `Telegram`.
    pub bot_token: Option<SecretString>,
    /// CSV file holding one row per completed registration.
    pub sheet_path: PathBuf,
    /// Directory uploaded portfolio files are copied into.
    pub portfolio_dir: PathBuf,
    /// Whether the flow asks for a date of birth (adds a column to the sheet).
    pub collect_date_of_birth: bool,
    /// Upper bound on a single portfolio upload.
    pub upload_timeout: Duration,
    /// Sessions untouched for this long are pruned; per-user workers exit after it.
    pub session_idle_timeout: Duration,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Telegram,
            bot_token: None,
            sheet_path: PathBuf::from("summer_skills_tutors.csv"),
            portfolio_dir: PathBuf::from("portfolios"),
            collect_date_of_birth: false,
            upload_timeout: Duration::from_secs(60),
            session_idle_timeout: Duration::from_secs(24 * 3600), // 1 day
        }
    }
}

impl BotConfig {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let channel = match lookup("INTAKE_CHANNEL").as_deref().map(str::trim) {
            None | Some("") | Some("telegram") => ChannelKind::Telegram,
            Some("cli") => ChannelKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_CHANNEL".into(),
                    message: format!("expected 'telegram' or 'cli', got '{other}'"),
                });
            }
        };

        let bot_token = lookup("BOT_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if channel == ChannelKind::Telegram && bot_token.is_none() {
            return Err(ConfigError::MissingEnvVar("BOT_TOKEN".into()));
        }

        let sheet_path = lookup("INTAKE_SHEET_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.sheet_path);
        let portfolio_dir = lookup("INTAKE_PORTFOLIO_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.portfolio_dir);

        let collect_date_of_birth = match lookup("INTAKE_COLLECT_DOB") {
            Some(raw) => parse_bool("INTAKE_COLLECT_DOB", &raw)?,
            None => defaults.collect_date_of_birth,
        };

        let upload_timeout = match lookup("INTAKE_UPLOAD_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("INTAKE_UPLOAD_TIMEOUT_SECS", &raw)?),
            None => defaults.upload_timeout,
        };
        let session_idle_timeout = match lookup("INTAKE_SESSION_IDLE_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("INTAKE_SESSION_IDLE_SECS", &raw)?),
            None => defaults.session_idle_timeout,
        };

        Ok(Self {
            channel,
            bot_token: bot_token.map(SecretString::from),
            sheet_path,
            portfolio_dir,
            collect_date_of_birth,
            upload_timeout,
            session_idle_timeout,
        })
    }
}

impl BotConfig {
    /// Columns collected by this deployment.
    pub fn schema(&self) -> Schema {
        if self.collect_date_of_birth {
            Schema::with_date_of_birth()
        } else {
            Schema::standard()
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: "must be greater than zero".into(),
        }),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
    }
}
