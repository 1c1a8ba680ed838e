use kdl::{KdlDocument, KdlValue};
use log::LevelFilter;
use poise::serenity_prelude as serenity;
use serenity::{ApplicationId, model::user::OnlineStatus};
use std::{collections::HashMap, fs, io, path::Path, str::FromStr, time::Duration};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse config file: {0}")]
    Kdl(#[from] kdl::KdlError),
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

const REQUIRED: [&str; 2] = ["DISCORD_TOKEN", "DISCORD_CLIENT_ID"];

const DEFAULTS: [(&str, &str); 9] = [
    ("BOT_STATUS", "online"),
    ("DEFAULT_VOLUME", "50"),
    ("MAX_QUEUE_SIZE", "100"),
    ("INACTIVITY_TIMEOUT", "300"),
    ("MAX_FILE_SIZE", "25"),
    ("LOG_LEVEL", "info"),
    ("NODE_ENV", "development"),
    ("HEALTH_CHECK_PORT", "8080"),
    ("MUSIC_CHANNEL_NAME", "music-requests"),
];

/// KDL `(node, property)` pairs and the setting each one feeds.
const KDL_KEYS: [(&str, &str, &str); 7] = [
    ("misc", "status", "BOT_STATUS"),
    ("music", "default-volume", "DEFAULT_VOLUME"),
    ("music", "max-queue-size", "MAX_QUEUE_SIZE"),
    ("music", "inactivity-timeout", "INACTIVITY_TIMEOUT"),
    ("music", "max-file-size", "MAX_FILE_SIZE"),
    ("music", "channel-name", "MUSIC_CHANNEL_NAME"),
    ("health", "port", "HEALTH_CHECK_PORT"),
];

#[derive(Clone)]
pub struct Config {
    pub token: String,
    pub client_id: ApplicationId,
    pub status: OnlineStatus,
    pub default_volume: u8,
    pub max_queue_size: usize,
    pub inactivity_timeout: Duration,
    pub max_file_size_mb: u64,
    pub log_level: LevelFilter,
    pub environment: Environment,
    pub health_port: u16,
    pub channel_name: String,
}

impl Config {
    /// Loads settings from `config_path` (if present) and the process environment.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let doc = match fs::read_to_string(config_path) {
            Ok(contents) => Some(contents.parse::<KdlDocument>()?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Self::from_sources(doc.as_ref(), |key| std::env::var(key).ok())
    }

    pub fn from_sources(
        doc: Option<&KdlDocument>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut raw: HashMap<&'static str, String> = DEFAULTS
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect();

        if let Some(doc) = doc {
            for (node, property, key) in KDL_KEYS {
                if let Some(value) = doc
                    .get(node)
                    .and_then(|node| node.get(property))
                    .and_then(kdl_to_string)
                {
                    raw.insert(key, value);
                }
            }
        }

        for (key, _) in DEFAULTS {
            if let Some(value) = env(key).filter(|v| !v.trim().is_empty()) {
                raw.insert(key, value);
            }
        }
        if env("HEALTH_CHECK_PORT").is_none() {
            if let Some(port) = env("PORT").filter(|v| !v.trim().is_empty()) {
                raw.insert("HEALTH_CHECK_PORT", port);
            }
        }

        let missing: Vec<&'static str> = REQUIRED
            .into_iter()
            .filter(|key| env(key).is_none_or(|v| v.trim().is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let token = env("DISCORD_TOKEN").unwrap_or_default();
        let client_id = env("DISCORD_CLIENT_ID").unwrap_or_default();
        let client_id = client_id
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(ApplicationId::new)
            .ok_or_else(|| invalid("DISCORD_CLIENT_ID", &client_id))?;

        let default_volume: u8 = parse(&raw, "DEFAULT_VOLUME")?;
        if default_volume > crate::queue::MAX_VOLUME {
            return Err(invalid("DEFAULT_VOLUME", &raw["DEFAULT_VOLUME"]));
        }

        let max_queue_size: usize = parse(&raw, "MAX_QUEUE_SIZE")?;
        if max_queue_size == 0 {
            return Err(invalid("MAX_QUEUE_SIZE", &raw["MAX_QUEUE_SIZE"]));
        }

        let log_level = match raw["LOG_LEVEL"].to_ascii_lowercase().as_str() {
            "error" => LevelFilter::Error,
            "warn" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "debug" => LevelFilter::Debug,
            "trace" => LevelFilter::Trace,
            other => return Err(invalid("LOG_LEVEL", other)),
        };

        let environment = match raw["NODE_ENV"].as_str() {
            "development" => Environment::Development,
            "production" => Environment::Production,
            other => return Err(invalid("NODE_ENV", other)),
        };

        Ok(Config {
            token,
            client_id,
            status: parse_status(&raw["BOT_STATUS"])?,
            default_volume,
            max_queue_size,
            inactivity_timeout: Duration::from_secs(parse(&raw, "INACTIVITY_TIMEOUT")?),
            max_file_size_mb: parse(&raw, "MAX_FILE_SIZE")?,
            log_level,
            environment,
            health_port: parse(&raw, "HEALTH_CHECK_PORT")?,
            channel_name: raw["MUSIC_CHANNEL_NAME"].trim().to_string(),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Non-secret settings, for the startup log line.
    pub fn summary(&self) -> String {
        format!(
            "environment={} log_level={} volume={} max_queue={} inactivity={}s max_file={}MB health_port={} channel=#{}",
            self.environment.as_str(),
            self.log_level,
            self.default_volume,
            self.max_queue_size,
            self.inactivity_timeout.as_secs(),
            self.max_file_size_mb,
            self.health_port,
            self.channel_name,
        )
    }
}

fn kdl_to_string(value: &KdlValue) -> Option<String> {
    value
        .as_string()
        .map(str::to_string)
        .or_else(|| value.as_integer().map(|i| i.to_string()))
}

fn parse_status(value: &str) -> Result<OnlineStatus, ConfigError> {
    match value {
        "do-not-disturb" | "dnd" => Ok(OnlineStatus::DoNotDisturb),
        "idle" => Ok(OnlineStatus::Idle),
        "invisible" => Ok(OnlineStatus::Invisible),
        "online" => Ok(OnlineStatus::Online),
        other => Err(invalid("BOT_STATUS", other)),
    }
}

fn parse<T: FromStr>(raw: &HashMap<&'static str, String>, key: &'static str) -> Result<T, ConfigError> {
    let value = raw.get(key).map(String::as_str).unwrap_or_default();
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}
