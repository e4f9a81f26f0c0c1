//! Bot configuration
//!
//! Settings come from an optional YAML file and are then overridden by
//! environment variables (a `.env` file is honoured).

use crate::registry::Scope;
use serde::{Deserialize, Serialize};
use serenity::all::GuildId;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default location of the configuration file
pub const CONFIG_FILE: &str = "config/bot.yaml";
/// Environment variable overriding [`CONFIG_FILE`]
pub const CONFIG_PATH_VAR: &str = "WARDEN_CONFIG";

/// Errors that can occur while loading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("DISCORD_TOKEN must be set")]
    MissingToken,

    #[error("DEV_GUILD_ID must be set when BOT_ENV is development")]
    MissingDevGuild,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    /// Commands and events default to the development guild
    Development,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            _ => Err(()),
        }
    }
}

/// Runtime configuration of the bot
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub discord_token: String,
    pub api_host: String,
    pub api_port: u16,
    pub environment: Environment,
    pub dev_guild_id: Option<GuildId>,
    /// Register slash commands with Discord at startup
    pub register_commands: bool,
    /// Remove slash commands from Discord on shutdown
    pub remove_commands_on_shutdown: bool,
    /// Upper bound on concurrently running event handlers
    pub max_in_flight_events: usize,
    pub prompt_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            api_host: "localhost".to_string(),
            api_port: 8080,
            environment: Environment::Production,
            dev_guild_id: None,
            register_commands: true,
            remove_commands_on_shutdown: false,
            max_in_flight_events: 64,
            prompt_timeout_secs: 30,
            shutdown_grace_secs: 10,
            http_timeout_secs: 10,
        }
    }
}

impl Debug for BotConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("discord_token", &"<redacted>")
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("environment", &self.environment)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("register_commands", &self.register_commands)
            .field("remove_commands_on_shutdown", &self.remove_commands_on_shutdown)
            .field("max_in_flight_events", &self.max_in_flight_events)
            .field("prompt_timeout_secs", &self.prompt_timeout_secs)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { var, value }),
    }
}

impl BotConfig {
    /// Load the configuration file (if any), then apply the environment
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file exists but cannot be read or parsed,
    /// if an environment variable holds an invalid value, or if the resulting
    /// configuration is incomplete.
    pub async fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let path = PathBuf::from(
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| CONFIG_FILE.to_string()),
        );
        let config = match tokio::fs::read_to_string(&path).await {
            Ok(content) => Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document, missing fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns the YAML error for a malformed document.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Apply overrides looked up by variable name
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a value that does not parse.
    pub fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(token) = lookup("DISCORD_TOKEN") {
            self.discord_token = token;
        }
        if let Some(host) = lookup("API_HOST") {
            self.api_host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.api_port = parse_var("API_PORT", port)?;
        }
        if let Some(env) = lookup("BOT_ENV") {
            self.environment = parse_var("BOT_ENV", env)?;
        }
        if let Some(guild) = lookup("DEV_GUILD_ID") {
            let id: u64 = parse_var("DEV_GUILD_ID", guild.clone())?;
            if id == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "DEV_GUILD_ID",
                    value: guild,
                });
            }
            self.dev_guild_id = Some(GuildId::new(id));
        }
        if let Some(value) = lookup("REGISTER_COMMANDS") {
            self.register_commands = parse_bool("REGISTER_COMMANDS", value)?;
        }
        if let Some(value) = lookup("REMOVE_COMMANDS_ON_SHUTDOWN") {
            self.remove_commands_on_shutdown = parse_bool("REMOVE_COMMANDS_ON_SHUTDOWN", value)?;
        }
        if let Some(value) = lookup("MAX_IN_FLIGHT_EVENTS") {
            self.max_in_flight_events = parse_var("MAX_IN_FLIGHT_EVENTS", value)?;
        }
        if let Some(value) = lookup("PROMPT_TIMEOUT_SECS") {
            self.prompt_timeout_secs = parse_var("PROMPT_TIMEOUT_SECS", value)?;
        }
        if let Some(value) = lookup("SHUTDOWN_GRACE_SECS") {
            self.shutdown_grace_secs = parse_var("SHUTDOWN_GRACE_SECS", value)?;
        }
        if let Some(value) = lookup("HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_var("HTTP_TIMEOUT_SECS", value)?;
        }
        Ok(self)
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for a missing token, a development environment
    /// without a development guild, or a zero worker bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.environment == Environment::Development && self.dev_guild_id.is_none() {
            return Err(ConfigError::MissingDevGuild);
        }
        if self.max_in_flight_events == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MAX_IN_FLIGHT_EVENTS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Base URL of the persistence service
    #[must_use]
    pub fn api_base_url(&self) -> String {
        format!("http://{}:{}", self.api_host, self.api_port)
    }

    /// Scope default commands and event handlers are registered under
    #[must_use]
    pub fn default_scope(&self) -> Scope {
        match (self.environment, self.dev_guild_id) {
            (Environment::Development, Some(guild)) => Scope::Guild(guild),
            _ => Scope::Global,
        }
    }

    #[must_use]
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
