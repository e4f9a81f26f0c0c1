pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod prompts;
pub mod ranks;
pub mod registry;
pub mod rules;

// Log file prefix and logging targets
pub const BOT_NAME: &str = "guild_warden";
pub const COMMAND_TARGET: &str = "guild_warden::command";
pub const ERROR_TARGET: &str = "guild_warden::error";
pub const EVENT_TARGET: &str = "guild_warden::handlers";
pub const CONSOLE_TARGET: &str = "guild_warden";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub use error::{BotError, BotResult, ErrorKind};
pub use registry::{Scope, ScopedRegistry};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
