use crate::events::EventKind;
use crate::registry::Scope;
use crate::{BOT_NAME, BotError, COMMAND_TARGET, CONSOLE_TARGET, ERROR_TARGET, EVENT_TARGET};
use serenity::all::CommandInteraction;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info,serenity=error";

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let bot_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, BOT_NAME);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON file output
    let file_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(bot_file);

    // Serenity heartbeat logs are noise at info level
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

fn guild_field(interaction: &CommandInteraction) -> String {
    interaction
        .guild_id
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution, returning the start time
pub fn log_command_start(interaction: &CommandInteraction) -> Instant {
    let arguments = interaction
        .data
        .options
        .iter()
        .map(|option| format!("{}={:?}", option.name, option.value))
        .collect::<Vec<_>>()
        .join(" ");

    info!(
        target: COMMAND_TARGET,
        command = %interaction.data.name,
        guild_id = %guild_field(interaction),
        user_id = %interaction.user.id.get(),
        arguments = %arguments,
        event = "start",
        "Command execution started"
    );
    Instant::now()
}

/// Log the end of a command execution started at `started`
pub fn log_command_end(interaction: &CommandInteraction, started: Instant) {
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or_default();
    info!(
        target: COMMAND_TARGET,
        command = %interaction.data.name,
        guild_id = %guild_field(interaction),
        user_id = %interaction.user.id.get(),
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log an error returned by a command handler
pub fn log_command_error(interaction: &CommandInteraction, error: &BotError) {
    error!(
        target: ERROR_TARGET,
        command = %interaction.data.name,
        guild_id = %guild_field(interaction),
        user_id = %interaction.user.id.get(),
        kind = ?error.kind(),
        error = %error,
        "Command error"
    );
}

/// Log an event no handler is registered for
pub fn log_event_dropped(kind: EventKind, scope: Scope) {
    debug!(
        target: EVENT_TARGET,
        kind = %kind,
        scope = %scope,
        event = "dropped",
        "No handler for event"
    );
}

pub fn log_console(message: String) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_targets_share_log_file_prefix() {
        for target in [COMMAND_TARGET, ERROR_TARGET, EVENT_TARGET, CONSOLE_TARGET] {
            assert!(target.starts_with(BOT_NAME), "{target}");
        }
    }
}
