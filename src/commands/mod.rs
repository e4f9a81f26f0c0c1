//! Slash command lifecycle
//!
//! Commands live in a [`ScopedRegistry`] together with their remote
//! registration state. Remote calls go through [`CommandGateway`] so the
//! lifecycle can be driven without a Discord connection.

pub mod builtin;

use crate::registry::{Scope, ScopedRegistry};
use crate::{BotError, BotResult, CONSOLE_TARGET, Data, ERROR_TARGET};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{CommandId, CommandInteraction, Context, CreateCommand, GuildId, Http};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use tracing::{error, info};

/// Executes a slash command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(&self, ctx: &Context, data: &Data, interaction: &CommandInteraction) -> BotResult<()>;
}

/// Whether a command is currently known to Discord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Unregistered,
    Registered {
        remote_id: CommandId,
        registered_at: DateTime<Utc>,
    },
}

impl Registration {
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    #[must_use]
    pub fn remote_id(&self) -> Option<CommandId> {
        match self {
            Self::Unregistered => None,
            Self::Registered { remote_id, .. } => Some(*remote_id),
        }
    }
}

/// A slash command and its registration state
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub descriptor: CreateCommand,
    pub handler: Arc<dyn CommandHandler>,
    pub registration: Registration,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        Self {
            descriptor: CreateCommand::new(name.clone()).description(description.clone()),
            name,
            description,
            handler,
            registration: Registration::Unregistered,
        }
    }

    /// Customize the descriptor sent to Discord
    #[must_use]
    pub fn with_descriptor(mut self, f: impl FnOnce(CreateCommand) -> CreateCommand) -> Self {
        self.descriptor = f(self.descriptor);
        self
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("registration", &self.registration)
            .finish_non_exhaustive()
    }
}

/// Remote command registration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandGateway: Send + Sync {
    async fn create_command(&self, scope: Scope, command: CreateCommand) -> BotResult<CommandId>;

    async fn delete_command(&self, scope: Scope, command_id: CommandId) -> BotResult<()>;
}

/// [`CommandGateway`] backed by the Discord HTTP API
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CommandGateway for SerenityGateway {
    async fn create_command(&self, scope: Scope, command: CreateCommand) -> BotResult<CommandId> {
        let created = match scope {
            Scope::Global => {
                serenity::all::Command::create_global_command(&*self.http, command).await?
            }
            Scope::Guild(guild_id) => guild_id.create_command(&*self.http, command).await?,
        };
        Ok(created.id)
    }

    async fn delete_command(&self, scope: Scope, command_id: CommandId) -> BotResult<()> {
        match scope {
            Scope::Global => {
                serenity::all::Command::delete_global_command(&*self.http, command_id).await?;
            }
            Scope::Guild(guild_id) => guild_id.delete_command(&*self.http, command_id).await?,
        }
        Ok(())
    }
}

/// Registry of slash commands with their remote state
#[derive(Default)]
pub struct CommandTracker {
    commands: ScopedRegistry<Command>,
}

impl CommandTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command in `scope`
    ///
    /// # Errors
    ///
    /// Returns `BotError::Conflict` if the name is already taken in that scope.
    pub fn add(&self, scope: Scope, command: Command) -> BotResult<()> {
        self.commands.register(command.name.clone(), scope, command)
    }

    /// Register every unregistered command with Discord
    ///
    /// Stops at the first failure; commands registered before it stay registered.
    ///
    /// # Errors
    ///
    /// The first gateway error.
    pub async fn install_all(&self, gateway: &dyn CommandGateway) -> BotResult<usize> {
        let mut pending: Vec<_> = self
            .commands
            .entries()
            .into_iter()
            .filter(|entry| !entry.value.registration.is_registered())
            .collect();
        pending.sort_by(|a, b| a.key.cmp(&b.key));

        let mut installed = 0;
        for entry in pending {
            self.install_entry(&entry.key, entry.scope, entry.value.descriptor, gateway)
                .await?;
            installed += 1;
        }
        info!(target: CONSOLE_TARGET, installed, "Installed slash commands");
        Ok(installed)
    }

    /// Register one command with Discord
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown command, or the gateway error.
    pub async fn install(
        &self,
        name: &str,
        scope: Scope,
        gateway: &dyn CommandGateway,
    ) -> BotResult<()> {
        let command = self
            .commands
            .get(name, scope)
            .ok_or_else(|| BotError::NotFound(format!("{name} is not registered for {scope}")))?;
        if command.registration.is_registered() {
            return Ok(());
        }
        self.install_entry(name, scope, command.descriptor, gateway).await
    }

    async fn install_entry(
        &self,
        name: &str,
        scope: Scope,
        descriptor: CreateCommand,
        gateway: &dyn CommandGateway,
    ) -> BotResult<()> {
        let remote_id = gateway.create_command(scope, descriptor).await?;
        self.commands.update(name, scope, |command| {
            command.registration = Registration::Registered {
                remote_id,
                registered_at: Utc::now(),
            };
        })
    }

    /// Remove a command from Discord, keeping it in the tracker
    ///
    /// # Errors
    ///
    /// `NotFound` if the command is unknown in exactly `scope` or is not
    /// registered, or the gateway error.
    pub async fn uninstall(
        &self,
        name: &str,
        scope: Scope,
        gateway: &dyn CommandGateway,
    ) -> BotResult<()> {
        let remote_id = self
            .commands
            .get(name, scope)
            .ok_or_else(|| BotError::NotFound(format!("{name} is not registered for {scope}")))?
            .registration
            .remote_id()
            .ok_or_else(|| BotError::NotFound(format!("{name} is not installed for {scope}")))?;

        gateway.delete_command(scope, remote_id).await?;
        self.commands.update(name, scope, |command| {
            command.registration = Registration::Unregistered;
        })?;
        info!(target: CONSOLE_TARGET, command = name, scope = %scope, "Uninstalled slash command");
        Ok(())
    }

    /// Remove every registered command from Discord, continuing past failures
    ///
    /// # Errors
    ///
    /// The first error encountered, after every command has been attempted.
    pub async fn uninstall_all(&self, gateway: &dyn CommandGateway) -> BotResult<()> {
        let mut first_error = None;
        for entry in self.commands.entries() {
            if !entry.value.registration.is_registered() {
                continue;
            }
            if let Err(e) = self.uninstall(&entry.key, entry.scope, gateway).await {
                error!(
                    target: ERROR_TARGET,
                    command = %entry.key,
                    scope = %entry.scope,
                    error = %e,
                    "Failed to uninstall slash command"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The command invoked as `name` from `guild_id` (guild override first)
    ///
    /// # Errors
    ///
    /// `NotFound` when neither a guild nor a global command exists.
    pub fn resolve_for_guild(&self, name: &str, guild_id: Option<GuildId>) -> BotResult<Command> {
        self.commands.resolve(name, Scope::from_guild(guild_id))
    }

    /// Whether `name` is defined in exactly `scope`
    #[must_use]
    pub fn contains(&self, name: &str, scope: Scope) -> bool {
        self.commands.get(name, scope).is_some()
    }

    /// Registered commands a guild can see, guild overrides shadowing globals
    #[must_use]
    pub fn visible_commands(&self, guild_id: GuildId) -> Vec<Command> {
        let mut visible: Vec<Command> = Vec::new();
        for entry in self.commands.list(Scope::Guild(guild_id), true) {
            if visible.iter().any(|command| command.name == entry.key) {
                continue;
            }
            visible.push(entry.value);
        }
        visible.retain(|command| command.registration.is_registered());
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use mockall::predicate::eq;

    struct Noop;

    #[async_trait]
    impl CommandHandler for Noop {
        async fn run(&self, _: &Context, _: &Data, _: &CommandInteraction) -> BotResult<()> {
            Ok(())
        }
    }

    fn command(name: &str) -> Command {
        Command::new(name, format!("{name} command"), Arc::new(Noop))
    }

    fn guild() -> GuildId {
        GuildId::new(1_111_111_111_111_111_111)
    }

    #[tokio::test]
    async fn test_install_all_registers_every_command() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Global, command("help")).unwrap();
        tracker.add(Scope::Guild(guild()), command("disable")).unwrap();

        let mut gateway = MockCommandGateway::new();
        gateway
            .expect_create_command()
            .times(2)
            .returning(|_, _| Ok(CommandId::new(10)));

        assert_eq!(tracker.install_all(&gateway).await.unwrap(), 2);
        assert_eq!(tracker.visible_commands(guild()).len(), 2);
    }

    #[tokio::test]
    async fn test_install_all_partial_failure() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Global, command("a-first")).unwrap();
        tracker.add(Scope::Global, command("b-second")).unwrap();

        let mut gateway = MockCommandGateway::new();
        let mut calls = 0;
        gateway.expect_create_command().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(CommandId::new(1))
            } else {
                Err(BotError::Internal("rate limited".to_string()))
            }
        });

        let error = tracker.install_all(&gateway).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Internal);

        let first = tracker.resolve_for_guild("a-first", None).unwrap();
        assert_eq!(first.registration.remote_id(), Some(CommandId::new(1)));
        let second = tracker.resolve_for_guild("b-second", None).unwrap();
        assert!(!second.registration.is_registered());
    }

    #[tokio::test]
    async fn test_uninstall_keeps_entry() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Guild(guild()), command("help")).unwrap();

        let mut gateway = MockCommandGateway::new();
        gateway
            .expect_create_command()
            .returning(|_, _| Ok(CommandId::new(7)));
        gateway
            .expect_delete_command()
            .with(eq(Scope::Guild(guild())), eq(CommandId::new(7)))
            .times(1)
            .returning(|_, _| Ok(()));

        tracker.install("help", Scope::Guild(guild()), &gateway).await.unwrap();
        tracker.uninstall("help", Scope::Guild(guild()), &gateway).await.unwrap();

        let help = tracker.resolve_for_guild("help", Some(guild())).unwrap();
        assert_eq!(help.registration, Registration::Unregistered);
        assert!(tracker.visible_commands(guild()).is_empty());

        let error = tracker
            .uninstall("help", Scope::Guild(guild()), &gateway)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_uninstall_unknown_command() {
        let tracker = CommandTracker::new();
        let gateway = MockCommandGateway::new();

        let error = tracker
            .uninstall("missing", Scope::Global, &gateway)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_uninstall_all_attempts_every_command() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Global, command("help")).unwrap();
        tracker.add(Scope::Global, command("disable")).unwrap();

        let mut gateway = MockCommandGateway::new();
        gateway
            .expect_create_command()
            .returning(|_, _| Ok(CommandId::new(3)));
        gateway
            .expect_delete_command()
            .times(2)
            .returning(|_, _| Err(BotError::Internal("gateway closed".to_string())));

        tracker.install_all(&gateway).await.unwrap();
        assert!(tracker.uninstall_all(&gateway).await.is_err());
    }

    #[tokio::test]
    async fn test_visible_commands_guild_shadows_global() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Global, command("help")).unwrap();
        tracker
            .add(
                Scope::Guild(guild()),
                Command::new("help", "guild help", Arc::new(Noop)),
            )
            .unwrap();
        tracker.add(Scope::Global, command("disable")).unwrap();

        let mut gateway = MockCommandGateway::new();
        gateway
            .expect_create_command()
            .returning(|_, _| Ok(CommandId::new(5)));
        tracker.install_all(&gateway).await.unwrap();

        let visible = tracker.visible_commands(guild());
        let names: Vec<_> = visible.iter().map(|c| c.description.as_str()).collect();
        assert_eq!(names, vec!["disable command", "guild help"]);
    }

    #[test]
    fn test_resolve_for_guild_falls_back_to_global() {
        let tracker = CommandTracker::new();
        tracker.add(Scope::Global, command("help")).unwrap();

        assert_eq!(
            tracker.resolve_for_guild("help", Some(guild())).unwrap().name,
            "help"
        );
        assert!(tracker.contains("help", Scope::Global));
        assert!(!tracker.contains("help", Scope::Guild(guild())));

        let error = tracker.add(Scope::Global, command("help")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
    }
}
