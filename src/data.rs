use std::{ops::Deref, sync::Arc};

use crate::commands::CommandTracker;
use crate::config::BotConfig;
use crate::prompts::PendingPrompts;
use crate::ranks::RankRegistry;
use crate::rules::{RulesBackend, SyncClient};
use serenity::all::CommandInteraction;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

/// Shared state behind [`Data`]
pub struct DataInner {
    pub config: BotConfig,
    /// Slash commands and their registration state
    pub commands: CommandTracker,
    /// Reaction rules, cached and synchronized with the persistence service
    pub rules: SyncClient,
    /// Open delete-rules prompts, keyed by the user who opened them
    pub prompts: PendingPrompts<CommandInteraction>,
    /// Activated rank systems
    pub ranks: RankRegistry,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("config", &self.config)
            .field("pending_prompts", &self.prompts.len())
            .field("rank_systems", &self.ranks.len())
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create the shared state around a rules backend
    #[must_use]
    pub fn new(config: BotConfig, backend: Arc<dyn RulesBackend>) -> Self {
        Self(Arc::new(DataInner {
            config,
            commands: CommandTracker::new(),
            rules: SyncClient::new(backend),
            prompts: PendingPrompts::new(),
            ranks: RankRegistry::new(),
        }))
    }
}
