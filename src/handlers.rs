use crate::commands::SerenityGateway;
use crate::events::{
    Classified, DispatchOutcome, Dispatched, Dispatcher, classify_guild, classify_interaction,
    classify_reaction,
};
use crate::{Data, ERROR_TARGET, EVENT_TARGET};
use serenity::all::{Context, EventHandler, Guild, GuildId, Interaction, Reaction, Ready};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Gateway event ingestion
///
/// Classifies every event it is interested in and hands it to the dispatcher.
pub struct Handler {
    pub data: Data,
    pub dispatcher: Arc<Dispatcher<Dispatched>>,
}

impl Handler {
    pub fn new(data: Data, dispatcher: Arc<Dispatcher<Dispatched>>) -> Self {
        Self { data, dispatcher }
    }

    async fn route(&self, ctx: Context, classified: Classified) {
        let Classified { kind, scope, event } = classified;
        let outcome = self
            .dispatcher
            .dispatch(kind, scope, Dispatched { ctx, event })
            .await;
        if outcome == DispatchOutcome::ShuttingDown {
            debug!(target: EVENT_TARGET, kind = %kind, scope = %scope, "Event refused during shutdown");
        }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");

        // Commands already registered on an earlier session are skipped
        if self.data.config.register_commands {
            let gateway = SerenityGateway::new(Arc::clone(&ctx.http));
            if let Err(e) = self.data.commands.install_all(&gateway).await {
                error!(target: ERROR_TARGET, error = %e, "Failed to install slash commands");
            }
        }
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn guild_create(&self, ctx: Context, guild: Guild, _is_new: Option<bool>) {
        self.route(ctx, classify_guild(&guild)).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        if let Some(classified) = classify_reaction(reaction) {
            self.route(ctx, classified).await;
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Some(classified) = classify_interaction(interaction) {
            self.route(ctx, classified).await;
        }
    }
}
