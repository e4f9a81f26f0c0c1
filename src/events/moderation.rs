//! Reaction moderation and guild registration

use super::{BotEvent, Dispatched, EventHandler};
use crate::rules::{EmojiIdentity, ReactAction, ReactionRule};
use crate::{Data, ERROR_TARGET, EVENT_TARGET};
use async_trait::async_trait;
use tracing::{error, info, warn};

/// Actions of a rule this bot carries out itself
///
/// Only removing the reaction is enforced; the rest are reported.
#[must_use]
pub fn split_actions(rule: &ReactionRule) -> (bool, Vec<ReactAction>) {
    let remove = rule.has_action(ReactAction::Delete);
    let reported = rule
        .actions
        .iter()
        .copied()
        .filter(|action| *action != ReactAction::Delete)
        .collect();
    (remove, reported)
}

/// Applies the guild's rules to added reactions
pub struct ReactionModeration {
    data: Data,
}

impl ReactionModeration {
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

#[async_trait]
impl EventHandler<Dispatched> for ReactionModeration {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::ReactionAdd(reaction) = payload.event else {
            return;
        };
        let Some(guild_id) = reaction.guild_id else {
            return;
        };
        let bot_id = payload.ctx.cache.current_user().id;
        if reaction.user_id == Some(bot_id) {
            return;
        }
        let Some(reacted) = EmojiIdentity::from_reaction(&reaction.emoji) else {
            return;
        };

        if let Err(e) = self.data.rules.ensure_loaded(guild_id).await {
            error!(target: ERROR_TARGET, guild_id = %guild_id, error = %e, "Failed to load reaction rules");
            return;
        }
        let Some(rule) = self.data.rules.cache().find_match(guild_id, &reacted) else {
            return;
        };

        let (remove, reported) = split_actions(&rule);
        let user_id = reaction
            .user_id
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        if remove {
            match reaction.delete(&payload.ctx.http).await {
                Ok(()) => info!(
                    target: EVENT_TARGET,
                    guild_id = %guild_id,
                    user_id = %user_id,
                    emoji = %reacted,
                    "Removed reaction"
                ),
                Err(e) => error!(
                    target: ERROR_TARGET,
                    guild_id = %guild_id,
                    emoji = %reacted,
                    error = %e,
                    "Failed to remove reaction"
                ),
            }
        }
        for action in reported {
            warn!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                user_id = %user_id,
                emoji = %reacted,
                action = %action,
                "Reaction rule action is not enforced by the bot"
            );
        }
    }
}

/// Registers joined guilds with the persistence service and loads their rules
pub struct GuildJoin {
    data: Data,
}

impl GuildJoin {
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

#[async_trait]
impl EventHandler<Dispatched> for GuildJoin {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::GuildCreate { guild_id, owner_id } = payload.event else {
            return;
        };
        match self.data.rules.register_guild(guild_id, owner_id).await {
            Ok(rules) => info!(
                target: EVENT_TARGET,
                guild_id = %guild_id,
                rules = rules.len(),
                "Guild ready"
            ),
            Err(e) => error!(
                target: ERROR_TARGET,
                guild_id = %guild_id,
                error = %e,
                "Failed to register guild"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::GuildId;

    #[test]
    fn test_split_actions() {
        let rule = ReactionRule::new(
            GuildId::new(1),
            "2",
            EmojiIdentity::unicode("💦"),
            vec![ReactAction::Ban, ReactAction::Delete],
        );
        assert_eq!(split_actions(&rule), (true, vec![ReactAction::Ban]));

        let rule = ReactionRule::new(
            GuildId::new(1),
            "2",
            EmojiIdentity::unicode("💦"),
            vec![ReactAction::Warn],
        );
        assert_eq!(split_actions(&rule), (false, vec![ReactAction::Warn]));
    }
}
