//! Per-guild reaction rule cache
//!
//! Each guild owns one [`RuleSet`], created lazily on first access and never
//! evicted. A set starts unloaded and becomes loaded after a successful fetch
//! or create; it never reverts.

use super::rule::{EmojiIdentity, ReactionRule};
use parking_lot::RwLock;
use serenity::all::GuildId;
use std::collections::HashMap;

/// Cached rules of one guild
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub loaded: bool,
    pub rules: Vec<ReactionRule>,
}

/// Cache of reaction rules keyed by guild
#[derive(Debug, Default)]
pub struct RuleCache {
    guilds: RwLock<HashMap<GuildId, RuleSet>>,
}

impl RuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules of a guild, `None` while the guild is unloaded
    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<Vec<ReactionRule>> {
        self.guilds
            .read()
            .get(&guild_id)
            .filter(|set| set.loaded)
            .map(|set| set.rules.clone())
    }

    #[must_use]
    pub fn is_loaded(&self, guild_id: GuildId) -> bool {
        self.guilds
            .read()
            .get(&guild_id)
            .is_some_and(|set| set.loaded)
    }

    /// Replace the rules of a guild and mark it loaded
    pub fn mark_loaded(&self, guild_id: GuildId, rules: Vec<ReactionRule>) {
        self.guilds
            .write()
            .insert(guild_id, RuleSet { loaded: true, rules });
    }

    /// Append rules to a guild
    ///
    /// An unloaded guild becomes loaded with exactly these rules.
    pub fn append(&self, guild_id: GuildId, rules: Vec<ReactionRule>) {
        let mut guilds = self.guilds.write();
        let set = guilds.entry(guild_id).or_default();
        if !set.loaded {
            set.loaded = true;
            set.rules.clear();
        }
        set.rules.extend(rules);
    }

    /// Drop every rule whose identity is in `identities`, returning how many went
    pub fn remove(&self, guild_id: GuildId, identities: &[EmojiIdentity]) -> usize {
        let mut guilds = self.guilds.write();
        let Some(set) = guilds.get_mut(&guild_id) else {
            return 0;
        };
        let before = set.rules.len();
        set.rules.retain(|rule| !identities.contains(&rule.emoji));
        before - set.rules.len()
    }

    /// The rule that applies to a reacted emoji, if any
    #[must_use]
    pub fn find_match(&self, guild_id: GuildId, reacted: &EmojiIdentity) -> Option<ReactionRule> {
        self.guilds.read().get(&guild_id).and_then(|set| {
            set.rules
                .iter()
                .find(|rule| rule.emoji.matches_reaction(reacted))
                .cloned()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ReactAction;

    fn guild() -> GuildId {
        GuildId::new(7_000_000_000_000_000_001)
    }

    fn rule(emoji: EmojiIdentity) -> ReactionRule {
        ReactionRule::new(guild(), "1", emoji, vec![ReactAction::Delete])
    }

    #[test]
    fn test_unloaded_guild_reads_as_none() {
        let cache = RuleCache::new();
        assert_eq!(cache.get(guild()), None);
        assert!(!cache.is_loaded(guild()));
    }

    #[test]
    fn test_mark_loaded_empty() {
        let cache = RuleCache::new();
        cache.mark_loaded(guild(), vec![]);
        assert_eq!(cache.get(guild()), Some(vec![]));
    }

    #[test]
    fn test_append_to_unloaded_initializes() {
        let cache = RuleCache::new();
        let fire = rule(EmojiIdentity::unicode("🔥"));
        cache.append(guild(), vec![fire.clone()]);

        assert!(cache.is_loaded(guild()));
        assert_eq!(cache.get(guild()), Some(vec![fire]));
    }

    #[test]
    fn test_append_keeps_insertion_order() {
        let cache = RuleCache::new();
        let fire = rule(EmojiIdentity::unicode("🔥"));
        let drops = rule(EmojiIdentity::unicode("💦"));
        cache.mark_loaded(guild(), vec![fire.clone()]);
        cache.append(guild(), vec![drops.clone()]);

        assert_eq!(cache.get(guild()), Some(vec![fire, drops]));
    }

    #[test]
    fn test_remove_to_loaded_empty() {
        let cache = RuleCache::new();
        let fire = rule(EmojiIdentity::unicode("🔥"));
        cache.mark_loaded(guild(), vec![fire]);

        assert_eq!(cache.remove(guild(), &[EmojiIdentity::unicode("🔥")]), 1);
        assert_eq!(cache.get(guild()), Some(vec![]));
        assert_eq!(cache.remove(guild(), &[EmojiIdentity::unicode("🔥")]), 0);
    }

    #[test]
    fn test_find_match() {
        let cache = RuleCache::new();
        let pepe = rule(EmojiIdentity::custom("pepe", "42"));
        cache.mark_loaded(guild(), vec![rule(EmojiIdentity::unicode("🔥")), pepe.clone()]);

        let reacted = EmojiIdentity::custom("pepe_renamed", "42");
        assert_eq!(cache.find_match(guild(), &reacted), Some(pepe));
        assert_eq!(
            cache.find_match(guild(), &EmojiIdentity::unicode("💦")),
            None
        );
    }
}
