//! Sync client keeping the rule cache aligned with the persistence service
//!
//! Validation and conflict detection run against the cache before any network
//! call. Fetches, posts and deletes for one guild are serialized by a
//! per-guild async mutex, so a conflict check and the write that follows it
//! cannot interleave with another writer of the same guild, and a fetch result
//! is never applied on top of a newer write.

use super::backend::{GuildRecord, RulesBackend};
use super::cache::RuleCache;
use super::rule::{self, EmojiIdentity, ReactionRule};
use crate::{BotError, BotResult, ErrorKind, EVENT_TARGET};
use dashmap::DashMap;
use serenity::all::{GuildId, UserId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rule cache plus the remote store behind it
pub struct SyncClient {
    cache: RuleCache,
    backend: Arc<dyn RulesBackend>,
    write_guards: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl SyncClient {
    pub fn new(backend: Arc<dyn RulesBackend>) -> Self {
        Self {
            cache: RuleCache::new(),
            backend,
            write_guards: DashMap::new(),
        }
    }

    /// Read access to the cache
    #[must_use]
    pub fn cache(&self) -> &RuleCache {
        &self.cache
    }

    fn write_guard(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        Arc::clone(self.write_guards.entry(guild_id).or_default().value())
    }

    /// Fetch the rules of a guild and mark it loaded
    ///
    /// A guild the service does not know yet is loaded with no rules. Runs
    /// under the guild's write guard, so a fetch never overwrites rules written
    /// by a post or delete that finished while it was in flight.
    ///
    /// # Errors
    ///
    /// Any backend failure other than not found, with its kind preserved.
    pub async fn fetch_reaction_rules(&self, guild_id: GuildId) -> BotResult<Vec<ReactionRule>> {
        let guard = self.write_guard(guild_id);
        let _guard = guard.lock().await;
        self.load(guild_id).await
    }

    /// Make sure the guild is loaded, fetching only when it is not
    ///
    /// # Errors
    ///
    /// Same as [`Self::fetch_reaction_rules`].
    pub async fn ensure_loaded(&self, guild_id: GuildId) -> BotResult<()> {
        if self.cache.is_loaded(guild_id) {
            return Ok(());
        }
        let guard = self.write_guard(guild_id);
        let _guard = guard.lock().await;
        self.load_if_unloaded(guild_id).await
    }

    /// Caller holds the guild's write guard
    async fn load(&self, guild_id: GuildId) -> BotResult<Vec<ReactionRule>> {
        let rules = match self.backend.fetch_reaction_rules(guild_id).await {
            Ok(rules) => rules,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        debug!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            count = rules.len(),
            "Fetched reaction rules"
        );
        self.cache.mark_loaded(guild_id, rules.clone());
        Ok(rules)
    }

    /// Caller holds the guild's write guard
    async fn load_if_unloaded(&self, guild_id: GuildId) -> BotResult<()> {
        if !self.cache.is_loaded(guild_id) {
            self.load(guild_id).await?;
        }
        Ok(())
    }

    /// Validate, conflict-check and persist a batch of rules
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an invalid batch (no network call is made)
    /// - `Conflict` when two candidates or a candidate and a cached rule share an identity
    /// - `Internal` when the backend rejects or fails the create; the cache is untouched
    pub async fn post_reaction_rules(
        &self,
        guild_id: GuildId,
        candidates: Vec<ReactionRule>,
    ) -> BotResult<Vec<ReactionRule>> {
        let guard = self.write_guard(guild_id);
        let _guard = guard.lock().await;

        rule::validate_batch(guild_id, &candidates)?;
        if let Some(identity) = rule::find_batch_overlap(&candidates) {
            return Err(BotError::Conflict(format!(
                "{identity} appears more than once in the request"
            )));
        }

        self.load_if_unloaded(guild_id).await?;
        let existing = self.cache.get(guild_id).unwrap_or_default();
        if let Some(identity) = rule::find_existing_overlap(&existing, &candidates) {
            return Err(BotError::Conflict(format!(
                "a rule on {identity} already exists"
            )));
        }

        let created = self
            .backend
            .create_reaction_rules(candidates)
            .await
            .map_err(BotError::into_internal)?;
        self.cache.append(guild_id, created.clone());

        info!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            count = created.len(),
            "Created reaction rules"
        );
        Ok(created)
    }

    /// Delete the rules with the given identities, all or nothing
    ///
    /// # Errors
    ///
    /// - `BadRequest` for an empty list
    /// - `NotFound` when any identity has no rule (nothing is deleted)
    /// - `Internal` when the backend fails the delete; the cache is untouched
    pub async fn delete_reaction_rules(
        &self,
        guild_id: GuildId,
        identities: Vec<EmojiIdentity>,
    ) -> BotResult<()> {
        let guard = self.write_guard(guild_id);
        let _guard = guard.lock().await;

        if identities.is_empty() {
            return Err(BotError::BadRequest("no rules selected".to_string()));
        }

        self.load_if_unloaded(guild_id).await?;
        let existing = self.cache.get(guild_id).unwrap_or_default();
        if let Some(missing) = identities
            .iter()
            .find(|identity| !existing.iter().any(|rule| rule.emoji == **identity))
        {
            return Err(BotError::NotFound(format!("no rule on {missing}")));
        }

        let message = self
            .backend
            .delete_reaction_rules(guild_id, identities.clone())
            .await
            .map_err(BotError::into_internal)?;
        let removed = self.cache.remove(guild_id, &identities);

        info!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            removed,
            message = %message,
            "Deleted reaction rules"
        );
        Ok(())
    }

    /// Make sure the service knows a guild the bot joined, then load its rules
    ///
    /// # Errors
    ///
    /// Any backend failure other than the guild already existing.
    pub async fn register_guild(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
    ) -> BotResult<Vec<ReactionRule>> {
        match self.backend.get_guild(guild_id).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let record = GuildRecord {
                    guild_id: guild_id.to_string(),
                    owner_id: owner_id.to_string(),
                };
                match self.backend.create_guild(record).await {
                    Ok(_) => info!(target: EVENT_TARGET, guild_id = %guild_id, "Registered guild"),
                    Err(e) if e.kind() == ErrorKind::Conflict => {}
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
        self.fetch_reaction_rules(guild_id).await
    }
}
