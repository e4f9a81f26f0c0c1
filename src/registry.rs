//! Guild-scoped registry
//!
//! A two-level table mapping `(key, scope)` to a value, where the global scope
//! acts as the default for every guild that has no override of its own.

use crate::{BotError, BotResult};
use derive_more::Display;
use parking_lot::RwLock;
use serenity::all::GuildId;
use std::collections::HashMap;

/// Where a registry entry applies
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Default entry used by every guild without an override
    #[display("global")]
    Global,
    /// Override for a single guild
    #[display("guild {_0}")]
    Guild(GuildId),
}

impl Scope {
    /// Scope for an optional guild, global when there is none (DMs)
    #[must_use]
    pub fn from_guild(guild_id: Option<GuildId>) -> Self {
        guild_id.map_or(Self::Global, Self::Guild)
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    #[must_use]
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::Global => None,
            Self::Guild(id) => Some(*id),
        }
    }
}

/// A snapshot of one registry entry
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub key: String,
    pub scope: Scope,
    pub value: T,
}

/// Registry of values keyed by name and scope
///
/// Every read takes the shared lock and every write the exclusive one. The lock
/// is never held across an await point; callers get clones of the stored values.
pub struct ScopedRegistry<T> {
    entries: RwLock<HashMap<(String, Scope), T>>,
}

impl<T> Default for ScopedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ScopedRegistry<T> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a value under `(key, scope)`
    ///
    /// # Errors
    ///
    /// Returns `BotError::Conflict` if an entry already exists for the pair. The
    /// existing entry is left untouched.
    pub fn register(&self, key: impl Into<String>, scope: Scope, value: T) -> BotResult<()> {
        let key = key.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&(key.clone(), scope)) {
            return Err(BotError::Conflict(format!(
                "{key} is already registered for {scope}"
            )));
        }
        entries.insert((key, scope), value);
        Ok(())
    }

    /// Remove the entry registered under exactly `(key, scope)`
    ///
    /// # Errors
    ///
    /// Returns `BotError::NotFound` if there is no such entry.
    pub fn remove(&self, key: &str, scope: Scope) -> BotResult<T> {
        self.entries
            .write()
            .remove(&(key.to_string(), scope))
            .ok_or_else(|| BotError::NotFound(format!("{key} is not registered for {scope}")))
    }

    /// Mutate the entry registered under exactly `(key, scope)`
    ///
    /// # Errors
    ///
    /// Returns `BotError::NotFound` if there is no such entry.
    pub fn update<R>(&self, key: &str, scope: Scope, f: impl FnOnce(&mut T) -> R) -> BotResult<R> {
        let mut entries = self.entries.write();
        let value = entries
            .get_mut(&(key.to_string(), scope))
            .ok_or_else(|| BotError::NotFound(format!("{key} is not registered for {scope}")))?;
        Ok(f(value))
    }

    /// Number of entries across all scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone> ScopedRegistry<T> {
    /// Resolve `key` for `scope`, falling back to the global entry
    ///
    /// # Errors
    ///
    /// Returns `BotError::NotFound` when neither a scoped nor a global entry exists.
    pub fn resolve(&self, key: &str, scope: Scope) -> BotResult<T> {
        self.resolve_entry(key, scope).map(|entry| entry.value)
    }

    /// Like [`Self::resolve`], but also reports which scope the value came from
    ///
    /// # Errors
    ///
    /// Returns `BotError::NotFound` when neither a scoped nor a global entry exists.
    pub fn resolve_entry(&self, key: &str, scope: Scope) -> BotResult<Entry<T>> {
        let entries = self.entries.read();
        let mut lookup = (key.to_string(), scope);
        if let Some(value) = entries.get(&lookup) {
            return Ok(Entry {
                key: lookup.0,
                scope,
                value: value.clone(),
            });
        }
        lookup.1 = Scope::Global;
        entries
            .get(&lookup)
            .map(|value| Entry {
                key: key.to_string(),
                scope: Scope::Global,
                value: value.clone(),
            })
            .ok_or_else(|| BotError::NotFound(format!("{key} is not registered for {scope}")))
    }

    /// Get the entry registered under exactly `(key, scope)`, without fallback
    #[must_use]
    pub fn get(&self, key: &str, scope: Scope) -> Option<T> {
        self.entries.read().get(&(key.to_string(), scope)).cloned()
    }

    /// All entries visible from `scope`, sorted by key with scoped entries first
    #[must_use]
    pub fn list(&self, scope: Scope, include_global: bool) -> Vec<Entry<T>> {
        let mut visible: Vec<Entry<T>> = self
            .entries
            .read()
            .iter()
            .filter(|((_, entry_scope), _)| {
                *entry_scope == scope || (include_global && entry_scope.is_global())
            })
            .map(|((key, entry_scope), value)| Entry {
                key: key.clone(),
                scope: *entry_scope,
                value: value.clone(),
            })
            .collect();
        visible.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.scope.is_global().cmp(&b.scope.is_global()))
        });
        visible
    }

    /// Snapshot of every entry in every scope
    #[must_use]
    pub fn entries(&self) -> Vec<Entry<T>> {
        self.entries
            .read()
            .iter()
            .map(|((key, scope), value)| Entry {
                key: key.clone(),
                scope: *scope,
                value: value.clone(),
            })
            .collect()
    }
}
