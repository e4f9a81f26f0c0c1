//! Per-guild rank systems
//!
//! A rank system is an ordered list of roles, each reached at an XP
//! threshold. Activating a system for a guild replaces any previous one.

use crate::{BotError, BotResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serenity::all::{GuildId, RoleId, UserId};
use std::collections::{HashMap, HashSet};

/// One rank of a guild's ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank {
    /// 1-based position in the ladder
    pub level: u8,
    /// XP needed to reach this rank
    pub xp: u32,
    pub role_id: RoleId,
}

/// The active rank system of a guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSystem {
    pub guild_id: GuildId,
    /// User who activated the system
    pub owner_id: UserId,
    pub ranks: Vec<Rank>,
    pub activated_at: DateTime<Utc>,
}

/// Rank systems keyed by guild
#[derive(Debug, Default)]
pub struct RankRegistry {
    guilds: RwLock<HashMap<GuildId, RankSystem>>,
}

impl RankRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rank system, returning the one it replaced
    pub fn activate(
        &self,
        guild_id: GuildId,
        owner_id: UserId,
        ranks: Vec<Rank>,
    ) -> Option<RankSystem> {
        let system = RankSystem {
            guild_id,
            owner_id,
            ranks,
            activated_at: Utc::now(),
        };
        self.guilds.write().insert(guild_id, system)
    }

    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<RankSystem> {
        self.guilds.read().get(&guild_id).cloned()
    }

    #[must_use]
    pub fn is_active(&self, guild_id: GuildId) -> bool {
        self.guilds.read().contains_key(&guild_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guilds.read().is_empty()
    }
}

fn parse_xp(token: &str) -> BotResult<u32> {
    token
        .parse()
        .map_err(|_| BotError::BadRequest("xp should be a number".to_string()))
}

/// Parse the rank modal: role ids in rank order, and XP values
///
/// XP is either one value per role, or a single step where rank `n` needs
/// `n * step`. Every role must exist in the guild and appear once.
///
/// # Errors
///
/// Returns `BotError::BadRequest` with a message fit for the user.
pub fn parse_rank_input(
    roles_text: &str,
    xp_text: &str,
    guild_roles: &[RoleId],
) -> BotResult<Vec<Rank>> {
    if guild_roles.is_empty() {
        return Err(BotError::BadRequest("no roles found in the guild".to_string()));
    }
    let ids: Vec<&str> = roles_text.split_whitespace().collect();
    if ids.is_empty() {
        return Err(BotError::BadRequest("no role ids given".to_string()));
    }
    let xps = xp_text
        .split_whitespace()
        .map(parse_xp)
        .collect::<BotResult<Vec<_>>>()?;
    let step = match xps.as_slice() {
        [step] => Some(*step),
        _ if xps.len() == ids.len() => None,
        _ => {
            return Err(BotError::BadRequest(
                "ids and xps should have the same length or xps should have length 1".to_string(),
            ));
        }
    };

    let mut seen = HashSet::new();
    let mut ranks = Vec::with_capacity(ids.len());
    for (index, id) in ids.iter().enumerate() {
        let role_id = id
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(RoleId::new)
            .filter(|role_id| guild_roles.contains(role_id))
            .ok_or_else(|| BotError::BadRequest(format!("unknown role id: {id}")))?;
        if !seen.insert(role_id) {
            return Err(BotError::BadRequest(format!("duplicate role id found: {id}")));
        }
        let level = u8::try_from(index + 1)
            .map_err(|_| BotError::BadRequest("too many ranks".to_string()))?;
        let xp = match step {
            Some(step) => step
                .checked_mul(u32::from(level))
                .ok_or_else(|| BotError::BadRequest("xp is too large".to_string()))?,
            None => xps[index],
        };
        ranks.push(Rank { level, xp, role_id });
    }
    Ok(ranks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn guild() -> GuildId {
        GuildId::new(5_000_000_000_000_000_001)
    }

    fn roles() -> Vec<RoleId> {
        vec![RoleId::new(11), RoleId::new(22), RoleId::new(33)]
    }

    fn bad_request(result: BotResult<Vec<Rank>>) -> String {
        match result {
            Err(BotError::BadRequest(message)) => message,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn test_one_xp_per_role() {
        let ranks = parse_rank_input("11 22 33", "100 250 600", &roles()).unwrap();
        assert_eq!(
            ranks,
            vec![
                Rank { level: 1, xp: 100, role_id: RoleId::new(11) },
                Rank { level: 2, xp: 250, role_id: RoleId::new(22) },
                Rank { level: 3, xp: 600, role_id: RoleId::new(33) },
            ]
        );
    }

    #[test]
    fn test_single_xp_step() {
        let ranks = parse_rank_input("33 11", "150", &roles()).unwrap();
        assert_eq!(
            ranks.iter().map(|r| (r.level, r.xp, r.role_id)).collect::<Vec<_>>(),
            vec![(1, 150, RoleId::new(33)), (2, 300, RoleId::new(11))]
        );
    }

    #[test]
    fn test_rejected_inputs() {
        assert_eq!(
            bad_request(parse_rank_input("11 22", "10 20 30", &roles())),
            "ids and xps should have the same length or xps should have length 1"
        );
        assert_eq!(
            bad_request(parse_rank_input("11 11", "10", &roles())),
            "duplicate role id found: 11"
        );
        assert_eq!(
            bad_request(parse_rank_input("11 44", "10", &roles())),
            "unknown role id: 44"
        );
        assert_eq!(
            bad_request(parse_rank_input("11", "lots", &roles())),
            "xp should be a number"
        );
        assert_eq!(
            bad_request(parse_rank_input("11", "10", &[])),
            "no roles found in the guild"
        );
        assert_eq!(bad_request(parse_rank_input("  ", "10", &roles())), "no role ids given");
        assert_eq!(
            bad_request(parse_rank_input("11 22", "4294967295", &roles())),
            "xp is too large"
        );
    }

    #[test]
    fn test_activate_replaces_previous_system() {
        let registry = RankRegistry::new();
        let owner = UserId::new(7);
        let first = parse_rank_input("11", "10", &roles()).unwrap();
        let second = parse_rank_input("22 33", "50", &roles()).unwrap();

        assert!(registry.activate(guild(), owner, first.clone()).is_none());
        let replaced = registry.activate(guild(), owner, second.clone()).unwrap();

        assert_eq!(replaced.ranks, first);
        assert_eq!(registry.get(guild()).unwrap().ranks, second);
        assert_eq!(registry.len(), 1);
        assert!(!registry.is_active(GuildId::new(1)));
    }

    #[test]
    fn test_errors_are_bad_requests() {
        let error = parse_rank_input("x", "1", &roles()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }
}
