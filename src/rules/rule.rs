//! Reaction rule types
//!
//! A reaction rule binds an emoji identity to the moderation actions taken when
//! that emoji is added to a message in a guild.

use crate::{BotError, BotResult};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, ReactionType};
use std::collections::HashSet;
use std::str::FromStr;

/// Maximum number of actions a single rule may carry
pub const MAX_ACTIONS: usize = 4;

/// Moderation action attached to a rule
///
/// Serialized as the integer the persistence service stores.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReactAction {
    /// Remove the reaction
    Delete,
    Warn,
    Ban,
    Kick,
}

impl From<ReactAction> for u8 {
    fn from(action: ReactAction) -> Self {
        match action {
            ReactAction::Delete => 0,
            ReactAction::Warn => 1,
            ReactAction::Ban => 2,
            ReactAction::Kick => 3,
        }
    }
}

impl TryFrom<u8> for ReactAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Delete),
            1 => Ok(Self::Warn),
            2 => Ok(Self::Ban),
            3 => Ok(Self::Kick),
            other => Err(format!("unknown reaction action {other}")),
        }
    }
}

impl FromStr for ReactAction {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" | "remove" => Ok(Self::Delete),
            "warn" => Ok(Self::Warn),
            "ban" => Ok(Self::Ban),
            "kick" => Ok(Self::Kick),
            other => Err(BotError::BadRequest(format!("unknown action {other:?}"))),
        }
    }
}

/// The emoji a rule reacts to
///
/// Empty strings stand for absent fields, matching the persistence service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiIdentity {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub emoji_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub emoji_id: String,
}

impl EmojiIdentity {
    /// Identity of a unicode emoji
    pub fn unicode(name: impl Into<String>) -> Self {
        Self {
            emoji_name: name.into(),
            emoji_id: String::new(),
        }
    }

    /// Identity of a guild custom emoji
    pub fn custom(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            emoji_name: name.into(),
            emoji_id: id.into(),
        }
    }

    /// Identity of a reaction as delivered by the gateway
    #[must_use]
    pub fn from_reaction(reaction: &ReactionType) -> Option<Self> {
        match reaction {
            ReactionType::Custom { id, name, .. } => Some(Self::custom(
                name.clone().unwrap_or_default(),
                id.to_string(),
            )),
            ReactionType::Unicode(name) => Some(Self::unicode(name.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.emoji_name.is_empty() && self.emoji_id.is_empty()
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        !self.emoji_id.is_empty()
    }

    /// Whether two identities would fight over the same reaction
    ///
    /// True when their non-empty ids are equal or their non-empty names are equal.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let same_id = !self.emoji_id.is_empty() && self.emoji_id == other.emoji_id;
        let same_name = !self.emoji_name.is_empty() && self.emoji_name == other.emoji_name;
        same_id || same_name
    }

    /// Whether a rule with this identity applies to a reacted emoji
    ///
    /// Custom emoji are matched by id (names can be renamed), unicode emoji by name.
    #[must_use]
    pub fn matches_reaction(&self, reacted: &Self) -> bool {
        if reacted.is_custom() {
            self.emoji_id == reacted.emoji_id
        } else {
            !self.is_custom() && !reacted.emoji_name.is_empty() && self.emoji_name == reacted.emoji_name
        }
    }

    /// Value used for a select menu option, `name:id`
    #[must_use]
    pub fn to_option_value(&self) -> String {
        format!("{}:{}", self.emoji_name, self.emoji_id)
    }

    /// Parse a value produced by [`Self::to_option_value`]
    #[must_use]
    pub fn from_option_value(value: &str) -> Option<Self> {
        let (name, id) = value.rsplit_once(':')?;
        let identity = Self::custom(name, id);
        (!identity.is_empty()).then_some(identity)
    }
}

impl std::fmt::Display for EmojiIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_custom() {
            write!(f, "<:{}:{}>", self.emoji_name, self.emoji_id)
        } else {
            write!(f, "{}", self.emoji_name)
        }
    }
}

/// A moderation rule bound to a reaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRule {
    pub guild_id: String,
    pub rule_author: String,
    #[serde(flatten)]
    pub emoji: EmojiIdentity,
    #[serde(default)]
    pub is_custom: bool,
    pub actions: Vec<ReactAction>,
}

impl ReactionRule {
    /// Create a new rule for a guild
    pub fn new(
        guild_id: GuildId,
        rule_author: impl Into<String>,
        emoji: EmojiIdentity,
        actions: Vec<ReactAction>,
    ) -> Self {
        Self {
            guild_id: guild_id.to_string(),
            rule_author: rule_author.into(),
            is_custom: emoji.is_custom(),
            emoji,
            actions,
        }
    }

    #[must_use]
    pub fn has_action(&self, action: ReactAction) -> bool {
        self.actions.contains(&action)
    }

    /// Check a single rule in isolation
    ///
    /// # Errors
    ///
    /// Returns `BotError::BadRequest` when the identity is missing, or when the
    /// actions are empty, too many, or repeated.
    pub fn validate(&self) -> BotResult<()> {
        if self.emoji.is_empty() {
            return Err(BotError::BadRequest(
                "rule has neither an emoji name nor an emoji id".to_string(),
            ));
        }
        if self.actions.is_empty() || self.actions.len() > MAX_ACTIONS {
            return Err(BotError::BadRequest(format!(
                "rule on {} must have between 1 and {MAX_ACTIONS} actions",
                self.emoji
            )));
        }
        let distinct: HashSet<_> = self.actions.iter().collect();
        if distinct.len() != self.actions.len() {
            return Err(BotError::BadRequest(format!(
                "rule on {} repeats an action",
                self.emoji
            )));
        }
        Ok(())
    }
}

/// Validate a batch of candidates for one guild
///
/// # Errors
///
/// Returns `BotError::BadRequest` for an empty batch, an invalid rule, or a rule
/// addressed to another guild.
pub fn validate_batch(guild_id: GuildId, rules: &[ReactionRule]) -> BotResult<()> {
    if rules.is_empty() {
        return Err(BotError::BadRequest("no rules provided".to_string()));
    }
    let guild = guild_id.to_string();
    for rule in rules {
        if rule.guild_id != guild {
            return Err(BotError::BadRequest(format!(
                "rule on {} belongs to guild {}, not {guild}",
                rule.emoji, rule.guild_id
            )));
        }
        rule.validate()?;
    }
    Ok(())
}

/// Find the first pair of candidates that share an identity
#[must_use]
pub fn find_batch_overlap(rules: &[ReactionRule]) -> Option<&EmojiIdentity> {
    rules.iter().enumerate().find_map(|(i, rule)| {
        rules[i + 1..]
            .iter()
            .any(|other| rule.emoji.overlaps(&other.emoji))
            .then_some(&rule.emoji)
    })
}

/// Find the first candidate whose identity is already taken by an existing rule
#[must_use]
pub fn find_existing_overlap<'a>(
    existing: &[ReactionRule],
    candidates: &'a [ReactionRule],
) -> Option<&'a EmojiIdentity> {
    candidates
        .iter()
        .find(|candidate| {
            existing
                .iter()
                .any(|rule| rule.emoji.overlaps(&candidate.emoji))
        })
        .map(|candidate| &candidate.emoji)
}
