//! Reaction moderation rules
//!
//! This module provides the rule types, the per-guild cache, the persistence
//! service client and the sync client that keeps the two aligned.

pub mod backend;
pub mod cache;
pub mod client;
pub mod parse;
pub mod rule;

pub use backend::{GuildRecord, HttpRulesBackend, RulesBackend};
#[cfg(test)]
pub use backend::MockRulesBackend;
pub use cache::{RuleCache, RuleSet};
pub use client::SyncClient;
pub use parse::{ParsedInput, parse_rule_input};
pub use rule::{EmojiIdentity, ReactAction, ReactionRule};
