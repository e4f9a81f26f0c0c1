//! Inbound events
//!
//! Raw gateway events are classified exactly once, at ingestion, into a
//! [`BotEvent`] tagged with its [`EventKind`] and [`Scope`]. The dispatcher then
//! routes on the kind and scope alone.

pub mod dispatcher;
pub mod interactions;
pub mod moderation;

pub use dispatcher::{DispatchOutcome, Dispatcher, EventHandler};

use crate::commands::builtin::{DELETE_SELECT_PREFIX, RANK_MODAL_PREFIX, RULE_MODAL_PREFIX};
use crate::registry::Scope;
use crate::{BotResult, Data};
use serenity::all::{
    CommandInteraction, ComponentInteraction, Context, Guild, GuildId, Interaction,
    ModalInteraction, Reaction, UserId,
};
use derive_more::Display;
use std::sync::Arc;

/// Routing key of an inbound event
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[display("reaction_add")]
    ReactionAdd,
    #[display("guild_create")]
    GuildCreate,
    #[display("slash_command")]
    SlashCommand,
    #[display("reaction_rule_modal")]
    ReactionRuleModal,
    #[display("delete_rules_select")]
    DeleteRulesSelect,
    #[display("activate_rank_system_modal")]
    ActivateRankSystemModal,
}

impl EventKind {
    pub const ALL: [Self; 6] = [
        Self::ReactionAdd,
        Self::GuildCreate,
        Self::SlashCommand,
        Self::ReactionRuleModal,
        Self::DeleteRulesSelect,
        Self::ActivateRankSystemModal,
    ];

    /// Registry key of the kind, same text as its `Display`
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReactionAdd => "reaction_add",
            Self::GuildCreate => "guild_create",
            Self::SlashCommand => "slash_command",
            Self::ReactionRuleModal => "reaction_rule_modal",
            Self::DeleteRulesSelect => "delete_rules_select",
            Self::ActivateRankSystemModal => "activate_rank_system_modal",
        }
    }

    /// Kind of a component or modal interaction, decided by its custom id
    #[must_use]
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        if custom_id.starts_with(RULE_MODAL_PREFIX) {
            Some(Self::ReactionRuleModal)
        } else if custom_id.starts_with(DELETE_SELECT_PREFIX) {
            Some(Self::DeleteRulesSelect)
        } else if custom_id.starts_with(RANK_MODAL_PREFIX) {
            Some(Self::ActivateRankSystemModal)
        } else {
            None
        }
    }
}

/// A classified gateway event
#[derive(Debug, Clone)]
pub enum BotEvent {
    ReactionAdd(Box<Reaction>),
    GuildCreate { guild_id: GuildId, owner_id: UserId },
    SlashCommand(Box<CommandInteraction>),
    ReactionRuleModal(Box<ModalInteraction>),
    DeleteRulesSelect(Box<ComponentInteraction>),
    ActivateRankSystemModal(Box<ModalInteraction>),
}

impl BotEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ReactionAdd(_) => EventKind::ReactionAdd,
            Self::GuildCreate { .. } => EventKind::GuildCreate,
            Self::SlashCommand(_) => EventKind::SlashCommand,
            Self::ReactionRuleModal(_) => EventKind::ReactionRuleModal,
            Self::DeleteRulesSelect(_) => EventKind::DeleteRulesSelect,
            Self::ActivateRankSystemModal(_) => EventKind::ActivateRankSystemModal,
        }
    }
}

/// An event ready for dispatch
#[derive(Debug, Clone)]
pub struct Classified {
    pub kind: EventKind,
    pub scope: Scope,
    pub event: BotEvent,
}

impl Classified {
    fn new(scope: Scope, event: BotEvent) -> Self {
        Self {
            kind: event.kind(),
            scope,
            event,
        }
    }
}

/// Payload handed to event handlers
#[derive(Clone)]
pub struct Dispatched {
    pub ctx: Context,
    pub event: BotEvent,
}

/// Classify an added reaction; reactions outside guilds are not routed
#[must_use]
pub fn classify_reaction(reaction: Reaction) -> Option<Classified> {
    let guild_id = reaction.guild_id?;
    Some(Classified::new(
        Scope::Guild(guild_id),
        BotEvent::ReactionAdd(Box::new(reaction)),
    ))
}

#[must_use]
pub fn classify_guild(guild: &Guild) -> Classified {
    Classified::new(
        Scope::Guild(guild.id),
        BotEvent::GuildCreate {
            guild_id: guild.id,
            owner_id: guild.owner_id,
        },
    )
}

/// Classify an interaction; unknown interactions are not routed
#[must_use]
pub fn classify_interaction(interaction: Interaction) -> Option<Classified> {
    match interaction {
        Interaction::Command(command) => Some(Classified::new(
            Scope::from_guild(command.guild_id),
            BotEvent::SlashCommand(Box::new(command)),
        )),
        Interaction::Modal(modal) => {
            match EventKind::from_custom_id(&modal.data.custom_id)? {
                EventKind::ReactionRuleModal => Some(Classified::new(
                    Scope::Guild(modal.guild_id?),
                    BotEvent::ReactionRuleModal(Box::new(modal)),
                )),
                EventKind::ActivateRankSystemModal => Some(Classified::new(
                    Scope::Guild(modal.guild_id?),
                    BotEvent::ActivateRankSystemModal(Box::new(modal)),
                )),
                _ => None,
            }
        }
        Interaction::Component(component) => {
            match EventKind::from_custom_id(&component.data.custom_id)? {
                EventKind::DeleteRulesSelect => Some(Classified::new(
                    Scope::Guild(component.guild_id?),
                    BotEvent::DeleteRulesSelect(Box::new(component)),
                )),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Register the event handlers under `scope`
///
/// # Errors
///
/// Returns `BotError::Conflict` if a kind already has a handler in `scope`.
pub fn register_defaults(
    dispatcher: &Dispatcher<Dispatched>,
    data: &Data,
    scope: Scope,
) -> BotResult<()> {
    dispatcher.register(
        EventKind::ReactionAdd,
        scope,
        Arc::new(moderation::ReactionModeration::new(data.clone())),
    )?;
    // Every guild the bot is in must be known to the persistence service
    dispatcher.register(
        EventKind::GuildCreate,
        Scope::Global,
        Arc::new(moderation::GuildJoin::new(data.clone())),
    )?;
    dispatcher.register(
        EventKind::SlashCommand,
        scope,
        Arc::new(interactions::SlashCommandRouter::new(data.clone())),
    )?;
    dispatcher.register(
        EventKind::ReactionRuleModal,
        scope,
        Arc::new(interactions::RuleModalSubmit::new(data.clone())),
    )?;
    dispatcher.register(
        EventKind::DeleteRulesSelect,
        scope,
        Arc::new(interactions::DeleteRulesSelect::new(data.clone())),
    )?;
    dispatcher.register(
        EventKind::ActivateRankSystemModal,
        scope,
        Arc::new(interactions::RankModalSubmit::new(data.clone())),
    )?;
    Ok(())
}
