//! Built-in slash commands

use super::{Command, CommandHandler, CommandTracker, SerenityGateway};
use crate::registry::Scope;
use crate::rules::ReactionRule;
use crate::{BotResult, Data, ERROR_TARGET};
use async_trait::async_trait;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context, CreateActionRow, CreateCommand, CreateCommandOption,
    CreateInputText, CreateInteractionResponse, CreateInteractionResponseMessage, CreateModal,
    CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption, EditInteractionResponse,
    EmojiId, InputTextStyle, Permissions, ReactionType,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Custom id prefix of the rule creation modal
pub const RULE_MODAL_PREFIX: &str = "reaction_rule_modal:";
/// Custom id prefix of the rule deletion select menu
pub const DELETE_SELECT_PREFIX: &str = "delete_reaction_rules:";
/// Custom id prefix of the rank system modal
pub const RANK_MODAL_PREFIX: &str = "activate_rank_system:";
/// Modal input holding the role ids
pub const ROLES_INPUT: &str = "role_system";
/// Modal input holding the XP values
pub const XP_INPUT: &str = "xp_system";
/// Modal input holding the emoji
pub const EMOJI_INPUT: &str = "emojis";
/// Modal input holding the actions
pub const ACTIONS_INPUT: &str = "actions";
/// Discord limit on select menu options
pub const MAX_SELECT_OPTIONS: usize = 25;
pub const TIMEOUT_MESSAGE: &str = "You took too long to respond, please try again.";

/// Ephemeral message response
pub fn ephemeral(content: impl Into<String>) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Add the built-in commands to `tracker` under `scope`
///
/// # Errors
///
/// Returns `BotError::Conflict` if one of the names is already taken in `scope`.
pub fn register_defaults(tracker: &CommandTracker, scope: Scope) -> BotResult<()> {
    tracker.add(
        scope,
        Command::new("help", "Shows a list of available commands", Arc::new(Help)),
    )?;
    tracker.add(
        scope,
        Command::new("disable", "Removes a command from this server", Arc::new(Disable))
            .with_descriptor(|descriptor| {
                descriptor
                    .default_member_permissions(Permissions::ADMINISTRATOR)
                    .add_option(
                        CreateCommandOption::new(
                            CommandOptionType::String,
                            "command",
                            "The command to remove",
                        )
                        .required(true),
                    )
            }),
    )?;
    tracker.add(
        scope,
        Command::new(
            "reaction-rule",
            "Create moderation rules for reactions",
            Arc::new(CreateReactionRule),
        )
        .with_descriptor(admin_only),
    )?;
    tracker.add(
        scope,
        Command::new(
            "delete-reaction-rules",
            "Delete reaction rules for the server",
            Arc::new(DeleteReactionRules),
        )
        .with_descriptor(admin_only),
    )?;
    tracker.add(
        scope,
        Command::new(
            "activate-rank-system",
            "Activate the rank system for the server",
            Arc::new(ActivateRankSystem),
        )
        .with_descriptor(|descriptor| {
            descriptor.default_member_permissions(Permissions::MANAGE_ROLES)
        }),
    )?;
    Ok(())
}

fn admin_only(descriptor: CreateCommand) -> CreateCommand {
    descriptor.default_member_permissions(Permissions::ADMINISTRATOR)
}

/// Text listing commands, one per line
#[must_use]
pub fn help_text(commands: &[Command]) -> String {
    let mut text = String::from("Available commands:\n");
    for command in commands {
        text.push_str(&format!("/{} - {}\n", command.name, command.description));
    }
    text
}

/// Lists the commands visible in the invoking guild
pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    async fn run(&self, ctx: &Context, data: &Data, interaction: &CommandInteraction) -> BotResult<()> {
        let content = match interaction.guild_id {
            Some(guild_id) => help_text(&data.commands.visible_commands(guild_id)),
            None => "Use this command in a server to see its commands".to_string(),
        };
        interaction
            .create_response(&ctx.http, ephemeral(content))
            .await?;
        Ok(())
    }
}

/// Uninstalls a command in the invoking guild
pub struct Disable;

#[async_trait]
impl CommandHandler for Disable {
    async fn run(&self, ctx: &Context, data: &Data, interaction: &CommandInteraction) -> BotResult<()> {
        let Some(guild_id) = interaction.guild_id else {
            interaction
                .create_response(&ctx.http, ephemeral("This command only works in a server"))
                .await?;
            return Ok(());
        };
        let name = interaction
            .data
            .options
            .iter()
            .find(|option| option.name == "command")
            .and_then(|option| option.value.as_str())
            .unwrap_or_default()
            .to_string();

        let scope = Scope::Guild(guild_id);
        let content = if data.commands.contains(&name, scope) {
            let gateway = SerenityGateway::new(Arc::clone(&ctx.http));
            match data.commands.uninstall(&name, scope, &gateway).await {
                Ok(()) => format!("Command /{name} removed from this server"),
                Err(e) => {
                    warn!(target: ERROR_TARGET, command = %name, guild_id = %guild_id, error = %e, "Failed to disable command");
                    e.user_message().to_string()
                }
            }
        } else if data.commands.contains(&name, Scope::Global) {
            format!("Command /{name} is global and cannot be disabled from a server")
        } else {
            "Command not found".to_string()
        };

        interaction
            .create_response(&ctx.http, ephemeral(content))
            .await?;
        Ok(())
    }
}

/// Opens the rule creation modal
pub struct CreateReactionRule;

/// Modal asking for emoji and actions
#[must_use]
pub fn rule_modal(custom_id: String) -> CreateModal {
    let emojis = CreateInputText::new(InputTextStyle::Short, "Reactions", EMOJI_INPUT)
        .placeholder("Reactions by emoji, name or id, separated by spaces")
        .required(true)
        .min_length(1)
        .max_length(300);
    let actions = CreateInputText::new(InputTextStyle::Short, "Actions", ACTIONS_INPUT)
        .placeholder("delete, warn, ban or kick (default: delete)")
        .required(false)
        .max_length(100);
    CreateModal::new(custom_id, "Reaction rule").components(vec![
        CreateActionRow::InputText(emojis),
        CreateActionRow::InputText(actions),
    ])
}

#[async_trait]
impl CommandHandler for CreateReactionRule {
    async fn run(&self, ctx: &Context, _data: &Data, interaction: &CommandInteraction) -> BotResult<()> {
        let custom_id = format!("{RULE_MODAL_PREFIX}{}", interaction.user.id);
        interaction
            .create_response(&ctx.http, CreateInteractionResponse::Modal(rule_modal(custom_id)))
            .await?;
        Ok(())
    }
}

/// Opens the rank system modal
pub struct ActivateRankSystem;

/// Modal asking for role ids in rank order and their XP
#[must_use]
pub fn rank_modal(custom_id: String) -> CreateModal {
    let roles = CreateInputText::new(InputTextStyle::Paragraph, "Roles", ROLES_INPUT)
        .placeholder("Role ids separated by spaces, lowest rank first. Replaces the current ranks")
        .required(true)
        .min_length(1)
        .max_length(600);
    let xp = CreateInputText::new(InputTextStyle::Paragraph, "XP", XP_INPUT)
        .placeholder("One XP value per role, or a single step between ranks")
        .required(true)
        .min_length(1)
        .max_length(600);
    CreateModal::new(custom_id, "Activate rank system").components(vec![
        CreateActionRow::InputText(roles),
        CreateActionRow::InputText(xp),
    ])
}

#[async_trait]
impl CommandHandler for ActivateRankSystem {
    async fn run(&self, ctx: &Context, _data: &Data, interaction: &CommandInteraction) -> BotResult<()> {
        let custom_id = format!("{RANK_MODAL_PREFIX}{}", interaction.user.id);
        interaction
            .create_response(&ctx.http, CreateInteractionResponse::Modal(rank_modal(custom_id)))
            .await?;
        Ok(())
    }
}

/// Opens the rule deletion select menu, which expires after a timeout
pub struct DeleteReactionRules;

/// Select menu options for the rules of a guild, capped at [`MAX_SELECT_OPTIONS`]
#[must_use]
pub fn select_options(rules: &[ReactionRule]) -> Vec<CreateSelectMenuOption> {
    rules
        .iter()
        .take(MAX_SELECT_OPTIONS)
        .map(|rule| {
            let actions = rule
                .actions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let label = if rule.is_custom {
                format!("{} ({actions})", rule.emoji.emoji_name)
            } else {
                actions
            };
            let option = CreateSelectMenuOption::new(label, rule.emoji.to_option_value());
            match option_emoji(rule) {
                Some(emoji) => option.emoji(emoji),
                None => option,
            }
        })
        .collect()
}

fn option_emoji(rule: &ReactionRule) -> Option<ReactionType> {
    if rule.emoji.is_custom() {
        let id = rule.emoji.emoji_id.parse::<u64>().ok().filter(|id| *id != 0)?;
        Some(ReactionType::Custom {
            animated: false,
            id: EmojiId::new(id),
            name: Some(rule.emoji.emoji_name.clone()),
        })
    } else {
        Some(ReactionType::Unicode(rule.emoji.emoji_name.clone()))
    }
}

#[async_trait]
impl CommandHandler for DeleteReactionRules {
    async fn run(&self, ctx: &Context, data: &Data, interaction: &CommandInteraction) -> BotResult<()> {
        let Some(guild_id) = interaction.guild_id else {
            interaction
                .create_response(&ctx.http, ephemeral("This command only works in a server"))
                .await?;
            return Ok(());
        };

        data.rules.ensure_loaded(guild_id).await?;
        let rules = data.rules.cache().get(guild_id).unwrap_or_default();
        if rules.is_empty() {
            interaction
                .create_response(&ctx.http, ephemeral("There are no reaction rules in this server"))
                .await?;
            return Ok(());
        }

        let options = select_options(&rules);
        let max_values = u8::try_from(options.len()).unwrap_or(u8::MAX);
        let menu = CreateSelectMenu::new(
            format!("{DELETE_SELECT_PREFIX}{}", interaction.user.id),
            CreateSelectMenuKind::String { options },
        )
        .placeholder("Select the reaction rules you want to delete")
        .min_values(1)
        .max_values(max_values);

        interaction
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("Select the reaction rules you want to delete")
                        .ephemeral(true)
                        .components(vec![CreateActionRow::SelectMenu(menu)]),
                ),
            )
            .await?;

        let user = interaction.user.id;
        if let Some(previous) = data.prompts.take(user) {
            if let Err(e) = previous.delete_response(&ctx.http).await {
                debug!(target: ERROR_TARGET, user_id = %user, error = %e, "Previous prompt already gone");
            }
        }
        let token = data.prompts.open(user, interaction.clone());

        let data = data.clone();
        let http = Arc::clone(&ctx.http);
        let timeout = data.config.prompt_timeout();
        tokio::spawn(async move {
            let Some(expired) = data.prompts.expire_after(user, token, timeout).await else {
                return;
            };
            let edit = EditInteractionResponse::new()
                .content(TIMEOUT_MESSAGE)
                .components(vec![]);
            if let Err(e) = expired.edit_response(&http, edit).await {
                warn!(target: ERROR_TARGET, user_id = %user, error = %e, "Failed to expire prompt");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{EmojiIdentity, ReactAction};
    use serenity::all::GuildId;

    fn rule(emoji: EmojiIdentity) -> ReactionRule {
        ReactionRule::new(GuildId::new(1), "2", emoji, vec![ReactAction::Delete])
    }

    #[test]
    fn test_register_defaults() {
        let tracker = CommandTracker::new();
        register_defaults(&tracker, Scope::Global).unwrap();

        for name in [
            "help",
            "disable",
            "reaction-rule",
            "delete-reaction-rules",
            "activate-rank-system",
        ] {
            assert!(tracker.contains(name, Scope::Global), "{name} missing");
        }
        assert!(register_defaults(&tracker, Scope::Global).is_err());
    }

    #[test]
    fn test_help_text() {
        let tracker = CommandTracker::new();
        register_defaults(&tracker, Scope::Global).unwrap();
        let help = tracker.resolve_for_guild("help", None).unwrap();

        assert_eq!(
            help_text(&[help]),
            "Available commands:\n/help - Shows a list of available commands\n"
        );
    }

    #[test]
    fn test_select_options_capped() {
        let rules: Vec<_> = (0..30)
            .map(|i| rule(EmojiIdentity::custom(format!("emoji{i}"), format!("{}", 100 + i))))
            .collect();
        assert_eq!(select_options(&rules).len(), MAX_SELECT_OPTIONS);
    }

    #[test]
    fn test_option_emoji() {
        let custom = rule(EmojiIdentity::custom("pepe", "42"));
        assert!(matches!(
            option_emoji(&custom),
            Some(ReactionType::Custom { id, .. }) if id == EmojiId::new(42)
        ));

        let unicode = rule(EmojiIdentity::unicode("🔥"));
        assert_eq!(
            option_emoji(&unicode),
            Some(ReactionType::Unicode("🔥".to_string()))
        );

        let broken = rule(EmojiIdentity::custom("pepe", "not-a-number"));
        assert_eq!(option_emoji(&broken), None);
    }
}
