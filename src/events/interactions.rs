//! Interaction handlers: slash commands, the rule and rank modals and the
//! delete select menu

use super::{BotEvent, Dispatched, EventHandler};
use crate::commands::builtin::{ACTIONS_INPUT, EMOJI_INPUT, ROLES_INPUT, XP_INPUT, ephemeral};
use crate::logging::{log_command_end, log_command_error, log_command_start};
use crate::ranks::parse_rank_input;
use crate::rules::{EmojiIdentity, ParsedInput, parse_rule_input};
use crate::{BotError, BotResult, Data, ERROR_TARGET, EVENT_TARGET};
use async_trait::async_trait;
use serenity::all::{
    ActionRow, ActionRowComponent, ComponentInteraction, ComponentInteractionDataKind, Context,
    CreateInteractionResponse, CreateInteractionResponseMessage, GuildId, ModalInteraction, RoleId,
};
use tracing::{error, info, warn};

/// Routes slash commands to the command resolved for the invoking guild
pub struct SlashCommandRouter {
    data: Data,
}

impl SlashCommandRouter {
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

#[async_trait]
impl EventHandler<Dispatched> for SlashCommandRouter {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::SlashCommand(interaction) = payload.event else {
            return;
        };
        let ctx = payload.ctx;

        let command = match self
            .data
            .commands
            .resolve_for_guild(&interaction.data.name, interaction.guild_id)
        {
            Ok(command) => command,
            Err(e) => {
                warn!(target: ERROR_TARGET, command = %interaction.data.name, error = %e, "Unknown command");
                if let Err(e) = interaction
                    .create_response(&ctx.http, ephemeral("Command not found"))
                    .await
                {
                    error!(target: ERROR_TARGET, error = %e, "Failed to respond to unknown command");
                }
                return;
            }
        };

        let started = log_command_start(&interaction);
        match command.handler.run(&ctx, &self.data, &interaction).await {
            Ok(()) => log_command_end(&interaction, started),
            Err(e) => {
                log_command_error(&interaction, &e);
                if let Err(e) = interaction
                    .create_response(&ctx.http, ephemeral(e.user_message()))
                    .await
                {
                    error!(target: ERROR_TARGET, error = %e, "Failed to report command error");
                }
            }
        }
    }
}

/// Value of the modal text input with the given custom id, empty when absent
#[must_use]
pub fn input_value(rows: &[ActionRow], custom_id: &str) -> String {
    rows.iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(input) if input.custom_id == custom_id => {
                Some(input.value.clone().unwrap_or_default())
            }
            _ => None,
        })
        .unwrap_or_default()
}

/// Values of the emoji and actions inputs of the rule modal
#[must_use]
pub fn modal_inputs(rows: &[ActionRow]) -> (String, String) {
    (input_value(rows, EMOJI_INPUT), input_value(rows, ACTIONS_INPUT))
}

/// Reply after a rule modal submission
#[must_use]
pub fn created_message(parsed: &ParsedInput) -> String {
    let emojis = parsed
        .rules
        .iter()
        .map(|rule| rule.emoji.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let mut message = format!("Reaction rules created: {emojis}");
    if !parsed.unknown.is_empty() {
        message.push_str(&format!("\nIgnored: {}", parsed.unknown.join(" ")));
    }
    message
}

/// Creates rules from the submitted modal
pub struct RuleModalSubmit {
    data: Data,
}

impl RuleModalSubmit {
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    async fn create_rules(
        &self,
        ctx: &Context,
        modal: &ModalInteraction,
        guild_id: GuildId,
    ) -> BotResult<String> {
        let (emoji_text, actions_text) = modal_inputs(&modal.data.components);
        let guild_emojis: Vec<EmojiIdentity> = guild_id
            .emojis(&ctx.http)
            .await?
            .into_iter()
            .map(|emoji| EmojiIdentity::custom(emoji.name, emoji.id.to_string()))
            .collect();

        let mut parsed = parse_rule_input(
            &emoji_text,
            &actions_text,
            guild_id,
            &modal.user.id.to_string(),
            &guild_emojis,
        )?;
        if parsed.rules.is_empty() {
            return Ok("No valid emojis found in the input".to_string());
        }

        parsed.rules = self
            .data
            .rules
            .post_reaction_rules(guild_id, parsed.rules)
            .await?;
        Ok(created_message(&parsed))
    }
}

#[async_trait]
impl EventHandler<Dispatched> for RuleModalSubmit {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::ReactionRuleModal(modal) = payload.event else {
            return;
        };
        let Some(guild_id) = modal.guild_id else {
            return;
        };
        let ctx = payload.ctx;

        let content = match self.create_rules(&ctx, &modal, guild_id).await {
            Ok(content) => content,
            Err(e) => {
                warn!(target: ERROR_TARGET, guild_id = %guild_id, error = %e, "Failed to create reaction rules");
                e.user_message().to_string()
            }
        };
        if let Err(e) = modal.create_response(&ctx.http, ephemeral(content)).await {
            error!(target: ERROR_TARGET, error = %e, "Failed to respond to rule modal");
        }
    }
}

/// Activates a rank system from the submitted modal
pub struct RankModalSubmit {
    data: Data,
}

impl RankModalSubmit {
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    async fn activate(
        &self,
        ctx: &Context,
        modal: &ModalInteraction,
        guild_id: GuildId,
    ) -> BotResult<String> {
        let roles_text = input_value(&modal.data.components, ROLES_INPUT);
        let xp_text = input_value(&modal.data.components, XP_INPUT);
        let guild_roles: Vec<RoleId> = guild_id.roles(&ctx.http).await?.into_keys().collect();

        let ranks = parse_rank_input(&roles_text, &xp_text, &guild_roles)?;
        let count = ranks.len();
        let replaced = self.data.ranks.activate(guild_id, modal.user.id, ranks);

        info!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            ranks = count,
            replaced = replaced.is_some(),
            "Rank system activated"
        );
        Ok(format!("Rank system activated with {count} rank(s)"))
    }
}

#[async_trait]
impl EventHandler<Dispatched> for RankModalSubmit {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::ActivateRankSystemModal(modal) = payload.event else {
            return;
        };
        let Some(guild_id) = modal.guild_id else {
            return;
        };
        let ctx = payload.ctx;

        let content = match self.activate(&ctx, &modal, guild_id).await {
            Ok(content) => content,
            Err(BotError::BadRequest(message)) => message,
            Err(e) => {
                warn!(target: ERROR_TARGET, guild_id = %guild_id, error = %e, "Failed to activate rank system");
                e.user_message().to_string()
            }
        };
        if let Err(e) = modal.create_response(&ctx.http, ephemeral(content)).await {
            error!(target: ERROR_TARGET, error = %e, "Failed to respond to rank modal");
        }
    }
}

/// Identities picked in the delete select menu
#[must_use]
pub fn selected_identities(values: &[String]) -> Vec<EmojiIdentity> {
    values
        .iter()
        .filter_map(|value| EmojiIdentity::from_option_value(value))
        .collect()
}

/// Deletes the rules picked in the select menu
pub struct DeleteRulesSelect {
    data: Data,
}

impl DeleteRulesSelect {
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    async fn respond(&self, ctx: &Context, component: &ComponentInteraction, content: String) {
        let response = CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .content(content)
                .components(vec![]),
        );
        if let Err(e) = component.create_response(&ctx.http, response).await {
            error!(target: ERROR_TARGET, error = %e, "Failed to respond to delete select");
        }
    }
}

#[async_trait]
impl EventHandler<Dispatched> for DeleteRulesSelect {
    async fn handle(&self, payload: Dispatched) {
        let BotEvent::DeleteRulesSelect(component) = payload.event else {
            return;
        };
        let Some(guild_id) = component.guild_id else {
            return;
        };
        let ctx = payload.ctx;

        if self.data.prompts.take(component.user.id).is_none() {
            let content = "This selection has expired, please run the command again".to_string();
            self.respond(&ctx, &component, content).await;
            return;
        }

        let values = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => values.clone(),
            _ => Vec::new(),
        };
        let identities = selected_identities(&values);
        let count = identities.len();

        let content = match self.data.rules.delete_reaction_rules(guild_id, identities).await {
            Ok(()) => format!("Deleted {count} reaction rule(s)"),
            Err(e) => {
                warn!(target: ERROR_TARGET, guild_id = %guild_id, error = %e, "Failed to delete reaction rules");
                e.user_message().to_string()
            }
        };
        self.respond(&ctx, &component, content).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{ReactAction, ReactionRule};

    #[test]
    fn test_selected_identities() {
        let values = vec![
            "pepe:42".to_string(),
            "🔥:".to_string(),
            "garbage".to_string(),
        ];
        assert_eq!(
            selected_identities(&values),
            vec![
                EmojiIdentity::custom("pepe", "42"),
                EmojiIdentity::unicode("🔥"),
            ]
        );
    }

    #[test]
    fn test_created_message() {
        let parsed = ParsedInput {
            rules: vec![
                ReactionRule::new(
                    GuildId::new(1),
                    "2",
                    EmojiIdentity::unicode("💦"),
                    vec![ReactAction::Ban],
                ),
                ReactionRule::new(
                    GuildId::new(1),
                    "2",
                    EmojiIdentity::custom("pepe", "42"),
                    vec![ReactAction::Ban],
                ),
            ],
            unknown: vec!["hello".to_string()],
        };
        assert_eq!(
            created_message(&parsed),
            "Reaction rules created: 💦 <:pepe:42>\nIgnored: hello"
        );
    }

    #[test]
    fn test_modal_inputs_from_payload() {
        let rows: Vec<ActionRow> = serde_json::from_value(serde_json::json!([
            {
                "type": 1,
                "components": [{ "type": 4, "custom_id": "emojis", "value": "🔥 💦" }]
            },
            {
                "type": 1,
                "components": [{ "type": 4, "custom_id": "actions", "value": "ban" }]
            }
        ]))
        .unwrap();

        assert_eq!(
            modal_inputs(&rows),
            ("🔥 💦".to_string(), "ban".to_string())
        );
    }

    #[test]
    fn test_rank_modal_inputs() {
        let rows: Vec<ActionRow> = serde_json::from_value(serde_json::json!([
            {
                "type": 1,
                "components": [{ "type": 4, "custom_id": "role_system", "value": "11 22" }]
            },
            {
                "type": 1,
                "components": [{ "type": 4, "custom_id": "xp_system", "value": "100" }]
            }
        ]))
        .unwrap();

        assert_eq!(input_value(&rows, ROLES_INPUT), "11 22");
        assert_eq!(input_value(&rows, XP_INPUT), "100");
        assert_eq!(input_value(&rows, EMOJI_INPUT), "");

        let ranks = parse_rank_input(
            &input_value(&rows, ROLES_INPUT),
            &input_value(&rows, XP_INPUT),
            &[RoleId::new(11), RoleId::new(22)],
        )
        .unwrap();
        assert_eq!(ranks.iter().map(|r| r.xp).collect::<Vec<_>>(), vec![100, 200]);
    }
}
