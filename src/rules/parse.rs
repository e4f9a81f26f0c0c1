//! Parsing of the free text typed into the reaction rule modal

use super::rule::{EmojiIdentity, ReactAction, ReactionRule};
use crate::BotResult;
use serenity::all::GuildId;
use unicode_segmentation::UnicodeSegmentation;

/// Rules recognised in the modal input, plus the tokens that were not
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedInput {
    pub rules: Vec<ReactionRule>,
    pub unknown: Vec<String>,
}

/// Parse the actions field of the modal
///
/// Accepts names separated by commas or whitespace. An empty field means
/// `[Delete]`. Repeated names collapse into one action.
///
/// # Errors
///
/// Returns `BotError::BadRequest` for an unknown action name.
pub fn parse_actions(input: &str) -> BotResult<Vec<ReactAction>> {
    let mut actions = Vec::new();
    for token in input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        let action: ReactAction = token.parse()?;
        if !actions.contains(&action) {
            actions.push(action);
        }
    }
    if actions.is_empty() {
        actions.push(ReactAction::Delete);
    }
    Ok(actions)
}

/// Turn the emoji field of the modal into candidate rules
///
/// Tokens are separated by whitespace. Each token may be the id of a guild
/// emoji, `:name:` of a guild emoji, a mention like `<:name:id>`, or unicode
/// emoji. Every emoji grapheme in a token yields its own rule, so `🔥💦` gives
/// two rules; other text in the token is skipped.
///
/// # Errors
///
/// Returns `BotError::BadRequest` if the actions field is invalid.
pub fn parse_rule_input(
    emoji_text: &str,
    actions_text: &str,
    guild_id: GuildId,
    author: &str,
    guild_emojis: &[EmojiIdentity],
) -> BotResult<ParsedInput> {
    let actions = parse_actions(actions_text)?;
    let mut parsed = ParsedInput::default();
    let mut push = |emoji: EmojiIdentity| {
        parsed
            .rules
            .push(ReactionRule::new(guild_id, author, emoji, actions.clone()));
    };
    let mut unknown = Vec::new();

    for token in emoji_text.split_whitespace() {
        if let Some(mention) = parse_mention(token) {
            push(mention);
        } else if token.chars().all(|c| c.is_ascii_digit()) {
            match guild_emojis.iter().find(|e| e.emoji_id == token) {
                Some(emoji) => push(emoji.clone()),
                None => unknown.push(token.to_string()),
            }
        } else if let Some(name) = token
            .strip_prefix(':')
            .and_then(|rest| rest.strip_suffix(':'))
            .filter(|name| !name.is_empty())
        {
            match guild_emojis.iter().find(|e| e.emoji_name == name) {
                Some(emoji) => push(emoji.clone()),
                None => unknown.push(token.to_string()),
            }
        } else {
            let found = unicode_emoji(token);
            if found.is_empty() {
                unknown.push(token.to_string());
            }
            for emoji in found {
                push(EmojiIdentity::unicode(emoji));
            }
        }
    }

    parsed.unknown = unknown;
    Ok(parsed)
}

/// `<:name:id>` or `<a:name:id>`
fn parse_mention(token: &str) -> Option<EmojiIdentity> {
    let inner = token.strip_prefix('<')?.strip_suffix('>')?;
    let inner = inner.strip_prefix("a:").or_else(|| inner.strip_prefix(':'))?;
    let (name, id) = inner.split_once(':')?;
    if name.is_empty() || id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(EmojiIdentity::custom(name, id))
}

/// Graphemes of a token that are unicode emoji, in order
///
/// Keycaps, flags, skin tones and joined sequences are single graphemes and
/// stay whole.
fn unicode_emoji(token: &str) -> Vec<&str> {
    token
        .graphemes(true)
        .filter(|grapheme| emojis::get(grapheme).is_some())
        .collect()
}
