//! Persistence service client
//!
//! The service is the authoritative store for guilds and reaction rules. Every
//! failure coming back from it is mapped onto [`BotError`] by HTTP status.

use super::rule::{EmojiIdentity, ReactionRule};
use crate::{BotError, BotResult, ERROR_TARGET};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serenity::all::GuildId;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Guild record stored by the persistence service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildRecord {
    pub guild_id: String,
    pub owner_id: String,
}

/// Error envelope returned by the persistence service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub validation_errors: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

/// Remote operations on the rule store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RulesBackend: Send + Sync {
    /// All reaction rules of a guild
    async fn fetch_reaction_rules(&self, guild_id: GuildId) -> BotResult<Vec<ReactionRule>>;

    /// Persist a batch of rules, returning what the store created
    async fn create_reaction_rules(&self, rules: Vec<ReactionRule>) -> BotResult<Vec<ReactionRule>>;

    /// Delete the rules with the given identities, returning the service message
    async fn delete_reaction_rules(
        &self,
        guild_id: GuildId,
        identities: Vec<EmojiIdentity>,
    ) -> BotResult<String>;

    async fn create_guild(&self, guild: GuildRecord) -> BotResult<GuildRecord>;

    async fn get_guild(&self, guild_id: GuildId) -> BotResult<GuildRecord>;
}

/// [`RulesBackend`] speaking HTTP/JSON to the persistence service
#[derive(Debug, Clone)]
pub struct HttpRulesBackend {
    client: Client,
    base_url: String,
}

impl HttpRulesBackend {
    /// Create a backend for `base_url` with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `BotError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> BotResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Query string addressing rules in a delete request
///
/// Produces `rules[i][emojiId]` and `rules[i][emojiName]` pairs, skipping
/// empty fields.
#[must_use]
pub fn delete_query(identities: &[EmojiIdentity]) -> Vec<(String, String)> {
    let mut query = Vec::with_capacity(identities.len() * 2);
    for (i, identity) in identities.iter().enumerate() {
        if !identity.emoji_id.is_empty() {
            query.push((format!("rules[{i}][emojiId]"), identity.emoji_id.clone()));
        }
        if !identity.emoji_name.is_empty() {
            query.push((format!("rules[{i}][emojiName]"), identity.emoji_name.clone()));
        }
    }
    query
}

/// Map a failed response onto the error taxonomy
#[must_use]
pub fn error_from_status(status: StatusCode, envelope: &ErrorResponse) -> BotError {
    let detail = match (envelope.error.is_empty(), envelope.message.is_empty()) {
        (true, true) => status.to_string(),
        (false, true) => envelope.error.clone(),
        (true, false) => envelope.message.clone(),
        (false, false) => format!("{}: {}", envelope.error, envelope.message),
    };
    match status {
        StatusCode::BAD_REQUEST => BotError::BadRequest(detail),
        StatusCode::NOT_FOUND => BotError::NotFound(detail),
        StatusCode::CONFLICT => BotError::Conflict(detail),
        _ => BotError::Internal(detail),
    }
}

/// Decode a response, expecting `expected` as the success status
async fn decode<T: DeserializeOwned>(response: Response, expected: StatusCode) -> BotResult<T> {
    let status = response.status();
    let body = response.bytes().await?;

    if status != expected {
        let envelope: ErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
        debug!(
            target: ERROR_TARGET,
            status = status.as_u16(),
            error = %envelope.error,
            message = %envelope.message,
            validation_errors = ?envelope.validation_errors,
            "Persistence service returned an error"
        );
        return Err(error_from_status(status, &envelope));
    }

    serde_json::from_slice(&body)
        .map_err(|e| BotError::Internal(format!("undecodable response body: {e}")))
}

#[async_trait]
impl RulesBackend for HttpRulesBackend {
    async fn fetch_reaction_rules(&self, guild_id: GuildId) -> BotResult<Vec<ReactionRule>> {
        let response = self
            .client
            .get(self.url(&format!("/rules/reaction/{guild_id}")))
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }

    async fn create_reaction_rules(&self, rules: Vec<ReactionRule>) -> BotResult<Vec<ReactionRule>> {
        let response = self
            .client
            .post(self.url("/rules/reaction"))
            .json(&rules)
            .send()
            .await?;
        decode(response, StatusCode::CREATED).await
    }

    async fn delete_reaction_rules(
        &self,
        guild_id: GuildId,
        identities: Vec<EmojiIdentity>,
    ) -> BotResult<String> {
        let response = self
            .client
            .delete(self.url(&format!("/rules/reaction/{guild_id}")))
            .query(&delete_query(&identities))
            .send()
            .await?;
        let body: MessageResponse = decode(response, StatusCode::OK).await?;
        Ok(body.message)
    }

    async fn create_guild(&self, guild: GuildRecord) -> BotResult<GuildRecord> {
        let response = self
            .client
            .post(self.url("/guild"))
            .json(&guild)
            .send()
            .await?;
        decode(response, StatusCode::CREATED).await
    }

    async fn get_guild(&self, guild_id: GuildId) -> BotResult<GuildRecord> {
        let response = self
            .client
            .get(self.url(&format!("/guild/{guild_id}")))
            .send()
            .await?;
        decode(response, StatusCode::OK).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_delete_query() {
        let query = delete_query(&[
            EmojiIdentity::unicode("🔥"),
            EmojiIdentity::custom("pepe", "42"),
        ]);
        assert_eq!(
            query,
            vec![
                ("rules[0][emojiName]".to_string(), "🔥".to_string()),
                ("rules[1][emojiId]".to_string(), "42".to_string()),
                ("rules[1][emojiName]".to_string(), "pepe".to_string()),
            ]
        );
    }

    #[test]
    fn test_status_mapping() {
        let envelope = ErrorResponse {
            error: "guild already exists".to_string(),
            ..ErrorResponse::default()
        };
        let cases = [
            (StatusCode::BAD_REQUEST, ErrorKind::BadRequest),
            (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            (StatusCode::CONFLICT, ErrorKind::Conflict),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal),
            (StatusCode::BAD_GATEWAY, ErrorKind::Internal),
        ];
        for (status, kind) in cases {
            assert_eq!(error_from_status(status, &envelope).kind(), kind);
        }
    }

    #[test]
    fn test_error_detail() {
        let envelope = ErrorResponse {
            error: "bad request".to_string(),
            message: "guildId must be 19 characters".to_string(),
            ..ErrorResponse::default()
        };
        let error = error_from_status(StatusCode::BAD_REQUEST, &envelope);
        assert_eq!(
            error.to_string(),
            "Bad request: bad request: guildId must be 19 characters"
        );

        let error = error_from_status(StatusCode::NOT_FOUND, &ErrorResponse::default());
        assert!(error.to_string().contains("404"));
    }

    #[test]
    fn test_error_envelope_decodes() {
        let body = r#"{"error":"validation","status":400,"validation_errors":{"guildId":"required"}}"#;
        let envelope: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.status, 400);
        assert_eq!(envelope.validation_errors["guildId"], "required");
    }

    #[test]
    fn test_guild_record_shape() {
        let record = GuildRecord {
            guild_id: "1".to_string(),
            owner_id: "2".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"guildId": "1", "ownerId": "2"}));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let backend = HttpRulesBackend::new("http://localhost:8080/", Duration::from_secs(10)).unwrap();
        assert_eq!(backend.url("/guild"), "http://localhost:8080/guild");
    }
}
