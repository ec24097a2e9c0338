//! Commentary generation through the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use zinger_sdk::objects::MatchEvent;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const MAX_TOKENS: u32 = 1000;

const SYSTEM_PROMPT: &str = "You are a trash-talk generator. You only respond with your zinger, \
a snarky line tailored to the target player and the provided match details. The zinger must \
include the target player's name and their placement in the match. Make it creative and funny. \
Never include explanations, quotes, or special characters.";

/// Errors returned by a [`CommentaryModel`].
#[derive(Debug, Error)]
pub enum CommentaryError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with an unexpected status
    #[error("generation service returned status {status}: {body}")]
    Api { status: u16, body: String },

    /// The service is rate limiting us
    #[error("generation service rate limited the request")]
    RateLimited,

    /// The request exceeded its deadline
    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),
}

/// Generates a short commentary line for a match.
#[async_trait]
pub trait CommentaryModel: Send + Sync {
    /// Generate commentary for `event`. The text may be blank; callers
    /// decide what a blank generation means.
    async fn generate(&self, event: &MatchEvent) -> Result<String, CommentaryError>;
}

/// Render the match facts of `event` as the user prompt.
pub fn build_prompt(event: &MatchEvent) -> String {
    let outcome = &event.outcome;
    let mut prompt = format!(
        "target player: {}#{}\n",
        event.summoner_name, event.summoner_tagline
    );
    let _ = writeln!(prompt, "match id: {}", event.match_id);
    if let Some(placement) = outcome.placement {
        let _ = writeln!(prompt, "placement: {placement} of 8");
    }
    if let Some(level) = outcome.level {
        let _ = writeln!(prompt, "level: {level}");
    }
    if let Some(round) = outcome.last_round {
        let _ = writeln!(prompt, "last round: {round}");
    }
    if let Some(secs) = outcome.game_length_secs {
        let _ = writeln!(prompt, "game length: {}m{:02}s", secs / 60, secs % 60);
    }
    if !outcome.traits.is_empty() {
        let _ = writeln!(prompt, "active traits: {}", outcome.traits.join(", "));
    }
    if !outcome.units.is_empty() {
        let _ = writeln!(prompt, "final board: {}", outcome.units.join(", "));
    }
    prompt
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl MessagesResponse {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("")
            .trim()
            .to_string()
    }
}

/// [`CommentaryModel`] backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicCommentary {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl AnthropicCommentary {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the default `reqwest::Client`.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    async fn send(&self, event: &MatchEvent) -> Result<String, CommentaryError> {
        let body = MessagesRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            max_tokens: MAX_TOKENS,
            temperature: 1.0,
            messages: vec![Message {
                role: "user",
                content: build_prompt(event),
            }],
        };

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(CommentaryError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CommentaryError::Api {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed.text())
    }
}

#[async_trait]
impl CommentaryModel for AnthropicCommentary {
    async fn generate(&self, event: &MatchEvent) -> Result<String, CommentaryError> {
        let text = tokio::time::timeout(self.timeout, self.send(event))
            .await
            .map_err(|_| CommentaryError::TimedOut(self.timeout))??;
        debug!(match_id = %event.match_id, chars = text.len(), "Generated commentary");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zinger_sdk::objects::MatchOutcome;

    fn event() -> MatchEvent {
        MatchEvent {
            match_id: "NA1_42".into(),
            guild_id: "123".into(),
            summoner_name: "Foo".into(),
            summoner_tagline: "NA1".into(),
            outcome: MatchOutcome {
                placement: Some(8),
                level: Some(6),
                last_round: None,
                traits: vec!["Void".into()],
                units: vec![],
                game_length_secs: Some(1834),
            },
        }
    }

    #[test]
    fn prompt_lists_known_facts_only() {
        let prompt = build_prompt(&event());
        assert!(prompt.contains("target player: Foo#NA1"));
        assert!(prompt.contains("placement: 8 of 8"));
        assert!(prompt.contains("game length: 30m34s"));
        assert!(prompt.contains("active traits: Void"));
        assert!(!prompt.contains("last round"));
        assert!(!prompt.contains("final board"));
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [
                {"type": "text", "text": " Eighth place, Foo? "},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": "Bold."}
            ]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), "Eighth place, Foo? Bold.");
    }

    #[tokio::test]
    async fn posts_messages_request() {
        use axum::Json;
        use axum::http::HeaderMap;
        use axum::routing::post;

        let router = axum::Router::new().route(
            "/messages",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(headers["x-api-key"], "secret");
                assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["max_tokens"], MAX_TOKENS);
                assert!(body["messages"][0]["content"]
                    .as_str()
                    .unwrap()
                    .contains("Foo#NA1"));
                Json(serde_json::json!({
                    "content": [{"type": "text", "text": "gg ez"}]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let model = AnthropicCommentary::new("secret", "test-model", Duration::from_secs(5))
            .with_base_url(format!("http://{addr}"))
            .with_http_client(Client::builder().no_proxy().build().unwrap());
        assert_eq!(model.generate(&event()).await.unwrap(), "gg ez");
    }
}
