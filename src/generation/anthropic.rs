//! Anthropic Messages API backend.

use super::{GenerationRequest, Generator};
use crate::conversation::Role;
use crate::error::{Result, WiseoneError};
use crate::openai::build_http_client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

pub(super) const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Generator backed by the Anthropic Messages API.
pub struct AnthropicGenerator {
    http: reqwest::Client,
    api_key: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl AnthropicGenerator {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_http_client(timeout)?,
            api_key: api_key.to_string(),
        })
    }

    /// The Messages API takes system text separately, so system turns are
    /// folded into the instruction.
    fn build_body(request: &GenerationRequest) -> MessagesRequest<'_> {
        let mut system = request.system.clone();
        let mut messages = Vec::with_capacity(request.messages.len());

        for turn in &request.messages {
            match turn.role {
                Role::System => {
                    system.push_str("\n\n");
                    system.push_str(&turn.content);
                }
                Role::User => messages.push(ApiMessage {
                    role: "user",
                    content: &turn.content,
                }),
                Role::Assistant => messages.push(ApiMessage {
                    role: "assistant",
                    content: &turn.content,
                }),
            }
        }

        MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature.min(1.0),
            system,
            messages,
        }
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = Self::build_body(request);

        let response = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| WiseoneError::generation("messages", format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WiseoneError::generation(
                "messages",
                format!("Anthropic API returned {}: {}", status, detail),
            ));
        }

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            WiseoneError::generation("messages", format!("Malformed Anthropic response: {}", e))
        })?;

        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(WiseoneError::generation("messages", "Empty response from model"));
        }

        debug!("Generated {} characters", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ChatTurn;

    #[test]
    fn test_system_turns_fold_into_instruction() {
        let request = GenerationRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            system: "Persona.".to_string(),
            messages: vec![
                ChatTurn {
                    role: Role::System,
                    content: "Extra rule.".to_string(),
                },
                ChatTurn::user("Question?"),
            ],
            temperature: 1.4,
            max_tokens: 64,
        };

        let body = AnthropicGenerator::build_body(&request);
        assert_eq!(body.system, "Persona.\n\nExtra rule.");
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].role, "user");
        assert!((body.temperature - 1.0).abs() < f32::EPSILON);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"], "Question?");
    }
}
