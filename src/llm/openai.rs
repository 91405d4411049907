//! OpenAI Responses API provider.
//!
//! Sends `instructions` + `input` messages and, when the request carries a
//! [`ResponseFormat`], asks for `json_schema` structured output. Failures are
//! mapped onto [`LlmError`] and returned as-is; there is no retry here.
//!
//! This talks to the Responses API directly rather than through rig-core's
//! OpenAI adapter: the next-turn schema carries a free-form `profile_patch`
//! object, so it must go out as a `json_schema` text format with
//! `strict: false`, and the adapter does not expose that setting.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::LlmConfig;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

const PROVIDER_NAME: &str = "openai";

/// OpenAI Responses API provider.
pub struct OpenAiResponsesProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiResponsesProvider {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("Failed to build reqwest client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    /// `{base_url}/v1/responses`, tolerating a base URL that already ends in `/v1`.
    fn api_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/v1/responses", base)
    }

    async fn send_request(&self, body: &ResponsesRequest<'_>) -> Result<ResponsesResponse, LlmError> {
        let url = self.api_url();
        tracing::debug!(%url, model = %body.model, "Sending Responses API request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER_NAME.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let response_text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("Failed to read response body: {}", e),
        })?;

        tracing::debug!(%status, "Responses API replied");

        if !status.is_success() {
            return Err(match status.as_u16() {
                401 => LlmError::AuthFailed {
                    provider: PROVIDER_NAME.to_string(),
                },
                429 => LlmError::RateLimited {
                    provider: PROVIDER_NAME.to_string(),
                    retry_after,
                },
                _ => LlmError::RequestFailed {
                    provider: PROVIDER_NAME.to_string(),
                    reason: format!("HTTP {}: {}", status, truncate(&response_text, 200)),
                },
            });
        }

        serde_json::from_str(&response_text).map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER_NAME.to_string(),
            reason: format!(
                "JSON parse error: {}. Raw: {}",
                e,
                truncate(&response_text, 200)
            ),
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiResponsesProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = ResponsesRequest::build(&self.config.model, &request);
        let response = self.send_request(&body).await?;

        let content = response.output_text().ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER_NAME.to_string(),
            reason: match response.refusal() {
                Some(refusal) => format!("Model refused: {}", refusal),
                None => "No output_text in response".to_string(),
            },
        })?;

        let finish_reason = response.finish_reason();
        if finish_reason == FinishReason::Length {
            tracing::warn!("Response hit max_output_tokens; structured output may be truncated");
        }

        let usage = response.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            finish_reason,
            response_id: response.id,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// Responses API wire types

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: Vec<InputMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    store: bool,
}

impl<'a> ResponsesRequest<'a> {
    /// System messages become `instructions`; everything else is `input`.
    fn build(model: &'a str, request: &'a CompletionRequest) -> Self {
        let input = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| InputMessage {
                role: match m.role {
                    Role::Developer => "developer",
                    Role::User | Role::System => "user",
                },
                content: &m.content,
            })
            .collect();

        let text = request.response_format.as_ref().map(|f| TextConfig {
            format: FormatConfig {
                format_type: "json_schema",
                name: &f.name,
                strict: f.strict,
                schema: &f.schema,
            },
        });

        Self {
            model,
            instructions: request.instructions(),
            input,
            text,
            max_output_tokens: request.max_tokens,
            store: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct InputMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct TextConfig<'a> {
    format: FormatConfig<'a>,
}

#[derive(Debug, Serialize)]
struct FormatConfig<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl ResponsesResponse {
    /// Text of the first non-blank `output_text` chunk of the first message item.
    ///
    /// Concatenating every chunk can glue two JSON documents together, so only
    /// the first one is taken.
    fn output_text(&self) -> Option<String> {
        self.output
            .iter()
            .filter(|item| item.item_type == "message")
            .flat_map(|item| item.content.iter())
            .filter(|c| c.content_type == "output_text" || c.content_type == "text")
            .filter_map(|c| c.text.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty())
            .map(String::from)
    }

    fn refusal(&self) -> Option<&str> {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| c.content_type == "refusal")
            .find_map(|c| c.refusal.as_deref())
    }

    fn finish_reason(&self) -> FinishReason {
        match self.status.as_deref() {
            Some("completed") => FinishReason::Stop,
            Some("incomplete") => match self
                .incomplete_details
                .as_ref()
                .and_then(|d| d.reason.as_deref())
            {
                Some("max_output_tokens") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Unknown,
            },
            _ => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
