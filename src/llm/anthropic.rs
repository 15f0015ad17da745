//! Anthropic Messages API client.

use super::{LlmClient, LlmRequest, LlmResponse, Message, ToolChoice};
use crate::config::LlmSettings;
use crate::error::{LektorError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

const API_VERSION: &str = "2023-06-01";

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

impl AnthropicClient {
    /// Create a client from settings, reading the API key from the configured variable.
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            LektorError::Config(format!("{} not set", settings.api_key_env))
        })?;

        Self::with_config(
            &settings.base_url,
            &api_key,
            &settings.model,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Create a client with explicit connection parameters.
    pub fn with_config(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn build_payload<'a>(&'a self, request: &'a LlmRequest) -> ApiRequest<'a> {
        let tools = request.tools.as_ref().map(|defs| {
            defs.iter()
                .map(|def| ApiTool {
                    name: &def.name,
                    description: &def.description,
                    input_schema: def.input_schema(),
                })
                .collect()
        });

        ApiRequest {
            model: &self.model,
            system: &request.system,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            tool_choice: request.tool_choice,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    #[instrument(skip_all, fields(messages = request.messages.len(), tools = request.has_tools()))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let payload = self.build_payload(request);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LektorError::Llm(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let parsed: LlmResponse = response
                    .json()
                    .await
                    .map_err(|e| LektorError::Llm(format!("Invalid response body: {}", e)))?;
                debug!(
                    "Model stopped with {:?} ({} blocks)",
                    parsed.stop_reason,
                    parsed.content.len()
                );
                Ok(parsed)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(LektorError::Llm(format!("{} - {}", status, body)))
            }
        }
    }
}
