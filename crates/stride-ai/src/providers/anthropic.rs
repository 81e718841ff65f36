//! Anthropic Messages API model

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::{ChatModel, RetryConfig},
    types::{
        AssistantMetadata, Content, Message, ModelRequest, ModelResponse, ModelSpec, StopReason,
        ToolDefinition, Usage,
    },
};

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client bound to one model
pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: String,
    spec: ModelSpec,
    retry: RetryConfig,
}

impl AnthropicModel {
    /// Create a new model client with an API key
    pub fn new(api_key: impl Into<String>, spec: ModelSpec) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            spec,
            retry: RetryConfig::default(),
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env(spec: ModelSpec) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key, spec))
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let key = reqwest::header::HeaderValue::from_str(&self.api_key)
            .map_err(|_| Error::InvalidApiKey)?;
        headers.insert("x-api-key", key);
        headers.insert(
            "anthropic-version",
            reqwest::header::HeaderValue::from_static(API_VERSION),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        Ok(headers)
    }

    async fn send_once(&self, body: &AnthropicRequest) -> Result<AnthropicResponse> {
        let url = format!("{}/v1/messages", self.spec.base_url.trim_end_matches('/'));
        tracing::debug!("Anthropic API URL: {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Error::RateLimited { retry_after });
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => Error::api(envelope.error.error_type, envelope.error.message),
                Err(_) => Error::api(status.as_str(), text),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse> {
        let body = build_request(&self.spec, request);

        let mut attempt = 0u32;
        let response = loop {
            match self.send_once(&body).await {
                Ok(r) => break r,
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        Ok(convert_response(&self.spec, response))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    input_tokens: u32,
    output_tokens: u32,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn build_request(spec: &ModelSpec, request: &ModelRequest) -> AnthropicRequest {
    AnthropicRequest {
        model: spec.id.clone(),
        messages: convert_messages(&request.messages),
        max_tokens: request.max_tokens.unwrap_or(spec.max_tokens),
        system: request.system_prompt.clone(),
        temperature: request.temperature,
        tools: convert_tools(&request.tools),
    }
}

/// Tool results are user-role blocks; consecutive results share one message.
fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut result: Vec<AnthropicMessage> = vec![];

    for message in messages {
        match message {
            Message::User { content, .. } => {
                let blocks = content
                    .iter()
                    .filter_map(|c| c.as_text())
                    .map(|text| serde_json::json!({ "type": "text", "text": text }))
                    .collect();
                result.push(AnthropicMessage {
                    role: "user",
                    content: blocks,
                });
            }
            Message::Assistant { content, .. } => {
                let blocks: Vec<serde_json::Value> = content
                    .iter()
                    .filter_map(|c| match c {
                        Content::Text { text } if text.is_empty() => None,
                        Content::Text { text } => {
                            Some(serde_json::json!({ "type": "text", "text": text }))
                        }
                        Content::ToolCall {
                            id,
                            name,
                            arguments,
                        } => Some(serde_json::json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": arguments
                        })),
                    })
                    .collect();

                if !blocks.is_empty() {
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
            }
            Message::ToolResult {
                tool_call_id,
                is_error,
                ..
            } => {
                let block = serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": message.text(),
                    "is_error": is_error
                });

                match result.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last.content.iter().all(|b| b["type"] == "tool_result") =>
                    {
                        last.content.push(block);
                    }
                    _ => result.push(AnthropicMessage {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }

    result
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| {
            let input_schema = if tool.parameters.is_object() {
                let mut schema = tool.parameters.clone();
                if let Some(obj) = schema.as_object_mut() {
                    obj.entry("type").or_insert(serde_json::json!("object"));
                }
                schema
            } else {
                serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                })
            };

            AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema,
            }
        })
        .collect()
}

fn convert_response(spec: &ModelSpec, response: AnthropicResponse) -> ModelResponse {
    let usage = Usage {
        input: response.usage.input_tokens,
        output: response.usage.output_tokens,
        cache_read: response.usage.cache_read_input_tokens.unwrap_or(0),
        cache_write: response.usage.cache_creation_input_tokens.unwrap_or(0),
    };

    let content = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ResponseBlock::Text { text } => Some(Content::Text { text }),
            ResponseBlock::ToolUse { id, name, input } => Some(Content::ToolCall {
                id,
                name,
                arguments: input,
            }),
            ResponseBlock::Other => None,
        })
        .collect();

    let message = Message::Assistant {
        content,
        metadata: AssistantMetadata {
            model: Some(spec.id.clone()),
            usage: usage.clone(),
            stop_reason: response.stop_reason.as_deref().map(map_stop_reason),
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    };

    ModelResponse { message, usage }
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "max_tokens" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Stop,
    }
}
