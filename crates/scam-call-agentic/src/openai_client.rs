//! OpenAI Client
//!
//! Text generator implementation for the OpenAI chat completions API.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm_client::{
    ChatMessage, ChatRole, Generation, GenerationOptions, TextGenerator, TextStream, ToolCall,
    ToolDefinition,
};
use crate::streaming::spawn_sse_reader;

/// Default OpenAI model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
    tools: Vec<ToolDefinition>,
}

impl OpenAiClient {
    /// Create a new OpenAI client for `model`
    pub fn new(api_key: String, model: &str, options: GenerationOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build OpenAI HTTP client: {}", e))?;
        Ok(Self {
            api_key,
            client,
            model: model.to_string(),
            temperature: options.temperature,
            tools: Vec::new(),
        })
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        let mut body = json!({
            "model": &self.model,
            "messages": messages.iter().map(Self::wire_message).collect::<Vec<_>>(),
            "temperature": self.temperature,
        });

        // Tool calls are not reassembled from stream deltas; streamed
        // requests therefore never offer tools.
        if !self.tools.is_empty() && !stream {
            body["tools"] = Value::Array(
                self.tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": &tool.name,
                                "description": &tool.description,
                                "parameters": &tool.parameters
                            }
                        })
                    })
                    .collect(),
            );
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn wire_message(message: &ChatMessage) -> Value {
        match message.role {
            ChatRole::System => json!({"role": "system", "content": &message.content}),
            ChatRole::User => json!({"role": "user", "content": &message.content}),
            ChatRole::Assistant if !message.tool_calls.is_empty() => {
                let content = if message.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(message.content.clone())
                };
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": &call.id,
                            "type": "function",
                            "function": {
                                "name": &call.name,
                                "arguments": call.arguments.to_string()
                            }
                        })
                    })
                    .collect();
                json!({"role": "assistant", "content": content, "tool_calls": tool_calls})
            }
            ChatRole::Assistant => json!({"role": "assistant", "content": &message.content}),
            ChatRole::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": &message.content
            }),
        }
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, body));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String, // OpenAI returns arguments as a JSON string
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

fn parse_generation(response_text: &str) -> Result<Generation> {
    let api_response: ApiResponse = serde_json::from_str(response_text)
        .map_err(|e| anyhow!("Failed to parse OpenAI response: {}", e))?;
    let message = api_response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| anyhow!("OpenAI returned no choices"))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null),
        })
        .collect();

    Ok(Generation {
        content: message.content.unwrap_or_default(),
        tool_calls,
    })
}

fn stream_delta(value: &Value) -> Result<Option<String>> {
    if let Some(error) = value.get("error") {
        return Err(anyhow!("OpenAI stream error: {}", error));
    }
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let response = self.send(&self.request_body(messages, false)).await?;
        let response_text = response.text().await?;
        tracing::debug!(
            "OpenAI raw response: {}",
            response_text.chars().take(1000).collect::<String>()
        );
        parse_generation(&response_text)
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = self.send(&self.request_body(messages, true)).await?;
        Ok(spawn_sse_reader(response, stream_delta))
    }

    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn TextGenerator> {
        let mut bound = self.clone();
        bound.tools = tools;
        Arc::new(bound)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }
}
