//! Anthropic Client
//!
//! Text generator implementation for the Anthropic Claude messages API.

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

/// Default Anthropic model
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_TOKENS: u32 = 1024;

/// Anthropic Claude API client
#[derive(Clone)]
pub struct AnthropicClient {
    api_key: String,
    client: reqwest::Client,
    model: String,
    temperature: f32,
    tools: Vec<ToolDefinition>,
}

impl AnthropicClient {
    /// Create a new Anthropic client for `model`
    pub fn new(api_key: String, model: &str, options: GenerationOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build Anthropic HTTP client: {}", e))?;
        Ok(Self {
            api_key,
            client,
            model: model.to_string(),
            temperature: options.temperature,
            tools: Vec::new(),
        })
    }

    fn request_body(&self, messages: &[ChatMessage], stream: bool) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut body = json!({
            "model": &self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": self.temperature,
            "messages": Self::wire_messages(messages),
        });
        if !system.is_empty() {
            body["system"] = Value::String(system.join("\n\n"));
        }
        if !self.tools.is_empty() && !stream {
            body["tools"] = Value::Array(
                self.tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "name": &tool.name,
                            "description": &tool.description,
                            "input_schema": &tool.parameters
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

    /// Map the conversation onto user/assistant turns.
    ///
    /// Consecutive tool results are merged into one user turn, as the API
    /// expects every `tool_result` answering one assistant turn together.
    fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
        let mut out: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        for message in messages {
            if message.role == ChatRole::Tool {
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": &message.content
                }));
                continue;
            }
            if !pending_results.is_empty() {
                out.push(json!({"role": "user", "content": std::mem::take(&mut pending_results)}));
            }

            match message.role {
                ChatRole::System | ChatRole::Tool => {}
                ChatRole::User => out.push(json!({"role": "user", "content": &message.content})),
                ChatRole::Assistant if message.tool_calls.is_empty() => {
                    out.push(json!({"role": "assistant", "content": &message.content}))
                }
                ChatRole::Assistant => {
                    let mut blocks = Vec::new();
                    if !message.content.is_empty() {
                        blocks.push(json!({"type": "text", "text": &message.content}));
                    }
                    for call in &message.tool_calls {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": &call.id,
                            "name": &call.name,
                            "input": &call.arguments
                        }));
                    }
                    out.push(json!({"role": "assistant", "content": blocks}));
                }
            }
        }
        if !pending_results.is_empty() {
            out.push(json!({"role": "user", "content": pending_results}));
        }
        out
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Anthropic API error {}: {}", status, body));
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

fn parse_generation(response_text: &str) -> Result<Generation> {
    let api_response: ApiResponse = serde_json::from_str(response_text)
        .map_err(|e| anyhow!("Failed to parse Anthropic response: {}", e))?;

    let mut generation = Generation::default();
    for block in api_response.content {
        match block {
            ContentBlock::Text { text } => generation.content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => generation.tool_calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            ContentBlock::Other => {}
        }
    }
    if generation.content.is_empty() && generation.tool_calls.is_empty() {
        return Err(anyhow!("Empty response from Anthropic"));
    }
    Ok(generation)
}

fn stream_delta(value: &Value) -> Result<Option<String>> {
    match value.get("type").and_then(Value::as_str) {
        Some("error") => Err(anyhow!(
            "Anthropic stream error: {}",
            value.get("error").cloned().unwrap_or(Value::Null)
        )),
        Some("content_block_delta") => Ok(value
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .map(str::to_string)),
        _ => Ok(None),
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let response = self.send(&self.request_body(messages, false)).await?;
        let response_text = response.text().await?;
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
        "Anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> AnthropicClient {
        AnthropicClient::new("test-key".to_string(), DEFAULT_MODEL, GenerationOptions::default())
            .unwrap()
    }

    #[test]
    fn test_new_client() {
        let client = client();
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.provider_name(), "Anthropic");
    }

    #[test]
    fn test_system_prompt_is_hoisted() {
        let body = client().request_body(
            &[ChatMessage::system("persona"), ChatMessage::user("bonjour")],
            false,
        );
        assert_eq!(body["system"], json!("persona"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_tool_results_grouped_into_one_user_turn() {
        let call = |id: &str| ToolCall {
            id: id.to_string(),
            name: "doorbell".to_string(),
            arguments: json!({}),
        };
        let wire = AnthropicClient::wire_messages(&[
            ChatMessage::user("bonjour"),
            ChatMessage::assistant_with_tools("", vec![call("a"), call("b")]),
            ChatMessage::tool("a", "[SOUND_EFFECT: DOORBELL]"),
            ChatMessage::tool("b", "[SOUND_EFFECT: DOORBELL]"),
        ]);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[2]["role"], json!("user"));
        assert_eq!(wire[2]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_tool_follow_up_declares_tools() {
        let mut bound_client = client();
        bound_client.tools = vec![ToolDefinition {
            name: "doorbell".to_string(),
            description: "Sonnette".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let call = ToolCall {
            id: "tu_1".to_string(),
            name: "doorbell".to_string(),
            arguments: json!({}),
        };
        let body = bound_client.request_body(
            &[
                ChatMessage::system("persona"),
                ChatMessage::user("bonjour"),
                ChatMessage::assistant_with_tools("", vec![call]),
                ChatMessage::tool("tu_1", "[SOUND_EFFECT: DOORBELL]"),
            ],
            false,
        );
        assert_eq!(body["tools"][0]["name"], json!("doorbell"));
        assert_eq!(body["messages"][2]["content"][0]["type"], json!("tool_result"));
    }

    #[test]
    fn test_parse_text_and_tool_use() {
        let raw = r#"{"content":[
            {"type":"text","text":"Attendez..."},
            {"type":"tool_use","id":"tu_1","name":"coughing_fit","input":{}}
        ]}"#;
        let generation = parse_generation(raw).unwrap();
        assert_eq!(generation.content, "Attendez...");
        assert_eq!(generation.tool_calls[0].name, "coughing_fit");
    }

    #[test]
    fn test_stream_delta_events() {
        let delta = json!({"type": "content_block_delta", "delta": {"type": "text_delta", "text": "Oui"}});
        assert_eq!(stream_delta(&delta).unwrap().as_deref(), Some("Oui"));
        assert_eq!(stream_delta(&json!({"type": "ping"})).unwrap(), None);
        assert!(stream_delta(&json!({"type": "error", "error": {}})).is_err());
    }
}
