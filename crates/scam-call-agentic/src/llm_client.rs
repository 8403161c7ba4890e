//! Text Generator Trait
//!
//! Unified interface for LLM providers (Anthropic, OpenAI, Gemini).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Buffer size for streamed text fragments
pub const STREAM_BUFFER_SIZE: usize = 64;

/// Incremental text fragments produced by [`TextGenerator::stream`].
///
/// The producer closes the channel when generation ends. An `Err` item
/// means the stream was interrupted and no further fragments follow.
pub type TextStream = mpsc::Receiver<Result<String>>;

/// Per-client sampling and transport settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    /// Upper-case label used when a conversation is flattened into one prompt
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::System => "SYSTEM",
            ChatRole::User => "USER",
            ChatRole::Assistant => "ASSISTANT",
            ChatRole::Tool => "TOOL",
        }
    }
}

/// One message of a conversation sent to a text generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Tool calls requested by the assistant (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant turn that carries the tool calls it requested
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Result of running a tool, answering `call_id`
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Tool/function definition offered to the model
///
/// - Anthropic: maps to `tools` array
/// - OpenAI: maps to `tools` array of type `function`
/// - Gemini: announced by name in the prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool/function name (e.g., "dog_bark")
    pub name: String,
    /// Description of what the tool does
    pub description: String,
    /// JSON Schema for the tool's parameters
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Complete (non-streamed) model output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Generation {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Unified text generation interface for every provider
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run the conversation and return the complete answer
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Generation>;

    /// Run the conversation and deliver the answer incrementally.
    ///
    /// Providers without native streaming deliver the whole answer as a
    /// single fragment.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let generation = self.invoke(messages).await?;
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and a fresh receiver: the send cannot fail.
        let _ = tx.send(Ok(generation.content)).await;
        Ok(rx)
    }

    /// Return a generator that offers `tools` to the model on every call
    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn TextGenerator>;

    /// Get the model name for logging
    fn model_name(&self) -> &str;

    /// Get the provider name for logging
    fn provider_name(&self) -> &str;
}
