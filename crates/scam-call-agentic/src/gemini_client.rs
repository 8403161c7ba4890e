//! Google Gemini API Client Implementation
//!
//! Gemini receives the whole conversation flattened into a single prompt.
//! Bound tools are announced by name and the model is asked to write the
//! matching inline effect tags itself, so `invoke` never returns tool calls.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use crate::llm_client::{
    ChatMessage, Generation, GenerationOptions, TextGenerator, TextStream, ToolDefinition,
};
use crate::streaming::spawn_sse_reader;

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: Client,
    model: String,
    temperature: f32,
    bound_tool_names: Vec<String>,
}

/// Gemini API request format
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

/// Gemini content structure
#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

/// Gemini content part
#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

/// Gemini generation configuration
#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

/// Gemini API response format
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

/// Gemini candidate response
#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
}

/// Gemini response content
#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

/// Gemini response part
#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(api_key: String, model: &str, options: GenerationOptions) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("Gemini API key is empty"));
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build Gemini HTTP client: {}", e))?;

        Ok(Self {
            api_key,
            client,
            model: model.to_string(),
            temperature: options.temperature,
            bound_tool_names: Vec::new(),
        })
    }

    /// Flatten the conversation into `ROLE: content` paragraphs
    fn build_prompt(&self, messages: &[ChatMessage]) -> String {
        let mut prompt = messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", m.role.label(), m.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n");

        if !self.bound_tool_names.is_empty() {
            prompt.push_str(&format!(
                "\n\nOutils audio disponibles: {}.\n\
                 Si necessaire, ajoute simplement les tags [SOUND_EFFECT: ...] dans le texte.",
                self.bound_tool_names.join(", ")
            ));
        }
        prompt
    }

    fn request(&self, messages: &[ChatMessage]) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: self.build_prompt(messages),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.temperature,
            },
        }
    }

    /// Send request to Gemini API
    async fn send(&self, method: &str, query: &str, body: &GeminiRequest) -> Result<reqwest::Response> {
        let url = format!(
            "{}/{}:{}?{}key={}",
            BASE_URL, self.model, method, query, self.api_key
        );
        debug!(
            "Sending request to Gemini API: {}",
            url.replace(&self.api_key, "***")
        );

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let response_text = response.text().await.unwrap_or_default();
            error!("Gemini API error: {} - {}", status, response_text);
            return Err(anyhow!("Gemini API error {}: {}", status, response_text));
        }
        Ok(response)
    }
}

fn stream_delta(value: &Value) -> Result<Option<String>> {
    if let Some(error) = value.get("error") {
        return Err(anyhow!("Gemini stream error: {}", error));
    }
    let response: GeminiResponse = serde_json::from_value(value.clone())
        .map_err(|e| anyhow!("Failed to parse Gemini stream chunk: {}", e))?;
    Ok(Some(response.text()))
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Generation> {
        let response = self
            .send("generateContent", "", &self.request(messages))
            .await?;
        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Gemini response: {}", e))?;

        let text = gemini_response.text();
        if text.trim().is_empty() {
            return Err(anyhow!("No text in Gemini response"));
        }
        Ok(Generation::text(text.trim()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = self
            .send("streamGenerateContent", "alt=sse&", &self.request(messages))
            .await?;
        Ok(spawn_sse_reader(response, stream_delta))
    }

    fn bind_tools(&self, tools: Vec<ToolDefinition>) -> Arc<dyn TextGenerator> {
        let mut bound = self.clone();
        bound.bound_tool_names = tools
            .into_iter()
            .map(|t| t.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Arc::new(bound)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "Gemini"
    }
}
