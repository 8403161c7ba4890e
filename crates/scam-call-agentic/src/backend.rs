//! Provider Selection
//!
//! Enum for selecting between LLM providers (Gemini, Anthropic, OpenAI).

use std::str::FromStr;

/// LLM provider selection, read from `LLM_PROVIDER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Pick the first provider with a usable key: Gemini, Anthropic, OpenAI
    #[default]
    Auto,
    /// OpenAI GPT
    OpenAi,
    /// Anthropic Claude
    Anthropic,
    /// Google Gemini
    Gemini,
    /// Never call a model; every agent runs on heuristics
    Disabled,
}

impl LlmProvider {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Auto => "auto",
            LlmProvider::OpenAi => "OpenAI",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Gemini => "Gemini",
            LlmProvider::Disabled => "none",
        }
    }

    /// Concrete providers tried, in order, when resolving this selection
    pub fn candidates(&self) -> &'static [LlmProvider] {
        match self {
            LlmProvider::Auto => &[
                LlmProvider::Gemini,
                LlmProvider::Anthropic,
                LlmProvider::OpenAi,
            ],
            LlmProvider::OpenAi => &[LlmProvider::OpenAi],
            LlmProvider::Anthropic => &[LlmProvider::Anthropic],
            LlmProvider::Gemini => &[LlmProvider::Gemini],
            LlmProvider::Disabled => &[],
        }
    }
}

/// Error type for parsing LlmProvider
#[derive(Debug, thiserror::Error)]
#[error("Unknown LLM_PROVIDER '{0}'. Valid values: auto, openai, anthropic, gemini, none")]
pub struct ParseProviderError(String);

impl FromStr for LlmProvider {
    type Err = ParseProviderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" => Ok(LlmProvider::Auto),
            "openai" | "gpt" => Ok(LlmProvider::OpenAi),
            "anthropic" | "claude" => Ok(LlmProvider::Anthropic),
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "none" | "off" | "heuristic" => Ok(LlmProvider::Disabled),
            other => Err(ParseProviderError(other.to_string())),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
