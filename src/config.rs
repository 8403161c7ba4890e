//! Process settings
//!
//! Built once at startup from the environment (after loading `.env`) and
//! handed to every component that needs it. Nothing here reads the
//! environment after construction.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use crate::agentic::{LlmProvider, ProviderConfig};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_GOOGLE_MODEL: &str = "gemini-1.5-flash";

/// Immutable process configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Resolved provider; `Disabled` when no usable key was found
    pub llm: ProviderConfig,
    pub app_host: String,
    pub app_port: u16,
    /// History window handed to the agents on each turn
    pub max_history_messages: usize,
}

impl Settings {
    /// Load `.env` then read the process environment
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Offline settings: every agent runs on heuristics
    pub fn heuristic_only() -> Self {
        Self {
            llm: ProviderConfig::disabled(),
            app_host: "127.0.0.1".to_string(),
            app_port: 8000,
            max_history_messages: 40,
        }
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let preference = match var("LLM_PROVIDER").unwrap_or_default().parse::<LlmProvider>() {
            Ok(p) => p,
            Err(e) => {
                warn!("{}; using auto", e);
                LlmProvider::Auto
            }
        };

        let key_for = |provider: LlmProvider| -> Option<String> {
            let (env_name, file_env, fields): (&str, &str, &[&str]) = match provider {
                LlmProvider::OpenAi => (
                    "OPENAI_API_KEY",
                    "OPENAI_API_KEY_FILE",
                    &["openai_api_key", "OPENAI_API_KEY", "api_key"],
                ),
                LlmProvider::Anthropic => (
                    "ANTHROPIC_API_KEY",
                    "ANTHROPIC_API_KEY_FILE",
                    &["anthropic_api_key", "ANTHROPIC_API_KEY", "api_key"],
                ),
                LlmProvider::Gemini => (
                    "GOOGLE_API_KEY",
                    "GOOGLE_API_KEY_FILE",
                    &["google_api_key", "GOOGLE_API_KEY", "gemini_api_key", "api_key"],
                ),
                LlmProvider::Auto | LlmProvider::Disabled => return None,
            };
            var(env_name).or_else(|| {
                var(file_env).and_then(|path| load_api_key_from_file(Path::new(&path), fields))
            })
        };

        let model_for = |provider: LlmProvider| -> String {
            match provider {
                LlmProvider::OpenAi => var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
                LlmProvider::Anthropic => {
                    var("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.into())
                }
                LlmProvider::Gemini => var("GOOGLE_MODEL").unwrap_or_else(|| DEFAULT_GOOGLE_MODEL.into()),
                LlmProvider::Auto | LlmProvider::Disabled => "heuristic-only".into(),
            }
        };

        let timeout = Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", var("LLM_TIMEOUT_SECS"), 30u64));

        let resolved = preference
            .candidates()
            .iter()
            .find_map(|provider| key_for(*provider).map(|key| (*provider, key)));

        let llm = match resolved {
            Some((provider, key)) => ProviderConfig {
                provider,
                api_key: Some(key),
                model: model_for(provider),
                timeout,
            },
            None => ProviderConfig {
                timeout,
                ..ProviderConfig::disabled()
            },
        };

        Self {
            llm,
            app_host: var("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            app_port: parse_or("APP_PORT", var("APP_PORT"), 8000u16),
            max_history_messages: parse_or(
                "MAX_HISTORY_MESSAGES",
                var("MAX_HISTORY_MESSAGES"),
                40usize,
            ),
        }
    }

    pub fn llm_provider_name(&self) -> &'static str {
        match self.llm.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Auto | LlmProvider::Disabled => "none",
        }
    }

    pub fn llm_configured(&self) -> bool {
        self.llm.is_configured()
    }
}

fn parse_or<T: std::str::FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring malformed {}={:?}", name, raw);
            default
        }),
    }
}

/// First non-empty string among `fields` of a JSON object file.
///
/// Missing or unreadable files yield `None`; a bad key file never stops the
/// process from starting.
fn load_api_key_from_file(path: &Path, fields: &[&str]) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let data: serde_json::Value = serde_json::from_str(&content).ok()?;
    fields.iter().find_map(|field| {
        data.get(*field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}
