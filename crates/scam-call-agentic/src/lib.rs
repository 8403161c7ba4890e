//! Provider-neutral text generation for the scam call simulator
//!
//! This crate knows how to talk to LLM providers and nothing else: the
//! simulation state, prompts and fallbacks stay in `scam-call-sim`.
//!
//! ## Provider Selection
//!
//! The caller resolves a [`ProviderConfig`] (usually from `LLM_PROVIDER`):
//! - `gemini`: Google Gemini API (API key)
//! - `anthropic`: Anthropic Claude API
//! - `openai`: OpenAI API
//! - `none`: no client is built

// LLM client abstraction
pub mod backend;
pub mod client_factory;
pub mod llm_client;

// Provider clients
pub mod anthropic_client;
pub mod gemini_client;
pub mod openai_client;

mod streaming;

// Re-exports for convenience
pub use backend::LlmProvider;
pub use client_factory::{create_text_generator, ProviderConfig};
pub use llm_client::{
    ChatMessage, ChatRole, Generation, GenerationOptions, TextGenerator,
    TextStream, ToolCall, ToolDefinition,
};
