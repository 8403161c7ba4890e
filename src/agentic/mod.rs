//! LLM provider layer
//!
//! Everything lives in the `scam-call-agentic` crate (no simulation state);
//! re-exported here so callers only depend on `scam_call_sim`.

pub use scam_call_agentic::anthropic_client;
pub use scam_call_agentic::backend;
pub use scam_call_agentic::client_factory;
pub use scam_call_agentic::gemini_client;
pub use scam_call_agentic::llm_client;
pub use scam_call_agentic::openai_client;

pub use scam_call_agentic::{
    create_text_generator, ChatMessage, ChatRole, Generation, GenerationOptions,
    LlmProvider, ProviderConfig, TextGenerator, TextStream, ToolCall, ToolDefinition,
};
