//! Sound-effect tools offered to the victim model
//!
//! Each tool returns an inline tag such as `[SOUND_EFFECT: DOORBELL]`; the
//! tags are later collected from replies and stripped from spoken text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::agentic::ToolDefinition;

/// Captures the effect name of an inline tag
static SOUND_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[SOUND_EFFECT:\s*([A-Z_]+)\s*\]").unwrap());

/// A tool the victim can trigger, and the effect it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundTool {
    pub name: &'static str,
    pub description: &'static str,
    pub effect: &'static str,
}

pub const SOUND_TOOLS: [SoundTool; 4] = [
    SoundTool {
        name: "dog_bark",
        description: "Joue un bruitage d'aboiement de chien.",
        effect: "DOG_BARKING",
    },
    SoundTool {
        name: "doorbell",
        description: "Joue un bruitage de sonnette de porte.",
        effect: "DOORBELL",
    },
    SoundTool {
        name: "coughing_fit",
        description: "Simule une quinte de toux de dix secondes.",
        effect: "COUGHING_FIT",
    },
    SoundTool {
        name: "tv_background",
        description: "Augmente le volume de la television en bruit de fond.",
        effect: "TV_BACKGROUND_BFMTV",
    },
];

/// Tool definitions for `TextGenerator::bind_tools`
pub fn tool_definitions() -> Vec<ToolDefinition> {
    SOUND_TOOLS
        .iter()
        .map(|tool| ToolDefinition {
            name: tool.name.to_string(),
            description: tool.description.to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        })
        .collect()
}

/// Run a tool by name. The tools take no arguments; unknown names yield the
/// `UNKNOWN` effect tag.
pub fn run_tool(name: &str) -> String {
    let effect = SOUND_TOOLS
        .iter()
        .find(|tool| tool.name == name.trim())
        .map(|tool| tool.effect)
        .unwrap_or("UNKNOWN");
    format!("[SOUND_EFFECT: {}]", effect)
}

/// Effect names tagged in `text`, in order of appearance
pub fn extract_sound_effects(text: &str) -> Vec<String> {
    SOUND_TAG_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Drop repeated effects, keeping first-seen order
pub fn dedupe_effects(effects: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(effects.len());
    for effect in effects {
        if !out.contains(&effect) {
            out.push(effect);
        }
    }
    out
}
