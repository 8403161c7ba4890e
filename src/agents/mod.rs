//! Decision agents driving each turn
//!
//! Every agent wraps an optional text generator. The model path returns
//! `Result<_, Unavailable>`; any failure falls through to a local heuristic,
//! so the public methods always produce an answer.

mod parse;
pub mod spelling;

pub mod director;
pub mod moderator;
pub mod victim;

use std::sync::Arc;

use thiserror::Error;

use crate::agentic::{create_text_generator, TextGenerator};
use crate::config::Settings;

pub use director::{Director, DirectorDecision};
pub use moderator::Moderator;
pub use victim::{ReplyChunk, Victim, VictimContext, VictimReply};

/// Director samples close to deterministic
pub const DIRECTOR_TEMPERATURE: f32 = 0.1;
pub const MODERATOR_TEMPERATURE: f32 = 0.2;
/// Victim replies should vary from turn to turn
pub const VICTIM_TEMPERATURE: f32 = 0.7;

/// Why the model path of an agent produced nothing usable
#[derive(Debug, Error)]
pub enum Unavailable {
    #[error("no text generator configured")]
    NotConfigured,

    #[error("remote calls disabled for this run")]
    RemoteDisabled,

    #[error("generator call failed: {0:#}")]
    Call(anyhow::Error),

    #[error("unusable model output: {0}")]
    Unusable(String),

    #[error("stream interrupted: {0:#}")]
    StreamInterrupted(anyhow::Error),
}

/// The three agents of one simulation
pub struct AgentSet {
    pub director: Director,
    pub moderator: Moderator,
    pub victim: Victim,
}

impl AgentSet {
    /// Build every agent from the configured provider
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_generators(
            create_text_generator(&settings.llm, DIRECTOR_TEMPERATURE),
            create_text_generator(&settings.llm, MODERATOR_TEMPERATURE),
            create_text_generator(&settings.llm, VICTIM_TEMPERATURE),
        )
    }

    /// Agents running on heuristics only
    pub fn heuristic() -> Self {
        Self::with_generators(None, None, None)
    }

    pub fn with_generators(
        director: Option<Arc<dyn TextGenerator>>,
        moderator: Option<Arc<dyn TextGenerator>>,
        victim: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            director: Director::new(director),
            moderator: Moderator::new(moderator),
            victim: Victim::new(victim),
        }
    }

    /// True when all three agents can reach a model
    pub fn llm_enabled(&self) -> bool {
        self.director.has_generator() && self.moderator.has_generator() && self.victim.has_generator()
    }
}
