//! Stage director
//!
//! Decides after each scammer line which stage the call has reached. The
//! stage never moves backward.

use std::sync::Arc;

use tracing::{debug, warn};

use super::parse::{json_object, text_field};
use super::Unavailable;
use crate::agentic::{ChatMessage, TextGenerator};
use crate::engine::ConversationMessage;
use crate::scenario::{self, detect_stage, stage, stage_index_for_key, STAGES};

/// History lines shown to the director
const CONTEXT_MESSAGES: usize = 8;

const HEURISTIC_REASON: &str = "Heuristique locale: progression basee sur mots-cles.";
const MISSING_REASON: &str = "LLM decision sans justification explicite.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorDecision {
    pub stage_index: usize,
    pub objective: String,
    pub reason: String,
}

pub struct Director {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Director {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self { generator }
    }

    pub fn has_generator(&self) -> bool {
        self.generator.is_some()
    }

    /// Next stage for the call, never below `current_stage`
    pub async fn decide(
        &self,
        latest_scammer: &str,
        history: &[ConversationMessage],
        current_stage: usize,
    ) -> DirectorDecision {
        match self.decide_with_llm(latest_scammer, history, current_stage).await {
            Ok(decision) => decision,
            Err(Unavailable::NotConfigured) => Self::heuristic(latest_scammer, current_stage),
            Err(e) => {
                warn!("Director falling back to keyword scan: {}", e);
                Self::heuristic(latest_scammer, current_stage)
            }
        }
    }

    fn heuristic(latest_scammer: &str, current_stage: usize) -> DirectorDecision {
        let stage_index = detect_stage(latest_scammer, current_stage);
        DirectorDecision {
            stage_index,
            objective: stage(stage_index).objective.to_string(),
            reason: HEURISTIC_REASON.to_string(),
        }
    }

    async fn decide_with_llm(
        &self,
        latest_scammer: &str,
        history: &[ConversationMessage],
        current_stage: usize,
    ) -> Result<DirectorDecision, Unavailable> {
        let generator = self.generator.as_ref().ok_or(Unavailable::NotConfigured)?;

        let excerpt = history
            .iter()
            .skip(history.len().saturating_sub(CONTEXT_MESSAGES))
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let stage_keys = STAGES.iter().map(|s| s.key).collect::<Vec<_>>().join(", ");

        let system = format!(
            "Tu es le Directeur de Scenario d'un appel simule. Reponds uniquement par un JSON valide:\n\
             {{\"next_stage_key\":\"...\", \"objective\":\"...\", \"reason\":\"...\"}}\n\
             Stages autorises, dans l'ordre: {}.\n\
             Le stage ne recule jamais. Aucune autre cle.",
            stage_keys
        );
        let user = format!(
            "Stage actuel: {}\nDernier message arnaqueur: {}\nHistorique recent:\n{}",
            stage(current_stage).key,
            latest_scammer,
            excerpt
        );

        let generation = generator
            .invoke(&[ChatMessage::system(system), ChatMessage::user(user)])
            .await
            .map_err(Unavailable::Call)?;

        let payload = json_object(&generation.content)
            .ok_or_else(|| Unavailable::Unusable("no JSON object in director answer".into()))?;

        let key = text_field(&payload, "next_stage_key");
        let mut stage_index = match stage_index_for_key(&key) {
            Some(idx) => idx,
            None => {
                debug!("Unknown stage key {:?}, using keyword scan", key);
                detect_stage(latest_scammer, current_stage)
            }
        };

        let mut objective = text_field(&payload, "objective");
        if stage_index < current_stage {
            debug!(
                "Director proposed stage {} below current {}, holding",
                stage_index, current_stage
            );
            stage_index = current_stage.min(scenario::last_stage_index());
            objective.clear();
        }
        if objective.is_empty() {
            objective = stage(stage_index).objective.to_string();
        }

        let mut reason = text_field(&payload, "reason");
        if reason.is_empty() {
            reason = MISSING_REASON.to_string();
        }

        Ok(DirectorDecision {
            stage_index,
            objective,
            reason,
        })
    }
}
