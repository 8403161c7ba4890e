//! Turn engine
//!
//! Owns the simulation state. Every operation runs under one async mutex
//! held until its snapshot is taken, model calls included, so a turn is
//! only ever observed whole.

mod state;

use rand::seq::SliceRandom;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::agents::{AgentSet, ReplyChunk, VictimContext, VictimReply};
use crate::config::Settings;
use crate::error::{Result, SimError};
use crate::scenario;

pub use state::{
    ConversationMessage, LlmStatus, MessageRole, SimulationState, Snapshot, CONSTRAINT_TURNS,
};

/// Longest audience proposal kept, in characters
pub const MAX_PROPOSAL_CHARS: usize = crate::agents::moderator::MAX_PROPOSAL_CHARS;

pub struct TurnEngine {
    settings: Settings,
    agents: AgentSet,
    state: Mutex<SimulationState>,
}

impl TurnEngine {
    pub fn new(settings: Settings, agents: AgentSet) -> Self {
        Self {
            settings,
            agents,
            state: Mutex::new(SimulationState::default()),
        }
    }

    /// Engine whose agents use the provider named in `settings`
    pub fn from_settings(settings: Settings) -> Self {
        let agents = AgentSet::from_settings(&settings);
        Self::new(settings, agents)
    }

    pub fn llm_status(&self) -> LlmStatus {
        LlmStatus {
            llm_enabled: self.agents.llm_enabled(),
            llm_configured: self.settings.llm_configured(),
            llm_provider: self.settings.llm_provider_name().to_string(),
            llm_model: self.settings.llm.model.clone(),
        }
    }

    pub async fn reset(&self) -> Snapshot {
        let mut state = self.state.lock().await;
        *state = SimulationState::default();
        info!("Simulation reset");
        self.capture(&state)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        self.capture(&state)
    }

    /// Play one turn: scammer line, stage decision, victim reply
    pub async fn step(&self, scammer_input: &str) -> Result<Snapshot> {
        self.run_turn(scammer_input, None).await
    }

    /// [`step`](Self::step), streaming the victim's words to `tx` before the
    /// snapshot is returned.
    ///
    /// `tx` is dropped when the turn is recorded, which closes the channel.
    /// A receiver that goes away mid-turn does not cancel the turn.
    pub async fn step_stream(
        &self,
        scammer_input: &str,
        tx: mpsc::Sender<ReplyChunk>,
    ) -> Result<Snapshot> {
        self.run_turn(scammer_input, Some(tx)).await
    }

    async fn run_turn(
        &self,
        scammer_input: &str,
        tx: Option<mpsc::Sender<ReplyChunk>>,
    ) -> Result<Snapshot> {
        let text = scammer_input.trim();
        if text.is_empty() {
            return Err(SimError::validation("Le message arnaqueur est vide."));
        }

        let mut state = self.state.lock().await;
        let history = state
            .recent_messages(self.settings.max_history_messages)
            .to_vec();

        state.turn_count += 1;
        state.push_message(MessageRole::Scammer, text, Vec::new());

        let decision = self
            .agents
            .director
            .decide(text, &history, state.stage_index)
            .await;
        state.advance_stage(decision.stage_index, decision.objective, decision.reason);

        let objective = state.current_objective.clone();
        let constraint = state.audience_constraint.clone();
        let ctx = VictimContext {
            latest_scammer: text,
            history: &history,
            objective: &objective,
            audience_constraint: &constraint,
            stage_name: scenario::stage(state.stage_index).name,
        };
        let VictimReply {
            text: reply,
            sound_effects,
        } = match &tx {
            Some(tx) => self.agents.victim.respond_stream(&ctx, tx).await,
            None => self.agents.victim.respond(&ctx).await,
        };

        state.push_message(MessageRole::Victim, reply, sound_effects);
        state.tick_constraint();
        debug!(
            "Turn {} recorded at stage {}",
            state.turn_count, state.stage_index
        );
        Ok(self.capture(&state))
    }

    /// Queue an audience proposal for the next selection
    pub async fn submit_proposal(&self, proposal: &str) -> Result<Snapshot> {
        let clean = proposal.trim();
        if clean.is_empty() {
            return Err(SimError::validation("La proposition audience est vide."));
        }
        let mut state = self.state.lock().await;
        state.pending_proposals.push(truncate(clean));
        Ok(self.capture(&state))
    }

    /// Merge `extra` into the queue and let the moderator pick the choices
    /// put to the vote. The queue is emptied.
    pub async fn select_choices(&self, extra: Option<Vec<String>>) -> Snapshot {
        let mut state = self.state.lock().await;
        for proposal in extra.unwrap_or_default() {
            let clean = proposal.trim();
            if !clean.is_empty() {
                state.pending_proposals.push(truncate(clean));
            }
        }

        let pending = std::mem::take(&mut state.pending_proposals);
        let stage_name = scenario::stage(state.stage_index).name;
        let objective = state.current_objective.clone();
        state.selected_choices = self
            .agents
            .moderator
            .select_choices(&pending, stage_name, &objective)
            .await;
        info!(
            "Audience selection: {} of {} proposals",
            state.selected_choices.len(),
            pending.len()
        );
        self.capture(&state)
    }

    pub async fn vote_choice(&self, winner_index: usize) -> Result<Snapshot> {
        let mut state = self.state.lock().await;
        if state.selected_choices.is_empty() {
            return Err(SimError::validation(
                "Aucun choix audience disponible. Lancez /api/audience/select.",
            ));
        }
        let winner = state
            .selected_choices
            .get(winner_index)
            .cloned()
            .ok_or_else(|| SimError::validation("winner_index est hors limite."))?;
        state.apply_winner(winner);
        Ok(self.capture(&state))
    }

    /// Vote for a uniformly random choice
    pub async fn simulate_vote(&self) -> Result<Snapshot> {
        let mut state = self.state.lock().await;
        let winner = state
            .selected_choices
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| {
                SimError::validation("Aucun choix audience disponible pour un vote simule.")
            })?;
        state.apply_winner(winner);
        Ok(self.capture(&state))
    }

    fn capture(&self, state: &SimulationState) -> Snapshot {
        Snapshot::capture(state, self.llm_status())
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_PROPOSAL_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TurnEngine {
        TurnEngine::new(Settings::heuristic_only(), AgentSet::heuristic())
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let engine = engine();
        let err = engine.step("   ").await.unwrap_err();
        assert_eq!(err, SimError::validation("Le message arnaqueur est vide."));
        assert_eq!(engine.snapshot().await.turn_count, 0);
    }

    #[tokio::test]
    async fn test_step_appends_two_messages() {
        let engine = engine();
        let snapshot = engine.step("  Bonjour, support Microsoft ").await.unwrap();
        assert_eq!(snapshot.turn_count, 1);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].content, "Bonjour, support Microsoft");
        assert_eq!(snapshot.messages[1].role, MessageRole::Victim);
        assert_eq!(snapshot.director_reason, "Heuristique locale: progression basee sur mots-cles.");
    }

    #[tokio::test]
    async fn test_proposal_truncated() {
        let engine = engine();
        let long = "a".repeat(300);
        let snapshot = engine.submit_proposal(&long).await.unwrap();
        assert_eq!(snapshot.pending_proposals[0].chars().count(), MAX_PROPOSAL_CHARS);
        assert!(engine.submit_proposal(" ").await.is_err());
    }

    #[tokio::test]
    async fn test_vote_errors() {
        let engine = engine();
        assert_eq!(
            engine.vote_choice(0).await.unwrap_err(),
            SimError::validation("Aucun choix audience disponible. Lancez /api/audience/select.")
        );
        engine
            .select_choices(Some(vec!["On sonne a la porte".to_string()]))
            .await;
        assert_eq!(
            engine.vote_choice(3).await.unwrap_err(),
            SimError::validation("winner_index est hors limite.")
        );
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let engine = engine();
        engine.step("Vous avez un virus").await.unwrap();
        let snapshot = engine.reset().await;
        assert_eq!(snapshot.turn_count, 0);
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.stage_index, 0);
    }

    #[tokio::test]
    async fn test_llm_status_without_provider() {
        let status = engine().llm_status();
        assert!(!status.llm_enabled);
        assert!(!status.llm_configured);
        assert_eq!(status.llm_provider, "none");
    }
}
