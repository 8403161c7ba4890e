//! Simulation state and its serialisable snapshot

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::scenario::{self, SCENARIO_NAME};

/// Turns an audience constraint stays active after a vote
pub const CONSTRAINT_TURNS: u32 = 2;

const INITIAL_REASON: &str = "Simulation initialisee.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Scammer,
    Victim,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::Scammer => write!(f, "scammer"),
            MessageRole::Victim => write!(f, "victim"),
        }
    }
}

/// One line of the call; never changed once appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    /// RFC 3339, UTC
    pub timestamp: String,
    pub sound_effects: Vec<String>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>, sound_effects: Vec<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            sound_effects,
        }
    }
}

/// The mutable aggregate owned by the turn engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationState {
    pub stage_index: usize,
    pub current_objective: String,
    pub director_reason: String,
    pub audience_constraint: String,
    pub audience_constraint_turns_left: u32,
    pub turn_count: u64,
    pub messages: Vec<ConversationMessage>,
    pub pending_proposals: Vec<String>,
    pub selected_choices: Vec<String>,
    pub last_winner: String,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            stage_index: 0,
            current_objective: scenario::stage(0).objective.to_string(),
            director_reason: INITIAL_REASON.to_string(),
            audience_constraint: String::new(),
            audience_constraint_turns_left: 0,
            turn_count: 0,
            messages: Vec::new(),
            pending_proposals: Vec::new(),
            selected_choices: Vec::new(),
            last_winner: String::new(),
        }
    }
}

impl SimulationState {
    /// The last `limit` messages
    pub fn recent_messages(&self, limit: usize) -> &[ConversationMessage] {
        &self.messages[self.messages.len().saturating_sub(limit)..]
    }

    pub fn push_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        sound_effects: Vec<String>,
    ) {
        self.messages
            .push(ConversationMessage::new(role, content, sound_effects));
    }

    /// Move to `stage_index`, never backward
    pub fn advance_stage(&mut self, stage_index: usize, objective: String, reason: String) {
        self.stage_index = stage_index
            .max(self.stage_index)
            .min(scenario::last_stage_index());
        self.current_objective = objective;
        self.director_reason = reason;
    }

    /// Make `winner` the active constraint for the next turns
    pub fn apply_winner(&mut self, winner: String) {
        self.audience_constraint = winner.clone();
        self.audience_constraint_turns_left = CONSTRAINT_TURNS;
        self.last_winner = winner;
    }

    /// Count one turn off the active constraint
    pub fn tick_constraint(&mut self) {
        if self.audience_constraint_turns_left == 0 {
            return;
        }
        self.audience_constraint_turns_left -= 1;
        if self.audience_constraint_turns_left == 0 {
            self.audience_constraint.clear();
        }
    }
}

/// Provider details reported alongside the state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmStatus {
    pub llm_enabled: bool,
    pub llm_configured: bool,
    pub llm_provider: String,
    pub llm_model: String,
}

/// Deep copy of the state plus derived fields, as sent to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub scenario_name: String,
    pub stage_index: usize,
    pub stage_name: String,
    pub current_objective: String,
    pub director_reason: String,
    pub audience_constraint: String,
    pub audience_constraint_turns_left: u32,
    pub turn_count: u64,
    pub messages: Vec<ConversationMessage>,
    pub pending_proposals: Vec<String>,
    pub selected_choices: Vec<String>,
    pub last_winner: String,
    pub available_stages: Vec<String>,
    #[serde(flatten)]
    pub llm: LlmStatus,
}

impl Snapshot {
    pub fn capture(state: &SimulationState, llm: LlmStatus) -> Self {
        Self {
            scenario_name: SCENARIO_NAME.to_string(),
            stage_index: state.stage_index,
            stage_name: scenario::stage(state.stage_index).name.to_string(),
            current_objective: state.current_objective.clone(),
            director_reason: state.director_reason.clone(),
            audience_constraint: state.audience_constraint.clone(),
            audience_constraint_turns_left: state.audience_constraint_turns_left,
            turn_count: state.turn_count,
            messages: state.messages.clone(),
            pending_proposals: state.pending_proposals.clone(),
            selected_choices: state.selected_choices.clone(),
            last_winner: state.last_winner.clone(),
            available_stages: scenario::stage_names(),
            llm,
        }
    }
}
