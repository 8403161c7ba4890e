//! Scam call simulation
//!
//! A turn engine for a simulated tech-support scam call: the scammer's
//! lines move the call through fixed stages, a victim persona answers, and
//! an audience can vote interruptions into the victim's next replies.
//!
//! Each agent (director, moderator, victim) calls a text generator when one
//! is configured and falls back to local heuristics otherwise.

pub mod agentic;
pub mod agents;
pub mod config;
pub mod engine;
pub mod error;
pub mod scenario;
pub mod sound_tools;
pub mod stream_sanitizer;
pub mod text_safety;

#[cfg(feature = "server")]
pub mod api;

pub use config::Settings;
pub use engine::{Snapshot, TurnEngine};
pub use error::SimError;
