//! Engine state — the single externally observable state record.

use serde::{Deserialize, Serialize};

use super::model::Session;

/// The phases of a portal session.
///
/// Progresses `Idle → Landing → {Clarify, Thinking} → PlanReady`, with
/// `Error` reachable from any phase and recoverable back into the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Landing,
    Clarify,
    Thinking,
    PlanReady,
    Error,
}

impl Phase {
    /// Whether the dialogue has produced its terminal artifact.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::PlanReady)
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Landing => "landing",
            Self::Clarify => "clarify",
            Self::Thinking => "thinking",
            Self::PlanReady => "plan_ready",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// How the user is interacting with the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    Voice,
    Text,
}

/// The authoritative engine state, produced only by the reducer.
///
/// Invariants: `is_listening` and `is_speaking` are never both true, and a
/// missing session implies `Phase::Idle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub phase: Phase,
    pub session: Option<Session>,
    pub interaction_mode: InteractionMode,
    pub is_listening: bool,
    pub is_speaking: bool,
    pub caption: String,
    pub error: Option<String>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            session: None,
            interaction_mode: InteractionMode::Text,
            is_listening: false,
            is_speaking: false,
            caption: String::new(),
            error: None,
        }
    }
}
