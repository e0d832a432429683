//! The session reducer — a pure, total transition function over tagged
//! actions.
//!
//! Every transition returns a new state; unrecognized preconditions return
//! the input unchanged rather than raising. The reducer is the only producer
//! of `EngineState` values.

use super::model::{Clarify, Message, Plan, PrivacyMode, Role, Session};
use super::state::{EngineState, InteractionMode, Phase};

/// Tagged actions applied by the reducer.
#[derive(Debug, Clone)]
pub enum Action {
    /// Create a fresh session and enter `Landing`.
    StartSession(PrivacyMode),
    /// Clear the session, caption, and error; return to `Idle`. Idempotent.
    EndSession,
    /// Append a message to the active session. No-op without a session.
    AddMessage { role: Role, content: String },
    /// Store clarify data and enter `Clarify`. No-op without a session.
    SetClarify(Clarify),
    /// Store the plan and enter `PlanReady`. No-op without a session.
    SetPlan(Plan),
    /// Enter `Thinking` while an intelligence call is in flight.
    SetThinking,
    SetMode(InteractionMode),
    SetListening(bool),
    SetSpeaking(bool),
    SetCaption(String),
    /// Set or clear the advisory error. A non-empty error forces `Error`;
    /// clearing restores the phase implied by the session's artifacts.
    SetError(Option<String>),
}

/// Apply `action` to `state`, producing the next state.
pub fn reduce(state: &EngineState, action: Action) -> EngineState {
    match action {
        Action::StartSession(privacy_mode) => EngineState {
            phase: Phase::Landing,
            session: Some(Session::new(privacy_mode)),
            caption: String::new(),
            error: None,
            ..state.clone()
        },

        Action::EndSession => EngineState {
            phase: Phase::Idle,
            session: None,
            caption: String::new(),
            error: None,
            is_listening: false,
            is_speaking: false,
            ..state.clone()
        },

        Action::AddMessage { role, content } => match &state.session {
            None => state.clone(),
            Some(session) => {
                let mut session = session.clone();
                session.messages.push(Message::new(role, content));
                EngineState {
                    session: Some(session),
                    ..state.clone()
                }
            }
        },

        Action::SetClarify(clarify) => match &state.session {
            None => state.clone(),
            Some(session) => {
                let mut session = session.clone();
                session.clarify = Some(clarify);
                EngineState {
                    phase: Phase::Clarify,
                    session: Some(session),
                    ..state.clone()
                }
            }
        },

        Action::SetPlan(plan) => match &state.session {
            None => state.clone(),
            Some(session) => {
                let mut session = session.clone();
                session.plan = Some(plan);
                EngineState {
                    phase: Phase::PlanReady,
                    session: Some(session),
                    ..state.clone()
                }
            }
        },

        Action::SetThinking => match &state.session {
            None => state.clone(),
            Some(_) => EngineState {
                phase: Phase::Thinking,
                ..state.clone()
            },
        },

        Action::SetMode(mode) => EngineState {
            interaction_mode: mode,
            ..state.clone()
        },

        // Listening and speaking are mutually exclusive; setting one true
        // always clears the other.
        Action::SetListening(listening) => EngineState {
            is_listening: listening,
            is_speaking: if listening { false } else { state.is_speaking },
            ..state.clone()
        },

        Action::SetSpeaking(speaking) => EngineState {
            is_speaking: speaking,
            is_listening: if speaking { false } else { state.is_listening },
            ..state.clone()
        },

        Action::SetCaption(caption) => EngineState {
            caption,
            ..state.clone()
        },

        Action::SetError(error) => match error {
            Some(message) => EngineState {
                phase: Phase::Error,
                error: Some(message),
                ..state.clone()
            },
            None => EngineState {
                phase: phase_for(state),
                error: None,
                ..state.clone()
            },
        },
    }
}

/// The phase implied by the session's artifacts, used when recovering from
/// an error.
fn phase_for(state: &EngineState) -> Phase {
    match &state.session {
        None => Phase::Idle,
        Some(session) if session.plan.is_some() => Phase::PlanReady,
        Some(session) if session.clarify.is_some() => Phase::Clarify,
        Some(_) => Phase::Landing,
    }
}
