//! Session state machine — model, observable state, and the pure reducer.

pub mod model;
pub mod reducer;
pub mod state;

pub use model::{Clarify, Message, NextStep, Plan, PrivacyMode, Role, Session};
pub use reducer::{Action, reduce};
pub use state::{EngineState, InteractionMode, Phase};
