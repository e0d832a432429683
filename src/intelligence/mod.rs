//! Intelligence service port — clarify, plan, and transcribe endpoints.
//!
//! The engine treats these services as opaque: structured input in,
//! structured JSON out. The `http` module provides the production adapter.

pub mod http;

pub use http::HttpIntelligence;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::session::{Clarify, Plan, PrivacyMode, Role, Session};

/// One turn of conversation as sent to the plan endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Flatten a session's message log into wire turns.
    pub fn from_session(session: &Session) -> Vec<ConversationTurn> {
        session
            .messages
            .iter()
            .map(|m| ConversationTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }
}

/// Port over the three networked intelligence endpoints.
#[async_trait]
pub trait IntelligenceService: Send + Sync {
    /// First-contact call: produce an understanding statement and follow-up
    /// questions for the opening utterance.
    async fn clarify(
        &self,
        user_message: &str,
        privacy_mode: PrivacyMode,
    ) -> Result<Clarify, ServiceError>;

    /// Produce the terminal plan from the full conversation so far.
    async fn plan(
        &self,
        conversation: &[ConversationTurn],
        privacy_mode: PrivacyMode,
    ) -> Result<Plan, ServiceError>;

    /// Transcribe a finished audio capture. Returns `None` when the service
    /// heard nothing usable.
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language: Option<&str>,
    ) -> Result<Option<String>, ServiceError>;
}
