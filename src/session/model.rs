//! Session data model — the conversation record and its artifacts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Whether session metrics may leave the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    /// Metrics may be persisted and dispatched.
    OnTheRecord,
    /// No analytics leaves the device.
    Confidential,
}

impl PrivacyMode {
    pub fn is_confidential(&self) -> bool {
        matches!(self, Self::Confidential)
    }
}

/// One message in the conversation. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of the first intelligence call: an understanding statement plus a
/// fixed list of follow-up questions. Read-only after it is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarify {
    pub understanding: String,
    pub questions: Vec<String>,
}

/// One recommended next step inside a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// The terminal structured recommendation. Once set, the session is complete
/// for dialogue purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub summary: String,
    pub key_insights: Vec<String>,
    pub next_steps: Vec<NextStep>,
    pub estimated_scope: String,
    pub calendly_purpose: String,
    pub tags: Vec<String>,
}

/// One continuous conversation between a user and the assistant.
///
/// Ephemeral: exists only between session start and session end, owned
/// exclusively by the state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub privacy_mode: PrivacyMode,
    pub messages: Vec<Message>,
    pub clarify: Option<Clarify>,
    pub plan: Option<Plan>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(privacy_mode: PrivacyMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            privacy_mode,
            messages: Vec::new(),
            clarify: None,
            plan: None,
            created_at: Utc::now(),
        }
    }

    /// Count of user-authored messages.
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }
}
