//! Analytics recorder — per-session metrics and events with privacy-gated
//! dispatch.
//!
//! In confidential mode nothing ever leaves the device; counters still
//! accumulate in memory and are discarded on session end.

pub mod http;

pub use http::HttpAnalyticsSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ServiceError;
use crate::session::PrivacyMode;

/// Event names dispatched by the engine.
pub mod events {
    pub const SESSION_STARTED: &str = "session_started";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const CLARIFY_GENERATED: &str = "clarify_generated";
    pub const PLAN_GENERATED: &str = "plan_generated";
    pub const PLAN_DOWNLOADED: &str = "plan_downloaded";
    pub const PLAN_READ_ALOUD: &str = "plan_read_aloud";
    pub const MODE_CHANGED: &str = "mode_changed";
    pub const SESSION_ENDED: &str = "session_ended";
}

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Counters and booleans derived from one session.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub message_count: u32,
    pub clarify_questions_asked: u32,
    pub plan_generated: bool,
    pub plan_downloaded: bool,
    pub plan_read_aloud: bool,
}

impl SessionMetrics {
    /// Completion score out of 100: 20 for any message, 30 for at least two
    /// clarify questions, 30 for a plan, 20 for the artifact being
    /// downloaded or read aloud.
    pub fn completion_score(&self) -> u32 {
        let mut score = 0;
        if self.message_count > 0 {
            score += 20;
        }
        if self.clarify_questions_asked >= 2 {
            score += 30;
        }
        if self.plan_generated {
            score += 30;
        }
        if self.plan_downloaded || self.plan_read_aloud {
            score += 20;
        }
        score
    }
}

/// Backend seam for the one-batch dispatch at session end.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn submit(
        &self,
        metrics: &SessionMetrics,
        completion_score: u32,
        events: &[EventRecord],
    ) -> Result<(), ServiceError>;
}

/// Accumulates metrics and events for the lifetime of one session.
pub struct AnalyticsRecorder {
    sink: std::sync::Arc<dyn AnalyticsSink>,
    privacy_mode: PrivacyMode,
    metrics: SessionMetrics,
    events: Vec<EventRecord>,
    active: bool,
}

impl AnalyticsRecorder {
    pub fn new(sink: std::sync::Arc<dyn AnalyticsSink>) -> Self {
        Self {
            sink,
            privacy_mode: PrivacyMode::OnTheRecord,
            metrics: SessionMetrics::default(),
            events: Vec::new(),
            active: false,
        }
    }

    /// Reset for a fresh session.
    pub fn begin(&mut self, privacy_mode: PrivacyMode) {
        self.privacy_mode = privacy_mode;
        self.metrics = SessionMetrics::default();
        self.events.clear();
        self.active = true;
        self.track(events::SESSION_STARTED, None);
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Record an event. Accumulated in memory regardless of privacy mode;
    /// the gate applies at dispatch time. Ignored outside a session.
    pub fn track(&mut self, event: &str, properties: Option<serde_json::Value>) {
        if !self.active {
            return;
        }
        self.events.push(EventRecord {
            event: event.to_string(),
            properties,
            timestamp: Utc::now(),
        });
    }

    pub fn record_message(&mut self) {
        self.metrics.message_count += 1;
        self.track(events::MESSAGE_SENT, None);
    }

    pub fn record_clarify_question(&mut self) {
        self.metrics.clarify_questions_asked += 1;
    }

    pub fn record_plan_generated(&mut self) {
        self.metrics.plan_generated = true;
        self.track(events::PLAN_GENERATED, None);
    }

    pub fn record_plan_downloaded(&mut self) {
        self.metrics.plan_downloaded = true;
        self.track(events::PLAN_DOWNLOADED, None);
    }

    pub fn record_plan_read_aloud(&mut self) {
        self.metrics.plan_read_aloud = true;
        self.track(events::PLAN_READ_ALOUD, None);
    }

    /// Close out the session. Dispatches the accumulated batch unless the
    /// session was confidential; the event log is cleared either way, and
    /// network failure is non-critical.
    pub async fn finish(&mut self) {
        if !self.active {
            return;
        }
        self.track(events::SESSION_ENDED, None);
        self.active = false;

        if self.privacy_mode.is_confidential() {
            tracing::debug!("Confidential session; analytics discarded");
        } else {
            let score = self.metrics.completion_score();
            if let Err(e) = self.sink.submit(&self.metrics, score, &self.events).await {
                tracing::warn!("Analytics dispatch failed: {}", e);
            }
        }

        self.events.clear();
        self.metrics = SessionMetrics::default();
    }
}
