//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Engine configuration.
///
/// The numeric thresholds are product-tuned constants carried over verbatim;
/// do not re-derive them.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Hard cap on user turns before a plan is forced.
    pub max_turns: usize,
    /// Minimum user turns before a plan may be generated normally.
    pub min_turns_for_plan: usize,
    /// Earliest user turn at which confusion keywords shortcut to a plan.
    pub confusion_min_turn: usize,
    /// How long the RMS level must stay below the threshold before capture
    /// stops automatically.
    pub silence_duration: Duration,
    /// RMS energy threshold separating speech from silence.
    pub rms_threshold: f32,
    /// Settle delay between cancelling a prior utterance and starting the
    /// next one (back-to-back cancellation raises spurious interrupt errors).
    pub cancel_settle: Duration,
    /// Delay before recognition auto-restarts after synthesis ends.
    pub listen_restart_delay: Duration,
    /// Window within which a repeated transcript is treated as a duplicate.
    pub transcript_dedup_ttl: Duration,
    /// Locale prefix used for voice selection (e.g. "en").
    pub locale: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            max_turns: 9,
            min_turns_for_plan: 5,
            confusion_min_turn: 4,
            silence_duration: Duration::from_millis(1200),
            rms_threshold: 0.02,
            cancel_settle: Duration::from_millis(150),
            listen_restart_delay: Duration::from_millis(400),
            transcript_dedup_ttl: Duration::from_secs(2),
            locale: "en".to_string(),
        }
    }
}

/// Connection settings for the intelligence/analytics/PDF endpoints.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL, e.g. `https://example.com/api`.
    pub base_url: String,
    /// Optional bearer token sent with every request.
    pub api_token: Option<SecretString>,
}

impl EndpointConfig {
    /// Read endpoint settings from the environment.
    ///
    /// `PORTAL_API_BASE` is required; `PORTAL_API_TOKEN` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("PORTAL_API_BASE")
            .map_err(|_| ConfigError::MissingEnvVar("PORTAL_API_BASE".to_string()))?;
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "PORTAL_API_BASE".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        let api_token = std::env::var("PORTAL_API_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(SecretString::from);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }
}
