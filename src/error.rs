//! Error types for the portal engine.

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Speech-capture and transcription errors.
///
/// None of these tear the session down; recognition can be retried on the
/// next user action.
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Audio capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Audio capture is not supported on this platform")]
    Unsupported,

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Transcription failed: {0}")]
    Transcription(#[from] ServiceError),
}

/// Voice-synthesis errors.
///
/// `Interrupted` raised during an intentional cancel is expected and is
/// filtered out before reaching callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SynthesisError {
    #[error("Utterance was interrupted")]
    Interrupted,

    #[error("Audio output is busy")]
    AudioBusy,

    #[error("Audio hardware failure")]
    AudioHardware,

    #[error("Network failure during synthesis")]
    Network,

    #[error("Synthesis is not available on this platform")]
    SynthesisUnavailable,

    #[error("Synthesis failed")]
    SynthesisFailed,

    #[error("Requested language is unavailable")]
    LanguageUnavailable,

    #[error("Requested voice is unavailable")]
    VoiceUnavailable,

    #[error("Utterance text exceeds the maximum length")]
    TextTooLong,

    #[error("Synthesis error: {0}")]
    Other(String),
}

/// Errors from the networked intelligence, analytics, and PDF endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Request to {endpoint} failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
