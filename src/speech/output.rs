//! Speech output port — speaks one utterance at a time.
//!
//! `SpeechOutput` wraps a platform `Synthesizer` adapter with the engine's
//! speaking discipline: single-flight, duplicate suppression, cancel-then-
//! settle before every start, and filtering of the interrupt errors an
//! intentional cancel produces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::config::PortalConfig;
use crate::error::SynthesisError;

/// A voice offered by the platform synthesizer.
#[derive(Debug, Clone)]
pub struct Voice {
    pub name: String,
    /// BCP-47-style tag, e.g. "en-US".
    pub language: String,
}

/// Lifecycle events for one utterance.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    Started,
    Ended,
    Errored(SynthesisError),
}

/// Platform seam for voice synthesis. Adapters deliver per-utterance events
/// on the receiver returned from `start`.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Whether synthesis is available at all on this platform.
    fn is_supported(&self) -> bool;

    /// The voices currently available.
    async fn voices(&self) -> Vec<Voice>;

    /// Begin speaking `text`. Events for this utterance arrive on the
    /// returned channel; a closed channel counts as ended.
    async fn start(
        &self,
        text: &str,
        voice: Option<&Voice>,
    ) -> Result<mpsc::Receiver<SynthesisEvent>, SynthesisError>;

    /// Cancel the active utterance, if any. Idempotent and always safe.
    async fn cancel(&self);
}

/// Adapter for platforms without synthesis; every start fails and the
/// service no-ops around it.
pub struct UnsupportedSynthesizer;

#[async_trait]
impl Synthesizer for UnsupportedSynthesizer {
    fn is_supported(&self) -> bool {
        false
    }

    async fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }

    async fn start(
        &self,
        _text: &str,
        _voice: Option<&Voice>,
    ) -> Result<mpsc::Receiver<SynthesisEvent>, SynthesisError> {
        Err(SynthesisError::SynthesisUnavailable)
    }

    async fn cancel(&self) {}
}

/// Name fragments that mark a voice as female across common platforms.
const FEMALE_NAME_HINTS: &[&str] = &[
    "female", "samantha", "victoria", "karen", "moira", "tessa", "zira", "susan", "allison",
    "ava", "serena",
];

/// Pick a voice: female-by-name first, then the locale prefix, then the
/// first available.
pub fn pick_voice(voices: &[Voice], locale: &str) -> Option<Voice> {
    voices
        .iter()
        .find(|v| {
            let name = v.name.to_lowercase();
            FEMALE_NAME_HINTS.iter().any(|hint| name.contains(hint))
        })
        .or_else(|| voices.iter().find(|v| v.language.starts_with(locale)))
        .or_else(|| voices.first())
        .cloned()
}

#[derive(Default)]
struct OutputState {
    speaking: bool,
    /// Text queued or in flight; identical re-submissions are dropped.
    pending: Option<String>,
    /// True while a deliberate cancel/teardown is in progress; interrupt
    /// errors raised in this window are expected and swallowed.
    cancelling: bool,
}

/// Single-flight speech output over a platform synthesizer.
pub struct SpeechOutput {
    synthesizer: Arc<dyn Synthesizer>,
    cancel_settle: Duration,
    locale: String,
    state: Mutex<OutputState>,
}

impl SpeechOutput {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, config: &PortalConfig) -> Self {
        Self {
            synthesizer,
            cancel_settle: config.cancel_settle,
            locale: config.locale.clone(),
            state: Mutex::new(OutputState::default()),
        }
    }

    /// Whether an utterance is currently being spoken.
    pub async fn is_speaking(&self) -> bool {
        self.state.lock().await.speaking
    }

    /// Speak `text` and resolve once the started-then-ended sequence
    /// completes. Returns `Ok(false)` when the call was a no-op (already
    /// speaking, identical text queued, or deliberately cancelled mid-way).
    pub async fn speak_and_wait(&self, text: &str) -> Result<bool, SynthesisError> {
        if !self.synthesizer.is_supported() {
            return Ok(false);
        }

        {
            let mut state = self.state.lock().await;
            if state.speaking || state.pending.as_deref() == Some(text) {
                tracing::debug!("Duplicate or concurrent utterance dropped");
                return Ok(false);
            }
            state.pending = Some(text.to_string());
        }

        // Cancel whatever came before, then give the platform a moment to
        // settle; starting immediately after a cancel raises spurious
        // interrupt errors.
        self.synthesizer.cancel().await;
        tokio::time::sleep(self.cancel_settle).await;
        {
            let mut state = self.state.lock().await;
            state.cancelling = false;
        }

        let voices = self.synthesizer.voices().await;
        let voice = pick_voice(&voices, &self.locale);

        let mut events = match self.synthesizer.start(text, voice.as_ref()).await {
            Ok(events) => events,
            Err(e) => {
                let mut state = self.state.lock().await;
                state.pending = None;
                return Err(e);
            }
        };

        loop {
            match events.recv().await {
                Some(SynthesisEvent::Started) => {
                    let mut state = self.state.lock().await;
                    state.speaking = true;
                }
                Some(SynthesisEvent::Ended) | None => {
                    let mut state = self.state.lock().await;
                    state.speaking = false;
                    state.pending = None;
                    return Ok(true);
                }
                Some(SynthesisEvent::Errored(error)) => {
                    let mut state = self.state.lock().await;
                    state.speaking = false;
                    state.pending = None;
                    if error == SynthesisError::Interrupted && state.cancelling {
                        // Expected fallout of our own cancel.
                        state.cancelling = false;
                        tracing::debug!("Swallowed interrupt from deliberate cancel");
                        return Ok(false);
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Cancel the active utterance. Idempotent and always safe to call.
    pub async fn cancel(&self) {
        {
            let mut state = self.state.lock().await;
            state.cancelling = true;
            state.pending = None;
        }
        self.synthesizer.cancel().await;
        let mut state = self.state.lock().await;
        state.speaking = false;
    }
}
