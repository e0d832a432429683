//! Speech input port — captures one utterance and returns its transcript.
//!
//! An amplitude monitor watches RMS energy over short frames; sustained
//! silence stops capture automatically and the buffered audio is sent to
//! the transcription endpoint. Stale transcripts (arriving after a mode
//! switch) and near-duplicate transcripts are discarded.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::config::PortalConfig;
use crate::error::RecognitionError;
use crate::intelligence::IntelligenceService;

/// Platform seam for audio capture. Frames are mono f32 samples.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Whether capture is available at all on this platform.
    fn is_supported(&self) -> bool;

    /// Sample rate of the frames delivered by `start`.
    fn sample_rate(&self) -> u32;

    /// Open the microphone and begin delivering frames. The channel closes
    /// when capture stops.
    async fn start(&self) -> Result<mpsc::Receiver<Vec<f32>>, RecognitionError>;

    /// Stop capture and release the device. Idempotent; must be safe on
    /// every path, including errors.
    async fn stop(&self);
}

/// Adapter for platforms without a microphone.
pub struct UnsupportedCapture;

#[async_trait]
impl AudioCapture for UnsupportedCapture {
    fn is_supported(&self) -> bool {
        false
    }

    fn sample_rate(&self) -> u32 {
        16_000
    }

    async fn start(&self) -> Result<mpsc::Receiver<Vec<f32>>, RecognitionError> {
        Err(RecognitionError::Unsupported)
    }

    async fn stop(&self) {}
}

/// Events reported by the input port.
#[derive(Debug)]
pub enum InputEvent {
    /// A finalized transcript ready for the dialogue.
    Transcript(String),
    /// Capture finished without a usable transcript; callers clean up UI
    /// state on this as well.
    Empty,
    /// Recognition failed; advisory only, retry is always allowed.
    Error(RecognitionError),
}

/// RMS energy of one frame.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|s| s * s).sum();
    (sum / frame.len() as f32).sqrt()
}

/// Encode f32 samples as a 16-bit PCM mono WAV payload for transcription.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * 2;
    let mut out = Vec::with_capacity(44 + samples.len() * 2);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        out.extend_from_slice(&((clamped * i16::MAX as f32) as i16).to_le_bytes());
    }
    out
}

struct InputState {
    listening: bool,
    /// Hashes of recently processed transcripts with their arrival times;
    /// repeats inside the TTL window are rejected.
    recent: Vec<(u64, Instant)>,
}

/// Speech input service over a platform capture adapter.
pub struct SpeechInput {
    capture: Arc<dyn AudioCapture>,
    intelligence: Arc<dyn IntelligenceService>,
    config: PortalConfig,
    events: mpsc::Sender<InputEvent>,
    state: Arc<Mutex<InputState>>,
    /// Explicit gate for voice input; cleared when the user switches to
    /// text mode so stale transcripts are discarded, not processed.
    accepting: Arc<AtomicBool>,
}

impl SpeechInput {
    pub fn new(
        capture: Arc<dyn AudioCapture>,
        intelligence: Arc<dyn IntelligenceService>,
        config: PortalConfig,
        events: mpsc::Sender<InputEvent>,
    ) -> Self {
        Self {
            capture,
            intelligence,
            config,
            events,
            state: Arc::new(Mutex::new(InputState {
                listening: false,
                recent: Vec::new(),
            })),
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the port is currently capturing.
    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.listening
    }

    /// Gate or un-gate voice input. While gated, transcripts are silently
    /// discarded (a completion event still fires for UI cleanup).
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Begin audio capture. Returns whether the port is capturing afterwards:
    /// `Ok(false)` when the platform has no capture at all, `Ok(true)` when a
    /// capture is running (freshly started or already in progress).
    pub async fn start_listening(self: &Arc<Self>) -> Result<bool, RecognitionError> {
        if !self.capture.is_supported() {
            tracing::warn!("Audio capture unsupported; listening request ignored");
            return Ok(false);
        }
        {
            let mut state = self.state.lock().await;
            if state.listening {
                return Ok(true);
            }
            state.listening = true;
        }

        let frames = match self.capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                // Release on every path, error included.
                self.capture.stop().await;
                self.state.lock().await.listening = false;
                return Err(e);
            }
        };

        let port = Arc::clone(self);
        tokio::spawn(async move {
            port.monitor(frames).await;
        });
        Ok(true)
    }

    /// Force an immediate stop and transcription attempt.
    pub async fn stop_listening(&self) {
        // Closes the frame channel; the monitor task finishes the capture.
        self.capture.stop().await;
    }

    /// Consume frames until sustained silence or the channel closes, then
    /// transcribe whatever was buffered.
    async fn monitor(self: Arc<Self>, mut frames: mpsc::Receiver<Vec<f32>>) {
        let sample_rate = self.capture.sample_rate();
        let mut buffer: Vec<f32> = Vec::new();
        let mut silence = Duration::ZERO;

        while let Some(frame) = frames.recv().await {
            let frame_duration =
                Duration::from_secs_f64(frame.len() as f64 / sample_rate as f64);
            if rms(&frame) < self.config.rms_threshold {
                silence += frame_duration;
            } else {
                silence = Duration::ZERO;
            }
            buffer.extend_from_slice(&frame);

            if silence >= self.config.silence_duration {
                tracing::debug!(?silence, "Silence threshold reached, stopping capture");
                break;
            }
        }

        self.capture.stop().await;
        self.state.lock().await.listening = false;
        self.finish(buffer, sample_rate).await;
    }

    /// Transcribe the buffered audio and report the result. Every path
    /// emits exactly one event.
    async fn finish(&self, buffer: Vec<f32>, sample_rate: u32) {
        if buffer.is_empty() {
            self.events.send(InputEvent::Empty).await.ok();
            return;
        }
        // While gated, nothing from this capture may surface — not a
        // transcript and not a transcription failure.
        if !self.accepting.load(Ordering::SeqCst) {
            tracing::debug!("Voice input gated; capture discarded");
            self.events.send(InputEvent::Empty).await.ok();
            return;
        }

        let audio = encode_wav_pcm16(&buffer, sample_rate);
        let result = self
            .intelligence
            .transcribe(audio, Some(&self.config.locale))
            .await;

        let event = match result {
            Ok(Some(text)) => {
                if !self.accepting.load(Ordering::SeqCst) {
                    tracing::debug!("Voice input gated; transcript discarded");
                    InputEvent::Empty
                } else if self.is_duplicate(&text).await {
                    tracing::debug!("Duplicate transcript rejected");
                    InputEvent::Empty
                } else {
                    InputEvent::Transcript(text)
                }
            }
            Ok(None) => InputEvent::Empty,
            Err(e) if self.accepting.load(Ordering::SeqCst) => {
                InputEvent::Error(RecognitionError::Transcription(e))
            }
            Err(e) => {
                tracing::debug!("Voice input gated; transcription failure dropped: {}", e);
                InputEvent::Empty
            }
        };
        self.events.send(event).await.ok();
    }

    /// Record the transcript hash and report whether it repeated within the
    /// TTL window.
    async fn is_duplicate(&self, text: &str) -> bool {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let digest = hasher.finish();

        let now = Instant::now();
        let ttl = self.config.transcript_dedup_ttl;
        let mut state = self.state.lock().await;
        state.recent.retain(|(_, seen)| now.duration_since(*seen) < ttl);
        if state.recent.iter().any(|(h, _)| *h == digest) {
            return true;
        }
        state.recent.push((digest, now));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::Mutex as TokioMutex;

    use crate::error::ServiceError;
    use crate::intelligence::ConversationTurn;
    use crate::session::{Clarify, Plan, PrivacyMode};

    /// Capture adapter fed from a test-controlled sender.
    struct FakeCapture {
        sender: TokioMutex<Option<mpsc::Sender<Vec<f32>>>>,
        handle: TokioMutex<Option<mpsc::Sender<Vec<f32>>>>,
    }

    impl FakeCapture {
        fn new() -> Self {
            Self {
                sender: TokioMutex::new(None),
                handle: TokioMutex::new(None),
            }
        }

        async fn feed(&self, frame: Vec<f32>) {
            if let Some(tx) = self.handle.lock().await.as_ref() {
                tx.send(frame).await.ok();
            }
        }
    }

    #[async_trait]
    impl AudioCapture for FakeCapture {
        fn is_supported(&self) -> bool {
            true
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }

        async fn start(&self) -> Result<mpsc::Receiver<Vec<f32>>, RecognitionError> {
            let (tx, rx) = mpsc::channel(64);
            *self.sender.lock().await = Some(tx.clone());
            *self.handle.lock().await = Some(tx);
            Ok(rx)
        }

        async fn stop(&self) {
            self.sender.lock().await.take();
            self.handle.lock().await.take();
        }
    }

    /// Transcriber that always fails.
    struct FailingTranscriber;

    #[async_trait]
    impl IntelligenceService for FailingTranscriber {
        async fn clarify(
            &self,
            _user_message: &str,
            _privacy_mode: PrivacyMode,
        ) -> Result<Clarify, ServiceError> {
            unreachable!()
        }

        async fn plan(
            &self,
            _conversation: &[ConversationTurn],
            _privacy_mode: PrivacyMode,
        ) -> Result<Plan, ServiceError> {
            unreachable!()
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _language: Option<&str>,
        ) -> Result<Option<String>, ServiceError> {
            Err(ServiceError::RequestFailed {
                endpoint: "transcribe".to_string(),
                reason: "down".to_string(),
            })
        }
    }

    /// Transcriber returning a fixed text.
    struct FixedTranscriber(Option<String>);

    #[async_trait]
    impl IntelligenceService for FixedTranscriber {
        async fn clarify(
            &self,
            _user_message: &str,
            _privacy_mode: PrivacyMode,
        ) -> Result<Clarify, ServiceError> {
            unreachable!()
        }

        async fn plan(
            &self,
            _conversation: &[ConversationTurn],
            _privacy_mode: PrivacyMode,
        ) -> Result<Plan, ServiceError> {
            unreachable!()
        }

        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _language: Option<&str>,
        ) -> Result<Option<String>, ServiceError> {
            Ok(self.0.clone())
        }
    }

    fn input(
        capture: Arc<FakeCapture>,
        transcript: Option<&str>,
    ) -> (Arc<SpeechInput>, mpsc::Receiver<InputEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let config = PortalConfig {
            // Short silence window so tests run fast: 2 frames of 1600
            // samples at 16 kHz are 200 ms.
            silence_duration: Duration::from_millis(150),
            ..PortalConfig::default()
        };
        let port = Arc::new(SpeechInput::new(
            capture,
            Arc::new(FixedTranscriber(transcript.map(String::from))),
            config,
            tx,
        ));
        (port, rx)
    }

    fn loud_frame() -> Vec<f32> {
        vec![0.5; 1600]
    }

    fn quiet_frame() -> Vec<f32> {
        vec![0.001; 1600]
    }

    #[test]
    fn rms_of_known_signals() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert!(rms(&quiet_frame()) < 0.02);
        assert!(rms(&loud_frame()) > 0.02);
    }

    #[test]
    fn wav_header_shape() {
        let wav = encode_wav_pcm16(&[0.0; 100], 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 200);
        // Sample rate field.
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 16_000);
    }

    #[tokio::test]
    async fn silence_stops_capture_and_reports_transcript() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), Some("hello there"));

        port.start_listening().await.unwrap();
        assert!(port.is_listening().await);

        capture.feed(loud_frame()).await;
        // Two quiet frames exceed the 150 ms test threshold.
        capture.feed(quiet_frame()).await;
        capture.feed(quiet_frame()).await;

        let event = events.recv().await.unwrap();
        match event {
            InputEvent::Transcript(text) => assert_eq!(text, "hello there"),
            other => panic!("expected transcript, got {other:?}"),
        }
        assert!(!port.is_listening().await, "microphone released");
    }

    #[tokio::test]
    async fn forced_stop_transcribes_buffered_audio() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), Some("forced"));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, InputEvent::Transcript(t) if t == "forced"));
    }

    #[tokio::test]
    async fn empty_capture_still_fires_completion() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), Some("unused"));

        port.start_listening().await.unwrap();
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, InputEvent::Empty));
    }

    #[tokio::test]
    async fn empty_transcript_reports_empty() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), None);

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event, InputEvent::Empty));
    }

    #[tokio::test]
    async fn gated_input_discards_transcript() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), Some("stale words"));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.set_accepting(false);
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, InputEvent::Empty),
            "gated transcript must be discarded, not processed"
        );
    }

    #[tokio::test]
    async fn gated_input_suppresses_transcription_failure() {
        let capture = Arc::new(FakeCapture::new());
        let (tx, mut events) = mpsc::channel(8);
        let config = PortalConfig {
            silence_duration: Duration::from_millis(150),
            ..PortalConfig::default()
        };
        let port = Arc::new(SpeechInput::new(
            capture.clone(),
            Arc::new(FailingTranscriber),
            config,
            tx,
        ));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.set_accepting(false);
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, InputEvent::Empty),
            "gated capture must not surface a transcription error"
        );
    }

    #[tokio::test]
    async fn transcription_failure_reports_error_when_accepting() {
        let capture = Arc::new(FakeCapture::new());
        let (tx, mut events) = mpsc::channel(8);
        let config = PortalConfig {
            silence_duration: Duration::from_millis(150),
            ..PortalConfig::default()
        };
        let port = Arc::new(SpeechInput::new(
            capture.clone(),
            Arc::new(FailingTranscriber),
            config,
            tx,
        ));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.stop_listening().await;

        let event = events.recv().await.unwrap();
        assert!(matches!(
            event,
            InputEvent::Error(RecognitionError::Transcription(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_transcript_within_ttl_is_rejected() {
        let capture = Arc::new(FakeCapture::new());
        let (port, mut events) = input(capture.clone(), Some("same utterance"));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.stop_listening().await;
        assert!(matches!(
            events.recv().await.unwrap(),
            InputEvent::Transcript(_)
        ));

        port.start_listening().await.unwrap();
        capture.feed(loud_frame()).await;
        port.stop_listening().await;
        assert!(matches!(events.recv().await.unwrap(), InputEvent::Empty));
    }

    #[tokio::test]
    async fn start_listening_twice_is_noop() {
        let capture = Arc::new(FakeCapture::new());
        let (port, _events) = input(capture.clone(), Some("x"));

        assert!(port.start_listening().await.unwrap());
        assert!(port.start_listening().await.unwrap());
        assert!(port.is_listening().await);
    }

    #[tokio::test]
    async fn unsupported_capture_reports_not_started() {
        let (tx, _rx) = mpsc::channel(8);
        let port = Arc::new(SpeechInput::new(
            Arc::new(UnsupportedCapture),
            Arc::new(FixedTranscriber(None)),
            PortalConfig::default(),
            tx,
        ));
        assert!(!port.start_listening().await.unwrap());
        assert!(!port.is_listening().await);
    }
}
