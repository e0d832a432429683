//! Portal controller — the composition root.
//!
//! Owns the engine state and the reducer, reacts to speech-port events, and
//! exposes the user intents: start a session, submit text or voice input,
//! change interaction mode, reset, and request the plan document. All state
//! observation happens through the watch channel of `EngineState` snapshots.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};

use crate::analytics::{AnalyticsRecorder, AnalyticsSink, events};
use crate::config::PortalConfig;
use crate::error::{Error, RecognitionError, ServiceError};
use crate::intelligence::IntelligenceService;
use crate::orchestrator::{TurnOrchestrator, TurnOutcome};
use crate::pdf::{PdfRenderer, RenderedPdf};
use crate::session::{Action, EngineState, InteractionMode, PrivacyMode, Role, reduce};
use crate::speech::{
    AudioCapture, InputEvent, SpeechInput, SpeechOutput, Synthesizer,
};

/// Advisory copy shown when a service call fails. None of these tear the
/// session down.
const GENERIC_SERVICE_ERROR: &str = "Something went wrong. Please try again.";
const PDF_ERROR: &str = "Could not prepare your plan document. Please try again.";
const NO_PLAN_ERROR: &str = "There is no plan to download yet.";
const MIC_DENIED_ERROR: &str = "Microphone access was denied. You can keep typing instead.";
const MIC_GENERIC_ERROR: &str = "I couldn't hear that. Please try again.";

/// External collaborators for the controller.
pub struct PortalDeps {
    pub intelligence: Arc<dyn IntelligenceService>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub capture: Arc<dyn AudioCapture>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub pdf: Arc<dyn PdfRenderer>,
}

/// The session-orchestration engine. Explicitly constructed and owned;
/// exactly one session is active per instance.
pub struct PortalController {
    config: PortalConfig,
    state: Mutex<EngineState>,
    watch_tx: watch::Sender<EngineState>,
    orchestrator: Mutex<TurnOrchestrator>,
    output: Arc<SpeechOutput>,
    input: Arc<SpeechInput>,
    recorder: Mutex<AnalyticsRecorder>,
    pdf: Arc<dyn PdfRenderer>,
}

impl PortalController {
    /// Wire the engine together and start its voice-event loop.
    pub fn new(config: PortalConfig, deps: PortalDeps) -> Arc<Self> {
        let (input_tx, input_rx) = mpsc::channel(16);
        let (watch_tx, _) = watch::channel(EngineState::default());

        let output = Arc::new(SpeechOutput::new(deps.synthesizer, &config));
        let input = Arc::new(SpeechInput::new(
            deps.capture,
            Arc::clone(&deps.intelligence),
            config.clone(),
            input_tx,
        ));
        let orchestrator = TurnOrchestrator::new(deps.intelligence, config.clone());

        let controller = Arc::new(Self {
            config,
            state: Mutex::new(EngineState::default()),
            watch_tx,
            orchestrator: Mutex::new(orchestrator),
            output,
            input,
            recorder: Mutex::new(AnalyticsRecorder::new(deps.analytics)),
            pdf: deps.pdf,
        });
        controller.spawn_voice_loop(input_rx);
        controller
    }

    /// Observe engine state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.watch_tx.subscribe()
    }

    /// Current state snapshot.
    pub async fn state(&self) -> EngineState {
        self.state.lock().await.clone()
    }

    /// Apply an action through the reducer and publish the new state.
    async fn dispatch(&self, action: Action) -> EngineState {
        let mut state = self.state.lock().await;
        let next = reduce(&state, action);
        *state = next.clone();
        self.watch_tx.send_replace(next.clone());
        next
    }

    // ── User intents ────────────────────────────────────────────────

    /// Begin a session. No-op when one is already active; the reducer
    /// itself does not guard this.
    pub async fn start_session(&self, privacy_mode: PrivacyMode) {
        {
            let state = self.state.lock().await;
            if state.session.is_some() {
                tracing::warn!("Session already active; start ignored");
                return;
            }
        }
        self.orchestrator.lock().await.reset();
        self.recorder.lock().await.begin(privacy_mode);
        self.dispatch(Action::StartSession(privacy_mode)).await;
        tracing::info!(?privacy_mode, "Session started");
    }

    /// Submit a typed utterance.
    pub async fn submit_text(self: &Arc<Self>, text: &str) {
        self.handle_utterance(text.trim().to_string()).await;
    }

    /// Switch between voice and text interaction.
    pub async fn set_mode(&self, mode: InteractionMode) {
        self.dispatch(Action::SetMode(mode)).await;
        self.recorder.lock().await.track(
            events::MODE_CHANGED,
            Some(serde_json::json!({ "mode": mode })),
        );
        match mode {
            InteractionMode::Text => {
                // Gate voice first so a transcript already in flight is
                // discarded rather than processed.
                self.input.set_accepting(false);
                self.input.stop_listening().await;
                self.output.cancel().await;
                self.dispatch(Action::SetListening(false)).await;
                self.dispatch(Action::SetSpeaking(false)).await;
            }
            InteractionMode::Voice => {
                self.input.set_accepting(true);
            }
        }
    }

    /// Open the microphone for one utterance. Stops any active synthesis
    /// first; speaking and listening are mutually exclusive.
    pub async fn start_voice_input(self: &Arc<Self>) {
        {
            let state = self.state.lock().await;
            if state.session.is_none() || state.interaction_mode != InteractionMode::Voice {
                return;
            }
        }
        self.output.cancel().await;
        self.dispatch(Action::SetSpeaking(false)).await;
        self.input.set_accepting(true);
        match self.input.start_listening().await {
            Ok(true) => {
                self.dispatch(Action::SetListening(true)).await;
            }
            // Unsupported capture: stay quiet rather than claim to listen.
            Ok(false) => {}
            Err(e) => self.report_recognition_error(&e).await,
        }
    }

    /// Stop capturing and transcribe whatever was heard.
    pub async fn stop_voice_input(&self) {
        self.input.stop_listening().await;
    }

    /// End the session. Idempotent.
    pub async fn reset(&self) {
        self.input.set_accepting(false);
        self.input.stop_listening().await;
        self.output.cancel().await;
        self.recorder.lock().await.finish().await;
        self.orchestrator.lock().await.reset();
        self.dispatch(Action::EndSession).await;
        tracing::info!("Session ended");
    }

    /// Render the finished plan as a PDF for download. Failure surfaces an
    /// advisory error and keeps the plan intact for a retry.
    pub async fn request_pdf(&self) -> Result<RenderedPdf, Error> {
        let rendered = {
            let state = self.state.lock().await;
            state
                .session
                .as_ref()
                .and_then(|session| session.plan.clone().map(|plan| (plan, session.privacy_mode)))
        };
        let Some((plan, privacy_mode)) = rendered else {
            self.dispatch(Action::SetError(Some(NO_PLAN_ERROR.to_string())))
                .await;
            return Err(Error::Service(ServiceError::InvalidResponse {
                endpoint: "render-pdf".to_string(),
                reason: "no plan available".to_string(),
            }));
        };

        match self.pdf.render(&plan, privacy_mode).await {
            Ok(document) => {
                self.recorder.lock().await.record_plan_downloaded();
                Ok(document)
            }
            Err(e) => {
                tracing::warn!("PDF render failed: {}", e);
                self.dispatch(Action::SetError(Some(PDF_ERROR.to_string())))
                    .await;
                Err(e.into())
            }
        }
    }

    // ── Dialogue turn ───────────────────────────────────────────────

    /// Run one dialogue turn for a finalized utterance, regardless of how
    /// it arrived.
    async fn handle_utterance(self: &Arc<Self>, text: String) {
        if text.is_empty() {
            return;
        }
        {
            let state = self.state.lock().await;
            if state.session.is_none() {
                tracing::warn!("Utterance without an active session ignored");
                return;
            }
            if state.phase == crate::session::Phase::Thinking {
                tracing::debug!("Turn already in flight; input dropped");
                return;
            }
        }

        // A stale advisory error must not block the retry.
        self.dispatch(Action::SetError(None)).await;
        self.dispatch(Action::AddMessage {
            role: Role::User,
            content: text.clone(),
        })
        .await;
        self.recorder.lock().await.record_message();
        let snapshot = self.dispatch(Action::SetThinking).await;
        let Some(session) = snapshot.session.clone() else {
            return;
        };

        let outcome = {
            let mut orchestrator = self.orchestrator.lock().await;
            orchestrator.next_turn(&session, &text).await
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Intelligence call failed: {}", e);
                self.dispatch(Action::SetError(Some(GENERIC_SERVICE_ERROR.to_string())))
                    .await;
                return;
            }
        };

        let reply = outcome.reply().to_string();
        let plan_ready = matches!(outcome, TurnOutcome::PlanReady { .. });
        match &outcome {
            TurnOutcome::AskClarify { clarify, .. } => {
                self.dispatch(Action::SetClarify(clarify.clone())).await;
                let mut recorder = self.recorder.lock().await;
                recorder.track(
                    events::CLARIFY_GENERATED,
                    Some(serde_json::json!({ "questions": clarify.questions.len() })),
                );
                recorder.record_clarify_question();
            }
            TurnOutcome::AskQuestion(_) => {
                self.recorder.lock().await.record_clarify_question();
            }
            TurnOutcome::PlanReady { plan, .. } => {
                self.dispatch(Action::SetPlan(plan.clone())).await;
                self.recorder.lock().await.record_plan_generated();
            }
            TurnOutcome::FollowUp(_) | TurnOutcome::Closing(_) => {}
        }
        self.dispatch(Action::AddMessage {
            role: Role::Assistant,
            content: reply.clone(),
        })
        .await;
        self.dispatch(Action::SetCaption(reply.clone())).await;
        // Settle the phase implied by the session's artifacts (leaves
        // Thinking behind for the branches that set no phase themselves).
        self.dispatch(Action::SetError(None)).await;

        let mode = self.state.lock().await.interaction_mode;
        if mode == InteractionMode::Voice {
            self.speak_reply(&reply, plan_ready).await;
        }
    }

    /// Voice-mode reply: synthesis always stops recognition first, then
    /// recognition may auto-restart once speaking ends.
    async fn speak_reply(self: &Arc<Self>, reply: &str, plan_ready: bool) {
        self.input.stop_listening().await;
        self.dispatch(Action::SetSpeaking(true)).await;
        match self.output.speak_and_wait(reply).await {
            Ok(spoke) => {
                if spoke && plan_ready {
                    self.recorder.lock().await.record_plan_read_aloud();
                }
            }
            Err(e) => {
                tracing::warn!("Synthesis failed: {}", e);
                self.dispatch(Action::SetError(Some(MIC_GENERIC_ERROR.to_string())))
                    .await;
            }
        }
        self.dispatch(Action::SetSpeaking(false)).await;
        self.spawn_listen_restart();
    }

    /// After synthesis ends, restart recognition after a short delay, but
    /// only if the mode is still voice, no plan exists yet, and recognition
    /// is not already active.
    fn spawn_listen_restart(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(controller.config.listen_restart_delay).await;
            let eligible = {
                let state = controller.state.lock().await;
                state.interaction_mode == InteractionMode::Voice
                    && !state.is_listening
                    && !state.is_speaking
                    && state
                        .session
                        .as_ref()
                        .is_some_and(|session| session.plan.is_none())
            };
            if !eligible {
                return;
            }
            match controller.input.start_listening().await {
                Ok(true) => {
                    controller.dispatch(Action::SetListening(true)).await;
                }
                Ok(false) => {}
                Err(e) => controller.report_recognition_error(&e).await,
            }
        });
    }

    // ── Voice events ────────────────────────────────────────────────

    fn spawn_voice_loop(self: &Arc<Self>, mut input_rx: mpsc::Receiver<InputEvent>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = input_rx.recv().await {
                match event {
                    InputEvent::Transcript(text) => {
                        controller.dispatch(Action::SetListening(false)).await;
                        controller.handle_utterance(text).await;
                    }
                    InputEvent::Empty => {
                        controller.dispatch(Action::SetListening(false)).await;
                    }
                    InputEvent::Error(e) => {
                        controller.dispatch(Action::SetListening(false)).await;
                        controller.report_recognition_error(&e).await;
                    }
                }
            }
        });
    }

    async fn report_recognition_error(&self, error: &RecognitionError) {
        tracing::warn!("Recognition error: {}", error);
        let advisory = match error {
            RecognitionError::PermissionDenied => MIC_DENIED_ERROR,
            _ => MIC_GENERIC_ERROR,
        };
        self.dispatch(Action::SetError(Some(advisory.to_string())))
            .await;
    }
}
