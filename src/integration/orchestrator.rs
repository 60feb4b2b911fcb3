//! Turn orchestrator for the voice conversation
//!
//! Sequences onboarding -> listening -> finalization -> coach reply ->
//! speaking -> resume, and reacts to mute toggles and typed input at any
//! point. All turn state lives in one task; every trigger (commands,
//! transcripts, timers, replies, playback completion) is queued on one
//! channel and handled to completion, in arrival order, before the next.

use crate::integration::config::CoachConfig;
use crate::integration::state::{
    OnboardingStep, OrchestratorCommand, OrchestratorEvent, SharedTurnState, TurnSnapshot,
    TurnState,
};
use crate::llm::{ChatBackend, FallbackReplies, HttpChatClient};
use crate::messages::ConversationHistory;
use crate::speech::capture::{
    CaptureEvent, CaptureEventKind, CaptureSink, Recognizer, SpeechCaptureStream,
};
use crate::speech::finalize::{spawn_silence_timer, Decision, FinalizationPolicy, UtteranceState};
use crate::speech::permission::{AlwaysGrant, MicPermission};
use crate::speech::playback::{SpeakingIndicator, SpeechPlaybackDriver, Synthesizer};
use crate::speech::ConsoleSynthesizer;
use crate::utils::perf::TurnMetrics;
use crate::{CoachError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Platform adapters the orchestrator drives
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn Recognizer>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub chat: Arc<dyn ChatBackend>,
    pub permission: Arc<dyn MicPermission>,
}

/// Everything the orchestrator reacts to
#[derive(Debug)]
enum Input {
    Command(OrchestratorCommand),
    Capture(CaptureEvent),
    SilenceElapsed { generation: u64, text: String },
    PermissionResolved(bool),
    ReplyReady {
        turn: u64,
        text: String,
        fallback: bool,
        latency: Duration,
    },
    PlaybackSettled { turn: u64, elapsed: Duration },
    ResumeDue { turn: u64 },
}

/// Queue an input unless every handle is gone
fn post(input_tx: &WeakUnboundedSender<Input>, input: Input) -> bool {
    match input_tx.upgrade() {
        Some(tx) => tx.send(input).is_ok(),
        None => false,
    }
}

/// Feeds capture events into the orchestrator's input queue
struct InputSink(WeakUnboundedSender<Input>);

impl CaptureSink for InputSink {
    fn deliver(&self, event: CaptureEvent) -> bool {
        post(&self.0, Input::Capture(event))
    }
}

/// Handle for controlling the orchestrator from the UI
#[derive(Clone)]
pub struct OrchestratorHandle {
    input_tx: UnboundedSender<Input>,
    event_rx: Receiver<OrchestratorEvent>,
    shared: SharedTurnState,
    speaking: SpeakingIndicator,
    history: ConversationHistory,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: OrchestratorCommand) -> Result<()> {
        self.input_tx
            .send(Input::Command(cmd))
            .map_err(|_| CoachError::Channel("Orchestrator is not running".into()))
    }

    pub fn acknowledge(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::AcknowledgeOnboarding)
    }

    pub fn request_microphone(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::RequestMicrophone)
    }

    pub fn toggle_mute(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::ToggleMute)
    }

    /// Send an option button or typed line as a user utterance
    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::SubmitText(text.into()))
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        self.send_command(OrchestratorCommand::SetSystemPrompt(prompt.into()))
    }

    pub fn reset_conversation(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::ResetConversation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(OrchestratorCommand::Shutdown)
    }

    /// Try to receive an event from the orchestrator
    pub fn try_recv_event(&self) -> Option<OrchestratorEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Get the event receiver for blocking or `select!` use
    pub fn event_receiver(&self) -> Receiver<OrchestratorEvent> {
        self.event_rx.clone()
    }

    pub fn state(&self) -> TurnState {
        self.shared.state()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.shared.snapshot()
    }

    /// Whether the coach is audibly speaking right now
    pub fn is_speaking(&self) -> bool {
        self.speaking.is_speaking()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }
}

/// Main orchestrator that owns the turn-taking state machine
pub struct Orchestrator {
    config: CoachConfig,

    state: TurnState,
    /// Latest user mute choice; read at resume time, never captured earlier
    muted: bool,
    permission_granted: bool,
    error: Option<String>,
    /// Id of the most recent user turn; tags replies and playback results
    turn: u64,
    /// Replies for turns up to this id predate the last history reset
    reset_through_turn: u64,

    capture: SpeechCaptureStream,
    policy: FinalizationPolicy,
    utterance: UtteranceState,
    playback: SpeechPlaybackDriver,
    chat: Arc<dyn ChatBackend>,
    permission: Arc<dyn MicPermission>,
    history: ConversationHistory,
    fallbacks: Arc<FallbackReplies>,
    metrics: TurnMetrics,

    /// Only handles hold the sending side strongly, so the queue closes with them
    input_tx: WeakUnboundedSender<Input>,
    input_rx: UnboundedReceiver<Input>,
    event_tx: Sender<OrchestratorEvent>,
    shared: SharedTurnState,
}

impl Orchestrator {
    /// Create a new orchestrator with the given configuration and adapters
    pub fn new(
        config: CoachConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, OrchestratorHandle)> {
        config.validate()?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = unbounded();

        let shared = SharedTurnState::new();
        let playback = SpeechPlaybackDriver::new(collaborators.synthesizer);
        let history = ConversationHistory::new(&config.prompt.custom);

        let orchestrator = Self {
            capture: SpeechCaptureStream::new(collaborators.recognizer, &config.capture),
            policy: FinalizationPolicy::new(config.turn.finalization.clone()),
            config,
            state: TurnState::default(),
            muted: true,
            permission_granted: false,
            error: None,
            turn: 0,
            reset_through_turn: 0,
            utterance: UtteranceState::new(),
            playback,
            chat: collaborators.chat,
            permission: collaborators.permission,
            history: history.clone(),
            fallbacks: Arc::new(FallbackReplies::new()),
            metrics: TurnMetrics::default(),
            input_tx: input_tx.downgrade(),
            input_rx,
            event_tx,
            shared: shared.clone(),
        };
        orchestrator.publish();

        let handle = OrchestratorHandle {
            input_tx,
            event_rx,
            shared,
            speaking: orchestrator.playback.indicator(),
            history,
        };

        Ok((orchestrator, handle))
    }

    /// Run the orchestrator on its own task
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process inputs until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!(state = %self.state, "Orchestrator started");

        loop {
            let input = match self.input_rx.recv().await {
                Some(input) => input,
                None => {
                    debug!("All handles dropped");
                    Input::Command(OrchestratorCommand::Shutdown)
                }
            };
            if !self.handle_input(input) {
                break;
            }
        }

        info!("Orchestrator stopped: {}", self.metrics.summary());
    }

    /// Handle one input; returns `false` when the loop should end
    fn handle_input(&mut self, input: Input) -> bool {
        match input {
            Input::Command(command) => return self.handle_command(command),

            Input::Capture(event) => self.handle_capture(event),

            Input::SilenceElapsed { generation, text } => {
                if !self.state.is_listening() {
                    return true;
                }
                if let Some(text) =
                    self.policy
                        .on_silence(&mut self.utterance, generation, &text, Instant::now())
                {
                    debug!("Silence window elapsed, finalizing");
                    self.begin_turn(text);
                }
            }

            Input::PermissionResolved(granted) => {
                if self.state != TurnState::AwaitingMicPermission {
                    return true;
                }
                if granted {
                    info!("Microphone permission granted");
                    self.permission_granted = true;
                    self.muted = true;
                    self.error = None;
                    self.transition(TurnState::Idle { muted: true });
                } else {
                    warn!("Microphone permission denied");
                    self.error = Some(CoachError::Permission("denied".into()).user_message());
                    self.transition(TurnState::Onboarding(OnboardingStep::Microphone));
                    self.emit(OrchestratorEvent::PermissionDenied);
                }
            }

            Input::ReplyReady {
                turn,
                text,
                fallback,
                latency,
            } => self.on_reply(turn, text, fallback, latency),

            Input::PlaybackSettled { turn, elapsed } => {
                if turn != self.turn || self.state != TurnState::Speaking {
                    return true;
                }
                self.metrics.record_playback(elapsed);
                self.transition(TurnState::Idle { muted: self.muted });

                if !self.muted {
                    let delay = self.config.turn.resume_delay();
                    let input_tx = self.input_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        post(&input_tx, Input::ResumeDue { turn });
                    });
                }
            }

            Input::ResumeDue { turn } => {
                if turn != self.turn {
                    return true;
                }
                if self.state == (TurnState::Idle { muted: false }) && !self.muted {
                    debug!("Resuming listening");
                    self.start_listening();
                } else {
                    debug!(state = %self.state, muted = self.muted, "Not resuming");
                }
            }
        }
        true
    }

    fn handle_command(&mut self, command: OrchestratorCommand) -> bool {
        debug!(?command, state = %self.state, "Command received");
        match command {
            OrchestratorCommand::AcknowledgeOnboarding => match self.state {
                TurnState::Onboarding(step) => match step.next() {
                    Some(next) => self.transition(TurnState::Onboarding(next)),
                    None => debug!("Onboarding waits for a microphone request"),
                },
                _ => debug!("Nothing to acknowledge"),
            },

            OrchestratorCommand::RequestMicrophone => match self.state {
                TurnState::Onboarding(OnboardingStep::Microphone) => self.request_permission(),
                _ => debug!("Microphone request ignored"),
            },

            OrchestratorCommand::ToggleMute => self.toggle_mute(),

            OrchestratorCommand::SubmitText(text) => {
                let text = text.trim();
                match self.state {
                    TurnState::Onboarding(_) | TurnState::AwaitingMicPermission => {
                        debug!("Text input unavailable before onboarding completes")
                    }
                    _ if text.is_empty() => debug!("Ignoring blank text input"),
                    _ => self.begin_turn(text.to_string()),
                }
            }

            OrchestratorCommand::SetSystemPrompt(prompt) => {
                self.history.set_custom_prompt(&prompt);
                self.reset_through_turn = self.turn;
                info!("System prompt updated, conversation reset");
                self.emit(OrchestratorEvent::HistoryReset);
            }

            OrchestratorCommand::ResetConversation => {
                self.history.reset();
                self.reset_through_turn = self.turn;
                info!("Conversation reset");
                self.emit(OrchestratorEvent::HistoryReset);
            }

            OrchestratorCommand::Shutdown => {
                info!("Orchestrator shutdown requested");
                self.stop_listening();
                self.playback.cancel();
                self.emit(OrchestratorEvent::Shutdown);
                return false;
            }
        }
        true
    }

    fn handle_capture(&mut self, event: CaptureEvent) {
        if event.session != self.capture.session() || !self.state.is_listening() {
            debug!(session = event.session, state = %self.state, "Dropping stale capture event");
            return;
        }

        match event.kind {
            CaptureEventKind::Transcript(transcript) => {
                match self
                    .policy
                    .on_transcript(&transcript, &mut self.utterance, Instant::now())
                {
                    Decision::Finalize(text) => self.begin_turn(text),
                    Decision::Continue(request) => {
                        let input_tx = self.input_tx.clone();
                        self.utterance
                            .arm(spawn_silence_timer(request, move |generation, text| {
                                post(&input_tx, Input::SilenceElapsed { generation, text });
                            }));
                    }
                    Decision::Ignore => {}
                }
            }

            CaptureEventKind::Failed(message) => {
                self.stop_listening();
                self.muted = true;
                self.error = Some(CoachError::Capture(message.clone()).user_message());
                self.transition(TurnState::Idle { muted: true });
                self.emit(OrchestratorEvent::CaptureFailed(message));
            }
        }
    }

    fn on_reply(&mut self, turn: u64, text: String, fallback: bool, latency: Duration) {
        if turn != self.turn || self.state != TurnState::ProcessingResponse {
            debug!(turn, "Dropping stale reply");
            return;
        }
        if turn > self.reset_through_turn {
            self.history.append_assistant_turn(text.as_str());
        } else {
            debug!(turn, "Reply answers a turn from before the reset, not recorded");
        }
        self.metrics.record_reply(latency, fallback);
        info!(
            turn,
            fallback,
            latency_ms = latency.as_millis() as u64,
            avg_ms = self.metrics.reply_latency().average().as_millis() as u64,
            "Coach replied"
        );
        self.emit(OrchestratorEvent::AssistantTurn {
            text: text.clone(),
            fallback,
            latency_ms: latency.as_millis() as u64,
        });
        self.transition(TurnState::Speaking);

        let playback = self.playback.clone();
        let input_tx = self.input_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            playback.speak(&text).await;
            post(
                &input_tx,
                Input::PlaybackSettled {
                    turn,
                    elapsed: started.elapsed(),
                },
            );
        });
    }

    fn toggle_mute(&mut self) {
        match self.state {
            TurnState::Onboarding(_) | TurnState::AwaitingMicPermission => {
                debug!("Mute toggle unavailable before onboarding completes");
            }

            TurnState::ProcessingResponse | TurnState::Speaking => {
                // The turn in flight runs to completion; only the resume decision changes
                self.muted = !self.muted;
                debug!(muted = self.muted, "Mute changed during turn");
                self.publish();
            }

            TurnState::Listening | TurnState::Idle { muted: false } => {
                self.stop_listening();
                self.muted = true;
                self.transition(TurnState::Idle { muted: true });
            }

            TurnState::Idle { muted: true } => self.start_listening(),
        }
    }

    fn request_permission(&mut self) {
        self.transition(TurnState::AwaitingMicPermission);

        let permission = Arc::clone(&self.permission);
        let input_tx = self.input_tx.clone();
        tokio::spawn(async move {
            let granted = permission.request().await;
            post(&input_tx, Input::PermissionResolved(granted));
        });
    }

    fn start_listening(&mut self) {
        self.utterance.clear();
        if self.capture.start(InputSink(self.input_tx.clone())) {
            self.muted = false;
            self.error = None;
            self.transition(TurnState::Listening);
        } else {
            let message = "speech recognition unavailable".to_string();
            self.muted = true;
            self.error = Some(CoachError::Capture(message.clone()).user_message());
            self.transition(TurnState::Idle { muted: true });
            self.emit(OrchestratorEvent::CaptureFailed(message));
        }
    }

    fn stop_listening(&mut self) {
        self.capture.stop();
        self.utterance.clear();
    }

    /// Hand a finalized utterance to the coach
    fn begin_turn(&mut self, text: String) {
        if self.state.is_turn_in_flight() {
            debug!(state = %self.state, "Turn already in flight, dropping utterance");
            return;
        }

        self.stop_listening();
        self.turn += 1;
        let turn = self.turn;
        info!(turn, words = text.split_whitespace().count(), "User turn finalized");

        self.history.append_user_turn(text.as_str());
        self.emit(OrchestratorEvent::UserTurn(text));
        self.transition(TurnState::ProcessingResponse);

        let context = self.history.context_window(self.config.llm.context_turns);
        let chat = Arc::clone(&self.chat);
        let fallbacks = Arc::clone(&self.fallbacks);
        let input_tx = self.input_tx.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let (text, fallback) = match chat.send_message(&context).await {
                Ok(reply) => (reply, false),
                Err(e) => {
                    warn!("Coach backend failed, using fallback reply: {}", e);
                    (fallbacks.next_reply().to_string(), true)
                }
            };
            post(
                &input_tx,
                Input::ReplyReady {
                    turn,
                    text,
                    fallback,
                    latency: started.elapsed(),
                },
            );
        });
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "State transition");
            self.state = next;
            self.emit(OrchestratorEvent::StateChanged(next));
        }
        self.publish();
    }

    fn publish(&self) {
        self.shared.publish(TurnSnapshot {
            state: self.state,
            muted: self.muted,
            permission_granted: self.permission_granted,
            error: self.error.clone(),
        });
    }

    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }
}


/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: CoachConfig,
    recognizer: Option<Arc<dyn Recognizer>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    chat: Option<Arc<dyn ChatBackend>>,
    permission: Option<Arc<dyn MicPermission>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CoachConfig::default(),
            recognizer: None,
            synthesizer: None,
            chat: None,
            permission: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: CoachConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatBackend>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_permission(mut self, permission: Arc<dyn MicPermission>) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Build the orchestrator.
    ///
    /// A recognizer is required. Playback defaults to the console
    /// synthesizer, the coach to the configured HTTP endpoint and
    /// permission to always granted.
    pub fn build(self) -> Result<(Orchestrator, OrchestratorHandle)> {
        let recognizer = self
            .recognizer
            .ok_or_else(|| CoachError::Config("a speech recognizer is required".into()))?;
        let chat = match self.chat {
            Some(chat) => chat,
            None => Arc::new(HttpChatClient::new(&self.config.llm)?),
        };
        let collaborators = Collaborators {
            recognizer,
            synthesizer: self
                .synthesizer
                .unwrap_or_else(|| Arc::new(ConsoleSynthesizer::default())),
            chat,
            permission: self.permission.unwrap_or_else(|| Arc::new(AlwaysGrant)),
        };
        Orchestrator::new(self.config, collaborators)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ConversationTurn, Role};
    use crate::speech::{ConsoleRecognizer, RecognizerEvent, TranscriptEvent};
    use async_trait::async_trait;

    struct EchoChat;

    #[async_trait]
    impl ChatBackend for EchoChat {
        async fn send_message(&self, context: &[ConversationTurn]) -> Result<String> {
            let last = context.last().map(|t| t.content.clone()).unwrap_or_default();
            Ok(format!("You said: {}", last))
        }
    }

    struct Denied;

    #[async_trait]
    impl MicPermission for Denied {
        async fn request(&self) -> bool {
            false
        }
    }

    fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .with_recognizer(Arc::new(ConsoleRecognizer::new()))
            .with_synthesizer(Arc::new(ConsoleSynthesizer::new(Duration::ZERO)))
            .with_chat(Arc::new(EchoChat))
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    /// Skip onboarding and open the microphone without running the loop
    fn listening(orchestrator: &mut Orchestrator) {
        orchestrator.permission_granted = true;
        orchestrator.state = TurnState::Idle { muted: true };
        orchestrator.toggle_mute();
        assert_eq!(orchestrator.state, TurnState::Listening);
    }

    fn final_words(session: u64, text: &str) -> Input {
        Input::Capture(CaptureEvent {
            session,
            kind: CaptureEventKind::Transcript(TranscriptEvent::final_result(text)),
        })
    }

    fn user_turns(handle: &OrchestratorHandle) -> Vec<String> {
        handle
            .history()
            .turns()
            .into_iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content)
            .collect()
    }

    #[test]
    fn test_orchestrator_creation() {
        let (_, handle) = builder().build().unwrap();
        assert_eq!(handle.state(), TurnState::Onboarding(OnboardingStep::Welcome));
        assert!(handle.snapshot().muted);
        assert!(!handle.is_speaking());
    }

    #[test]
    fn test_builder_requires_recognizer() {
        let result = OrchestratorBuilder::new().with_chat(Arc::new(EchoChat)).build();
        assert!(matches!(result, Err(CoachError::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CoachConfig::default();
        config.llm.context_turns = 0;
        assert!(builder().with_config(config).build().is_err());
    }

    #[tokio::test]
    async fn test_onboarding_and_permission_flow() {
        let (orchestrator, handle) = builder().build().unwrap();
        orchestrator.start();

        handle.acknowledge().unwrap();
        handle.acknowledge().unwrap();
        handle.acknowledge().unwrap();
        settle().await;
        assert_eq!(handle.state(), TurnState::Onboarding(OnboardingStep::Microphone));

        handle.request_microphone().unwrap();
        settle().await;
        assert_eq!(handle.state(), TurnState::Idle { muted: true });
        assert!(handle.snapshot().permission_granted);
    }

    #[tokio::test]
    async fn test_denied_permission_is_retryable() {
        let (orchestrator, handle) = builder()
            .with_permission(Arc::new(Denied))
            .build()
            .unwrap();
        orchestrator.start();

        handle.acknowledge().unwrap();
        handle.acknowledge().unwrap();
        handle.request_microphone().unwrap();
        settle().await;

        assert_eq!(handle.state(), TurnState::Onboarding(OnboardingStep::Microphone));
        assert!(handle.snapshot().error.is_some());
        let events: Vec<_> = std::iter::from_fn(|| handle.try_recv_event()).collect();
        assert!(events.contains(&OrchestratorEvent::PermissionDenied));

        // Retry goes through the same request path
        handle.request_microphone().unwrap();
        settle().await;
        assert_eq!(
            handle.try_recv_event(),
            Some(OrchestratorEvent::StateChanged(TurnState::AwaitingMicPermission))
        );
    }

    #[tokio::test]
    async fn test_shutdown_ends_loop() {
        let (orchestrator, handle) = builder().build().unwrap();
        let task = orchestrator.start();

        handle.shutdown().unwrap();
        task.await.unwrap();

        let events: Vec<_> = std::iter::from_fn(|| handle.try_recv_event()).collect();
        assert_eq!(events.last(), Some(&OrchestratorEvent::Shutdown));
        assert!(handle.shutdown().is_err());
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_orchestrator() {
        let (orchestrator, handle) = builder().build().unwrap();
        let task = orchestrator.start();
        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_inputs_handled_in_arrival_order() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let (mut orchestrator, handle) = builder()
            .with_recognizer(recognizer.clone())
            .build()
            .unwrap();
        listening(&mut orchestrator);

        // The spoken utterance is queued before the typed one
        assert!(recognizer.emit(RecognizerEvent::Transcript(TranscriptEvent::final_result(
            "spoken first"
        ))));
        settle().await;
        handle.submit_text("typed second").unwrap();

        orchestrator.start();
        settle().await;

        assert_eq!(user_turns(&handle), vec!["spoken first"]);
        let user_events: Vec<_> = std::iter::from_fn(|| handle.try_recv_event())
            .filter(|e| matches!(e, OrchestratorEvent::UserTurn(_)))
            .collect();
        assert_eq!(user_events, vec![OrchestratorEvent::UserTurn("spoken first".into())]);
    }

    #[tokio::test]
    async fn test_transcript_from_previous_session_is_dropped() {
        let (mut orchestrator, handle) = builder().build().unwrap();
        listening(&mut orchestrator);
        let old_session = orchestrator.capture.session();

        orchestrator.toggle_mute();
        orchestrator.toggle_mute();
        assert_eq!(orchestrator.state, TurnState::Listening);
        assert_eq!(orchestrator.capture.session(), old_session + 1);

        assert!(orchestrator.handle_input(final_words(old_session, "old words")));
        assert_eq!(orchestrator.state, TurnState::Listening);
        assert!(handle.history().is_empty());

        let current = orchestrator.capture.session();
        orchestrator.handle_input(final_words(current, "new words"));
        assert_eq!(orchestrator.state, TurnState::ProcessingResponse);
        assert_eq!(user_turns(&handle), vec!["new words"]);
    }

    #[tokio::test]
    async fn test_reply_after_reset_is_spoken_but_not_recorded() {
        let (mut orchestrator, handle) = builder().build().unwrap();
        orchestrator.permission_granted = true;
        orchestrator.state = TurnState::Idle { muted: true };

        orchestrator.handle_input(Input::Command(OrchestratorCommand::SubmitText("Hi".into())));
        assert_eq!(orchestrator.state, TurnState::ProcessingResponse);
        orchestrator.handle_input(Input::Command(OrchestratorCommand::ResetConversation));
        assert!(handle.history().is_empty());

        orchestrator.handle_input(Input::ReplyReady {
            turn: orchestrator.turn,
            text: "Hello there".into(),
            fallback: false,
            latency: Duration::from_millis(20),
        });
        assert_eq!(orchestrator.state, TurnState::Speaking);
        assert!(handle.history().is_empty());
        let events: Vec<_> = std::iter::from_fn(|| handle.try_recv_event()).collect();
        assert!(events.iter().any(|e| matches!(
            e,
            OrchestratorEvent::AssistantTurn { text, .. } if text == "Hello there"
        )));

        // Turns after the reset are recorded again
        orchestrator.state = TurnState::Idle { muted: true };
        orchestrator.handle_input(Input::Command(OrchestratorCommand::SubmitText("Next".into())));
        orchestrator.handle_input(Input::ReplyReady {
            turn: orchestrator.turn,
            text: "Go on".into(),
            fallback: false,
            latency: Duration::from_millis(20),
        });
        assert_eq!(handle.history().len(), 2);
        assert_eq!(handle.history().count_role(Role::Assistant), 1);
    }
}
