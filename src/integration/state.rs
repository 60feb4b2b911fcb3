//! Turn-taking state shared with the UI
//!
//! The orchestrator is the only writer. The UI reads through
//! `SharedTurnState`, sends `OrchestratorCommand`s and receives
//! `OrchestratorEvent` notifications.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Onboarding screens shown before the first conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnboardingStep {
    Welcome,
    HowItWorks,
    Microphone,
}

impl OnboardingStep {
    /// 1-based screen number
    pub fn number(&self) -> u8 {
        match self {
            OnboardingStep::Welcome => 1,
            OnboardingStep::HowItWorks => 2,
            OnboardingStep::Microphone => 3,
        }
    }

    pub fn next(&self) -> Option<OnboardingStep> {
        match self {
            OnboardingStep::Welcome => Some(OnboardingStep::HowItWorks),
            OnboardingStep::HowItWorks => Some(OnboardingStep::Microphone),
            OnboardingStep::Microphone => None,
        }
    }
}

/// Top-level conversation state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Onboarding(OnboardingStep),
    AwaitingMicPermission,
    /// Reached only once microphone permission is granted; every later state
    /// is too, so nothing past onboarding needs to check permission again
    Idle { muted: bool },
    Listening,
    ProcessingResponse,
    Speaking,
}

impl Default for TurnState {
    fn default() -> Self {
        TurnState::Onboarding(OnboardingStep::Welcome)
    }
}

impl TurnState {
    /// A user turn is being answered or spoken
    pub fn is_turn_in_flight(&self) -> bool {
        matches!(self, TurnState::ProcessingResponse | TurnState::Speaking)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, TurnState::Listening)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Onboarding(step) => write!(f, "Onboarding({})", step.number()),
            TurnState::AwaitingMicPermission => write!(f, "AwaitingMicPermission"),
            TurnState::Idle { muted } => write!(f, "Idle(muted={})", muted),
            TurnState::Listening => write!(f, "Listening"),
            TurnState::ProcessingResponse => write!(f, "ProcessingResponse"),
            TurnState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Everything the UI needs to render the conversation controls
#[derive(Clone, Debug)]
pub struct TurnSnapshot {
    pub state: TurnState,
    /// The latest mute flag, which can differ from the state while a turn is in flight
    pub muted: bool,
    pub permission_granted: bool,
    /// Message for a retry prompt (permission denial or capture failure)
    pub error: Option<String>,
}

impl Default for TurnSnapshot {
    fn default() -> Self {
        Self {
            state: TurnState::default(),
            muted: true,
            permission_granted: false,
            error: None,
        }
    }
}

/// Thread-safe shared turn state
#[derive(Clone, Default)]
pub struct SharedTurnState {
    inner: Arc<RwLock<TurnSnapshot>>,
}

impl SharedTurnState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.inner.read().clone()
    }

    pub fn state(&self) -> TurnState {
        self.inner.read().state
    }

    pub fn is_muted(&self) -> bool {
        self.inner.read().muted
    }

    pub fn permission_granted(&self) -> bool {
        self.inner.read().permission_granted
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    pub(crate) fn publish(&self, snapshot: TurnSnapshot) {
        *self.inner.write() = snapshot;
    }
}

/// Commands that can be sent to the orchestrator
#[derive(Clone, Debug)]
pub enum OrchestratorCommand {
    /// Advance past the current onboarding screen
    AcknowledgeOnboarding,
    /// Ask for microphone access
    RequestMicrophone,
    /// Mute or unmute the microphone
    ToggleMute,
    /// Send text as if it had been spoken (option buttons, typed input)
    SubmitText(String),
    /// Replace the user-settable system prompt; resets the conversation
    SetSystemPrompt(String),
    /// Clear conversation history
    ResetConversation,
    /// Stop everything and exit the event loop
    Shutdown,
}

/// Events emitted by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum OrchestratorEvent {
    StateChanged(TurnState),
    /// A user utterance was finalized and sent to the coach
    UserTurn(String),
    /// The coach replied (or a fallback line was substituted)
    AssistantTurn {
        text: String,
        fallback: bool,
        latency_ms: u64,
    },
    /// Microphone access was denied; the user may retry
    PermissionDenied,
    /// Speech capture stopped on an error; the user may retry
    CaptureFailed(String),
    HistoryReset,
    Shutdown,
}
