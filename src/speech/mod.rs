//! Speech input and output for the turn-taking engine
//!
//! This module provides:
//! - Continuous speech capture over a platform recognizer
//! - The utterance finalization policy
//! - A playback driver over a platform synthesizer
//! - The microphone permission seam
//! - Terminal adapters for running without audio devices

pub mod capture;
pub mod console;
pub mod finalize;
pub mod permission;
pub mod playback;

// Re-export commonly used types
pub use capture::{
    CaptureConfig, CaptureEvent, CaptureEventKind, CaptureSink, RecognitionErrorKind, Recognizer,
    RecognizerEvent, SpeechCaptureStream, TranscriptEvent,
};
pub use console::{ConsoleRecognizer, ConsoleSynthesizer};
pub use finalize::{Decision, FinalizationConfig, FinalizationPolicy, UtteranceState};
pub use permission::{AlwaysGrant, MicPermission};
pub use playback::{SpeakingIndicator, SpeechPlaybackDriver, Synthesizer};
