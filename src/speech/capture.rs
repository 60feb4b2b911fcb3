//! Continuous speech capture
//!
//! `SpeechCaptureStream` wraps a platform `Recognizer` and turns its raw
//! session events into a steady stream of transcript events:
//! - Sessions the backend ends on its own (idle timeouts) are restarted
//!   transparently while the caller still wants to listen
//! - `no-speech` and `aborted` errors are expected noise and swallowed
//! - Any other error stops the stream and is reported once
//!
//! Every event carries the session number it was produced under, so events
//! queued before a `stop()` can be told apart from a later session.

use crate::Result;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A recognition result for the current utterance attempt
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptEvent {
    /// Cumulative recognized text
    pub text: String,
    /// Whether the backend marked this result as complete
    pub is_final: bool,
    /// Advisory confidence in `[0, 1]`
    pub confidence: f32,
}

impl TranscriptEvent {
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            confidence: 0.0,
        }
    }

    pub fn final_result(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            confidence: 1.0,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Error reported by a recognition backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    Other(String),
}

impl RecognitionErrorKind {
    /// Benign errors happen during normal use and never stop capture
    pub fn is_benign(&self) -> bool {
        matches!(self, RecognitionErrorKind::NoSpeech | RecognitionErrorKind::Aborted)
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionErrorKind::NoSpeech => write!(f, "no-speech"),
            RecognitionErrorKind::Aborted => write!(f, "aborted"),
            RecognitionErrorKind::Other(message) => write!(f, "{}", message),
        }
    }
}

/// Raw events from a recognizer session
#[derive(Clone, Debug, PartialEq)]
pub enum RecognizerEvent {
    Transcript(TranscriptEvent),
    Error(RecognitionErrorKind),
    /// The backend closed the session without being asked to
    SessionEnded,
}

/// Platform speech-to-text adapter
pub trait Recognizer: Send + Sync {
    /// Whether a recognition backend exists on this platform
    fn is_available(&self) -> bool;

    /// Open a recognition session delivering events to `events`
    fn begin(&self, events: UnboundedSender<RecognizerEvent>) -> Result<()>;

    /// Close the current session; must be safe to call when none is open
    fn end(&self);
}

/// Configuration for the capture stream
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay before reopening a session the backend ended on its own
    pub restart_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: 250,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEventKind {
    Transcript(TranscriptEvent),
    /// Capture stopped because of a non-benign error
    Failed(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaptureEvent {
    pub session: u64,
    pub kind: CaptureEventKind,
}

/// Destination for capture events
pub trait CaptureSink: Send + Sync + 'static {
    /// Deliver one event; returns `false` once nobody is receiving
    fn deliver(&self, event: CaptureEvent) -> bool;
}

impl CaptureSink for UnboundedSender<CaptureEvent> {
    fn deliver(&self, event: CaptureEvent) -> bool {
        self.send(event).is_ok()
    }
}

pub struct SpeechCaptureStream {
    recognizer: Arc<dyn Recognizer>,
    restart_delay: Duration,
    should_listen: Arc<AtomicBool>,
    session: u64,
    pump: Option<JoinHandle<()>>,
}

impl SpeechCaptureStream {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: &CaptureConfig) -> Self {
        Self {
            recognizer,
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            should_listen: Arc::new(AtomicBool::new(false)),
            session: 0,
            pump: None,
        }
    }

    /// Start listening, delivering events to `sink`.
    ///
    /// Returns `false` when no recognizer is available or it refuses to open
    /// a session. Starting an active stream is a no-op returning `true`.
    pub fn start(&mut self, sink: impl CaptureSink) -> bool {
        if self.is_active() {
            return true;
        }
        if !self.recognizer.is_available() {
            warn!("No speech recognizer available");
            return false;
        }

        self.session += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.recognizer.begin(tx.clone()) {
            warn!("Failed to open recognition session: {}", e);
            return false;
        }

        self.should_listen.store(true, Ordering::SeqCst);
        self.pump = Some(tokio::spawn(pump_events(
            Arc::clone(&self.recognizer),
            rx,
            tx,
            Arc::new(sink),
            Arc::clone(&self.should_listen),
            self.session,
            self.restart_delay,
        )));
        info!(session = self.session, "Speech capture started");
        true
    }

    /// Stop listening. Safe to call at any time.
    pub fn stop(&mut self) {
        self.should_listen.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            pump.abort();
            self.recognizer.end();
            debug!(session = self.session, "Speech capture stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.should_listen.load(Ordering::SeqCst)
            && self.pump.as_ref().is_some_and(|pump| !pump.is_finished())
    }

    /// Number of the most recently started session
    pub fn session(&self) -> u64 {
        self.session
    }
}

impl Drop for SpeechCaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pump_events(
    recognizer: Arc<dyn Recognizer>,
    mut rx: UnboundedReceiver<RecognizerEvent>,
    tx: UnboundedSender<RecognizerEvent>,
    sink: Arc<dyn CaptureSink>,
    should_listen: Arc<AtomicBool>,
    session: u64,
    restart_delay: Duration,
) {
    let fail = |message: String| {
        should_listen.store(false, Ordering::SeqCst);
        recognizer.end();
        sink.deliver(CaptureEvent {
            session,
            kind: CaptureEventKind::Failed(message),
        });
    };

    while let Some(event) = rx.recv().await {
        match event {
            RecognizerEvent::Transcript(transcript) => {
                let event = CaptureEvent {
                    session,
                    kind: CaptureEventKind::Transcript(transcript),
                };
                if !sink.deliver(event) {
                    break;
                }
            }

            RecognizerEvent::Error(kind) if kind.is_benign() => {
                debug!(session, "Ignoring benign recognition error: {}", kind);
            }

            RecognizerEvent::Error(kind) => {
                error!(session, "Recognition failed: {}", kind);
                fail(kind.to_string());
                break;
            }

            RecognizerEvent::SessionEnded => {
                if !should_listen.load(Ordering::SeqCst) {
                    break;
                }
                debug!(session, "Recognizer session timed out, restarting");
                tokio::time::sleep(restart_delay).await;
                if !should_listen.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = recognizer.begin(tx.clone()) {
                    error!(session, "Failed to restart recognition: {}", e);
                    fail(e.to_string());
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::console::ConsoleRecognizer;

    fn stream_with(recognizer: &Arc<ConsoleRecognizer>) -> SpeechCaptureStream {
        SpeechCaptureStream::new(recognizer.clone(), &CaptureConfig::default())
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_benign_errors() {
        assert!(RecognitionErrorKind::NoSpeech.is_benign());
        assert!(RecognitionErrorKind::Aborted.is_benign());
        assert!(!RecognitionErrorKind::Other("network".into()).is_benign());
        assert_eq!(RecognitionErrorKind::NoSpeech.to_string(), "no-speech");
    }

    #[tokio::test]
    async fn test_unavailable_backend_refuses_start() {
        let recognizer = Arc::new(ConsoleRecognizer::unavailable());
        let mut stream = stream_with(&recognizer);
        let (sink, _rx) = mpsc::unbounded_channel::<CaptureEvent>();

        assert!(!stream.start(sink));
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, _rx) = mpsc::unbounded_channel::<CaptureEvent>();

        assert!(stream.start(sink.clone()));
        assert!(stream.start(sink));
        assert_eq!(recognizer.sessions_started(), 1);
        assert_eq!(stream.session(), 1);
    }

    #[tokio::test]
    async fn test_transcripts_forwarded_with_session() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();
        stream.start(sink);

        recognizer.emit(RecognizerEvent::Transcript(TranscriptEvent::interim("hello")));
        settle().await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.session, 1);
        assert_eq!(
            event.kind,
            CaptureEventKind::Transcript(TranscriptEvent::interim("hello"))
        );
    }

    #[tokio::test]
    async fn test_benign_error_swallowed() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();
        stream.start(sink);

        recognizer.emit(RecognizerEvent::Error(RecognitionErrorKind::NoSpeech));
        recognizer.emit(RecognizerEvent::Error(RecognitionErrorKind::Aborted));
        settle().await;

        assert!(rx.try_recv().is_err());
        assert!(stream.is_active());
    }

    #[tokio::test]
    async fn test_fatal_error_stops_stream() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();
        stream.start(sink);

        recognizer.emit(RecognizerEvent::Error(RecognitionErrorKind::Other(
            "audio-capture".into(),
        )));
        settle().await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, CaptureEventKind::Failed("audio-capture".into()));
        assert!(!stream.is_active());
        assert!(!recognizer.has_session());
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_timeout_restarts() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, mut rx) = mpsc::unbounded_channel::<CaptureEvent>();
        stream.start(sink);

        recognizer.emit(RecognizerEvent::SessionEnded);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(recognizer.sessions_started(), 2);
        assert!(stream.is_active());

        recognizer.emit(RecognizerEvent::Transcript(TranscriptEvent::interim("still here")));
        settle().await;
        assert_eq!(rx.try_recv().unwrap().session, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_restart() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        let (sink, _rx) = mpsc::unbounded_channel::<CaptureEvent>();
        stream.start(sink);

        stream.stop();
        recognizer.emit(RecognizerEvent::SessionEnded);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(recognizer.sessions_started(), 1);
        assert!(!stream.is_active());
    }

    #[tokio::test]
    async fn test_stop_without_start_is_safe() {
        let recognizer = Arc::new(ConsoleRecognizer::new());
        let mut stream = stream_with(&recognizer);
        stream.stop();
        stream.stop();
        assert!(!stream.is_active());
    }
}
