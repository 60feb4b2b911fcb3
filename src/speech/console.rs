//! Terminal adapters for the speech seams
//!
//! Typed lines stand in for dictation and printed lines for synthesized
//! speech, so the whole turn-taking engine can run without audio devices.

use crate::speech::capture::{Recognizer, RecognizerEvent, TranscriptEvent};
use crate::speech::playback::Synthesizer;
use crate::{CoachError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tracing::debug;

/// Recognizer fed from typed text
pub struct ConsoleRecognizer {
    available: bool,
    session: Mutex<Option<UnboundedSender<RecognizerEvent>>>,
    sessions_started: AtomicUsize,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self {
            available: true,
            session: Mutex::new(None),
            sessions_started: AtomicUsize::new(0),
        }
    }

    /// A recognizer reporting that no backend exists
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Deliver a raw event to the open session; returns false when none is open
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        match self.session.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Emit `line` as growing interim results followed by a final result
    pub fn dictate(&self, line: &str) -> bool {
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.is_empty() {
            return false;
        }
        for end in 1..words.len() {
            let interim = TranscriptEvent::interim(words[..end].join(" "));
            if !self.emit(RecognizerEvent::Transcript(interim)) {
                return false;
            }
        }
        self.emit(RecognizerEvent::Transcript(
            TranscriptEvent::final_result(words.join(" ")).with_confidence(1.0),
        ))
    }

    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn sessions_started(&self) -> usize {
        self.sessions_started.load(Ordering::SeqCst)
    }
}

impl Default for ConsoleRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for ConsoleRecognizer {
    fn is_available(&self) -> bool {
        self.available
    }

    fn begin(&self, events: UnboundedSender<RecognizerEvent>) -> Result<()> {
        if !self.available {
            return Err(CoachError::Capture("Console recognizer disabled".into()));
        }
        *self.session.lock() = Some(events);
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn end(&self) {
        self.session.lock().take();
    }
}

/// Synthesizer that prints replies and holds the output for a reading-speed delay
pub struct ConsoleSynthesizer {
    per_word: Duration,
    cancel: Notify,
}

impl ConsoleSynthesizer {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            cancel: Notify::new(),
        }
    }
}

impl Default for ConsoleSynthesizer {
    fn default() -> Self {
        Self::new(Duration::from_millis(120))
    }
}

#[async_trait]
impl Synthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str) -> Result<()> {
        println!("coach> {}", text);

        let words = text.split_whitespace().count() as u32;
        tokio::select! {
            _ = tokio::time::sleep(self.per_word * words) => {}
            _ = self.cancel.notified() => {
                debug!("Console playback cancelled");
            }
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancel.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_dictate_without_session() {
        let recognizer = ConsoleRecognizer::new();
        assert!(!recognizer.dictate("hello there"));
    }

    #[test]
    fn test_dictate_emits_interim_then_final() {
        let recognizer = ConsoleRecognizer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        recognizer.begin(tx).unwrap();

        assert!(recognizer.dictate("I like  design"));

        let mut events = Vec::new();
        while let Ok(RecognizerEvent::Transcript(t)) = rx.try_recv() {
            events.push(t);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], TranscriptEvent::interim("I like"));
        assert!(events[2].is_final);
        assert_eq!(events[2].text, "I like design");
    }

    #[test]
    fn test_end_closes_session() {
        let recognizer = ConsoleRecognizer::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        recognizer.begin(tx).unwrap();
        recognizer.end();
        recognizer.end();
        assert!(!recognizer.has_session());
        assert_eq!(recognizer.sessions_started(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesizer_cancel_ends_speech() {
        let synth = std::sync::Arc::new(ConsoleSynthesizer::new(Duration::from_secs(10)));
        let speaking = tokio::spawn({
            let synth = synth.clone();
            async move { synth.speak("a long answer").await }
        });

        tokio::task::yield_now().await;
        synth.cancel();
        let started = tokio::time::Instant::now();
        assert!(speaking.await.unwrap().is_ok());
        assert!(started.elapsed() < Duration::from_secs(30));
    }
}
