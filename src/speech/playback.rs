//! Speech playback driver
//!
//! Wraps a platform `Synthesizer` so that callers get a future that always
//! completes: synthesis failures are logged and reported as a normal end of
//! playback. Starting a new utterance cancels the one in flight, so at most
//! one utterance plays at a time.

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Platform text-to-speech adapter
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`, returning once playback finished or was cancelled
    async fn speak(&self, text: &str) -> Result<()>;

    /// Cancel the utterance in flight, if any
    fn cancel(&self);
}

/// Read-only view of whether the driver is currently speaking
#[derive(Clone, Debug)]
pub struct SpeakingIndicator(Arc<AtomicBool>);

impl SpeakingIndicator {
    pub fn is_speaking(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct SpeechPlaybackDriver {
    synthesizer: Arc<dyn Synthesizer>,
    speaking: Arc<AtomicBool>,
    utterance: Arc<AtomicU64>,
}

impl SpeechPlaybackDriver {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            synthesizer,
            speaking: Arc::new(AtomicBool::new(false)),
            utterance: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Speak `text` to completion. Never fails.
    pub async fn speak(&self, text: &str) {
        let id = self.utterance.fetch_add(1, Ordering::SeqCst) + 1;
        if self.speaking.swap(true, Ordering::SeqCst) {
            debug!("Cancelling utterance in flight");
            self.synthesizer.cancel();
        }

        if let Err(e) = self.synthesizer.speak(text).await {
            warn!("Speech synthesis failed, treating as finished: {}", e);
        }

        // A newer utterance owns the flag once it has started
        if self.utterance.load(Ordering::SeqCst) == id {
            self.speaking.store(false, Ordering::SeqCst);
        }
    }

    /// Stop any playback in progress
    pub fn cancel(&self) {
        self.utterance.fetch_add(1, Ordering::SeqCst);
        if self.speaking.swap(false, Ordering::SeqCst) {
            self.synthesizer.cancel();
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn indicator(&self) -> SpeakingIndicator {
        SpeakingIndicator(Arc::clone(&self.speaking))
    }
}
