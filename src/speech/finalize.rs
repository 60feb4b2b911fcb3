//! Utterance finalization policy
//!
//! Speech backends mark results as final inconsistently, so the boundary of a
//! user utterance is recovered from the interim stream itself:
//!
//! 1. A backend-final result finalizes immediately.
//! 2. Blank interim results are ignored.
//! 3. An interim result ending a sentence (`.`, `!`, `?`) with enough words
//!    finalizes immediately.
//! 4. An interim result that is long enough finalizes immediately.
//! 5. Otherwise the text becomes pending and a silence timer is re-armed.
//!    When the timer fires it finalizes the pending text, but only if no newer
//!    result arrived and the full window has elapsed since the last update.
//!
//! Every finalize path clears the state, so the same content is never
//! finalized twice.

use crate::speech::capture::TranscriptEvent;
use serde::Deserialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Tuning for utterance boundary detection
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FinalizationConfig {
    /// Silence after the last interim result before it is finalized
    pub silence_window_ms: u64,

    /// Minimum words for the sentence-end heuristic
    pub sentence_min_words: usize,

    /// Word count at which an interim result is finalized regardless of punctuation
    pub max_words: usize,
}

impl Default for FinalizationConfig {
    fn default() -> Self {
        Self {
            silence_window_ms: 3000,
            sentence_min_words: 5,
            max_words: 50,
        }
    }
}

impl FinalizationConfig {
    pub fn silence_window(&self) -> Duration {
        Duration::from_millis(self.silence_window_ms)
    }

    pub fn with_silence_window_ms(mut self, ms: u64) -> Self {
        self.silence_window_ms = ms;
        self
    }

    pub fn with_sentence_min_words(mut self, words: usize) -> Self {
        self.sentence_min_words = words;
        self
    }

    pub fn with_max_words(mut self, words: usize) -> Self {
        self.max_words = words;
        self
    }
}

/// Armed silence timer; aborts its task when dropped
#[derive(Debug)]
pub struct SilenceTimer {
    handle: JoinHandle<()>,
}

impl Drop for SilenceTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One in-progress user utterance
#[derive(Debug, Default)]
pub struct UtteranceState {
    pending_text: String,
    last_update: Option<Instant>,
    generation: u64,
    timer: Option<SilenceTimer>,
}

impl UtteranceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_text(&self) -> &str {
        &self.pending_text
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    pub fn has_armed_timer(&self) -> bool {
        self.timer.is_some()
    }

    /// Store a freshly spawned timer, cancelling any previous one first
    pub fn arm(&mut self, timer: SilenceTimer) {
        self.timer.take();
        self.timer = Some(timer);
    }

    /// Discard pending text and cancel the timer.
    ///
    /// Bumping the generation also invalidates a timer that already fired
    /// but whose notification has not been handled yet.
    pub fn clear(&mut self) {
        self.pending_text.clear();
        self.last_update = None;
        self.timer.take();
        self.generation += 1;
    }
}

/// Request to arm a silence timer for the current pending text
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArmRequest {
    pub generation: u64,
    pub text: String,
    pub window: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The utterance is complete
    Finalize(String),
    /// Keep listening; the caller must arm a silence timer
    Continue(ArmRequest),
    /// Nothing to do
    Ignore,
}

#[derive(Clone, Debug, Default)]
pub struct FinalizationPolicy {
    config: FinalizationConfig,
}

impl FinalizationPolicy {
    pub fn new(config: FinalizationConfig) -> Self {
        Self { config }
    }

    /// Decide what a transcript event means for the current utterance
    pub fn on_transcript(
        &self,
        event: &TranscriptEvent,
        state: &mut UtteranceState,
        now: Instant,
    ) -> Decision {
        if event.is_final {
            state.clear();
            let text = event.text.trim();
            if text.is_empty() {
                debug!("Ignoring blank final result");
                return Decision::Ignore;
            }
            return Decision::Finalize(text.to_string());
        }

        let text = event.text.trim();
        if text.is_empty() {
            return Decision::Ignore;
        }

        let words = word_count(text);
        if ends_sentence(text) && words >= self.config.sentence_min_words {
            debug!(words, "Sentence end detected, finalizing early");
            state.clear();
            return Decision::Finalize(text.to_string());
        }
        if words >= self.config.max_words {
            debug!(words, "Utterance length limit reached, finalizing early");
            state.clear();
            return Decision::Finalize(text.to_string());
        }

        state.timer.take();
        state.generation += 1;
        state.pending_text = text.to_string();
        state.last_update = Some(now);

        Decision::Continue(ArmRequest {
            generation: state.generation,
            text: state.pending_text.clone(),
            window: self.config.silence_window(),
        })
    }

    /// Decide whether a fired silence timer finalizes its saved text
    pub fn on_silence(
        &self,
        state: &mut UtteranceState,
        generation: u64,
        saved_text: &str,
        now: Instant,
    ) -> Option<String> {
        if generation != state.generation {
            debug!(generation, current = state.generation, "Ignoring stale silence timer");
            return None;
        }
        if saved_text.trim().is_empty() {
            return None;
        }
        let last_update = state.last_update?;
        if now.saturating_duration_since(last_update) < self.config.silence_window() {
            debug!("Silence timer fired before the full window elapsed");
            return None;
        }

        state.clear();
        Some(saved_text.trim().to_string())
    }
}

/// Spawn a timer that calls `on_fire(generation, text)` after the window elapses
pub fn spawn_silence_timer<F>(request: ArmRequest, on_fire: F) -> SilenceTimer
where
    F: FnOnce(u64, String) + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(request.window).await;
        on_fire(request.generation, request.text);
    });
    SilenceTimer { handle }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?'])
}
