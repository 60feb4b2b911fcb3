//! Turn latency tracking
//!
//! Keeps a sliding window of backend reply latencies and playback durations
//! so each turn can log how the conversation is pacing.

use std::collections::VecDeque;
use std::time::Duration;

/// Tracks timing samples over a sliding window
#[derive(Debug)]
pub struct TimingTracker {
    samples: VecDeque<Duration>,
    max_samples: usize,
}

impl TimingTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().max().copied().unwrap_or(Duration::ZERO)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

/// Per-conversation pacing statistics
#[derive(Debug)]
pub struct TurnMetrics {
    reply_latency: TimingTracker,
    playback: TimingTracker,
    turns: u64,
    fallbacks: u64,
}

impl Default for TurnMetrics {
    fn default() -> Self {
        Self::new(20)
    }
}

impl TurnMetrics {
    pub fn new(window: usize) -> Self {
        Self {
            reply_latency: TimingTracker::new(window),
            playback: TimingTracker::new(window),
            turns: 0,
            fallbacks: 0,
        }
    }

    /// Record how long the backend took to answer a turn
    pub fn record_reply(&mut self, latency: Duration, fallback: bool) {
        self.turns += 1;
        if fallback {
            self.fallbacks += 1;
        }
        self.reply_latency.record(latency);
    }

    pub fn record_playback(&mut self, duration: Duration) {
        self.playback.record(duration);
    }

    pub fn turns(&self) -> u64 {
        self.turns
    }

    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    pub fn reply_latency(&self) -> &TimingTracker {
        &self.reply_latency
    }

    pub fn summary(&self) -> String {
        format!(
            "turns: {} | fallbacks: {} | reply avg: {}ms max: {}ms | playback avg: {}ms",
            self.turns,
            self.fallbacks,
            self.reply_latency.average().as_millis(),
            self.reply_latency.max().as_millis(),
            self.playback.average().as_millis(),
        )
    }
}
