//! Configuration for the integration layer
//!
//! Provides centralized configuration for all components, loadable from TOML.

use crate::llm::config::LlmConfig;
use crate::speech::capture::CaptureConfig;
use crate::speech::finalize::FinalizationConfig;
use crate::{CoachError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Turn-taking tuning
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Utterance boundary detection
    #[serde(flatten)]
    pub finalization: FinalizationConfig,

    /// Settle time between the end of playback and resuming capture
    pub resume_delay_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            finalization: FinalizationConfig::default(),
            resume_delay_ms: 1000,
        }
    }
}

impl TurnConfig {
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }
}

/// User-settable part of the system prompt
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub custom: String,
}

/// Configuration for the complete coach
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    pub turn: TurnConfig,
    pub capture: CaptureConfig,
    pub llm: LlmConfig,
    pub prompt: PromptConfig,
}

impl CoachConfig {
    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            CoachError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
            .map_err(|e| CoachError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CoachConfig =
            toml::from_str(content).map_err(|e| CoachError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Default location: `<config dir>/coach/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("coach").join("config.toml"))
    }

    pub fn with_finalization(mut self, finalization: FinalizationConfig) -> Self {
        self.turn.finalization = finalization;
        self
    }

    pub fn with_resume_delay_ms(mut self, ms: u64) -> Self {
        self.turn.resume_delay_ms = ms;
        self
    }

    pub fn with_llm(mut self, llm: LlmConfig) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt.custom = prompt.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let finalization = &self.turn.finalization;
        if finalization.silence_window_ms == 0 {
            return Err(CoachError::Config("silence_window_ms must be positive".into()));
        }
        if finalization.sentence_min_words == 0 || finalization.max_words == 0 {
            return Err(CoachError::Config("word thresholds must be positive".into()));
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err(CoachError::Config("llm.endpoint is required".into()));
        }
        if self.llm.context_turns == 0 {
            return Err(CoachError::Config("llm.context_turns must be positive".into()));
        }
        Ok(())
    }
}
