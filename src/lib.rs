pub mod integration;
pub mod llm;
pub mod messages;
pub mod speech;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CoachError {
    #[error("Speech capture error: {0}")]
    Capture(String),

    #[error("Speech playback error: {0}")]
    Playback(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Microphone permission error: {0}")]
    Permission(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoachError {
    fn from(e: std::io::Error) -> Self {
        CoachError::Io(e.to_string())
    }
}

impl CoachError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The user can retry listening after a fatal recognizer error
            CoachError::Capture(_) => true,
            CoachError::Playback(_) => true,
            // Replaced by a canned reply, never fatal
            CoachError::Llm(_) => true,
            // Denial is retryable from the prompt
            CoachError::Permission(_) => true,
            CoachError::Config(_) => false,
            CoachError::Channel(_) => false,
            CoachError::Io(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            CoachError::Capture(_) => {
                "Speech recognition stopped. Tap the microphone to try again.".to_string()
            }
            CoachError::Playback(_) => "Could not play the response audio.".to_string(),
            CoachError::Llm(_) => "The coach could not be reached. Please try again.".to_string(),
            CoachError::Permission(_) => {
                "Microphone access is needed to talk with your coach. Please allow it and retry."
                    .to_string()
            }
            CoachError::Config(_) => "Configuration error. Please check settings.".to_string(),
            CoachError::Channel(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            CoachError::Io(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoachError>;
