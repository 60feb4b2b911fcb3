//! Integration layer wiring the speech, coach and history components together

pub mod config;
pub mod orchestrator;
pub mod state;

pub use config::{CoachConfig, PromptConfig, TurnConfig};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorBuilder, OrchestratorHandle};
pub use state::{
    OnboardingStep, OrchestratorCommand, OrchestratorEvent, SharedTurnState, TurnSnapshot,
    TurnState,
};
