//! Rolling conversation history sent to the coach backend
//!
//! The history is append-only: turns are added in chronological order and
//! only ever removed all at once by a reset. Clones share the same store, so
//! the orchestrator and any UI or settings layer observe the same turns.

use super::types::{ConversationTurn, Role};
use crate::llm::prompts::build_system_prompt;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct HistoryInner {
    system_prompt: String,
    turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    inner: Arc<RwLock<HistoryInner>>,
}

impl ConversationHistory {
    /// Create a history whose system prompt is the base instructions plus `custom_prompt`
    pub fn new(custom_prompt: &str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HistoryInner {
                system_prompt: build_system_prompt(custom_prompt),
                turns: Vec::new(),
            })),
        }
    }

    pub fn append_user_turn(&self, content: impl Into<String>) {
        self.push(ConversationTurn::user(content));
    }

    pub fn append_assistant_turn(&self, content: impl Into<String>) {
        self.push(ConversationTurn::assistant(content));
    }

    fn push(&self, turn: ConversationTurn) {
        let mut inner = self.inner.write();
        debug!(role = turn.role.as_str(), index = inner.turns.len(), "Appending turn");
        inner.turns.push(turn);
    }

    /// Drop every turn, keeping the system prompt
    pub fn reset(&self) {
        self.inner.write().turns.clear();
    }

    /// Replace the user-settable part of the system prompt.
    ///
    /// Changing the coach's instructions starts a fresh conversation.
    pub fn set_custom_prompt(&self, custom_prompt: &str) {
        let mut inner = self.inner.write();
        inner.system_prompt = build_system_prompt(custom_prompt);
        inner.turns.clear();
    }

    pub fn system_prompt(&self) -> String {
        self.inner.read().system_prompt.clone()
    }

    /// System prompt followed by the last `max_turns` turns
    pub fn context_window(&self, max_turns: usize) -> Vec<ConversationTurn> {
        let inner = self.inner.read();
        let start = inner.turns.len().saturating_sub(max_turns);
        let mut window = Vec::with_capacity(inner.turns.len() - start + 1);
        window.push(ConversationTurn::system(inner.system_prompt.clone()));
        window.extend(inner.turns[start..].iter().cloned());
        window
    }

    pub fn turns(&self) -> Vec<ConversationTurn> {
        self.inner.read().turns.clone()
    }

    pub fn count_role(&self, role: Role) -> usize {
        self.inner.read().turns.iter().filter(|t| t.role == role).count()
    }

    pub fn last_turn(&self) -> Option<ConversationTurn> {
        self.inner.read().turns.last().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().turns.is_empty()
    }

    /// Export turns to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.inner.read().turns)
    }

    /// Replace turns with the ones in `json`
    pub fn load_json(&self, json: &str) -> Result<(), serde_json::Error> {
        let turns: Vec<ConversationTurn> = serde_json::from_str(json)?;
        self.inner.write().turns = turns;
        Ok(())
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new("")
    }
}
