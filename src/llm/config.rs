//! Coach backend configuration

use serde::Deserialize;

/// Configuration for the chat backend
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chat endpoint accepting `{messages}` and returning `{text}`
    pub endpoint: String,

    /// Number of most recent turns sent with each request
    pub context_turns: usize,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8787/api/chat".to_string(),
            context_turns: 6,
            timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.context_turns = turns;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LlmConfig::default();
        assert_eq!(config.context_turns, 6);
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_builder_pattern() {
        let config = LlmConfig::new("https://coach.example/api/chat")
            .with_context_turns(4)
            .with_timeout_ms(5_000);
        assert_eq!(config.endpoint, "https://coach.example/api/chat");
        assert_eq!(config.context_turns, 4);
        assert_eq!(config.timeout_ms, 5_000);
    }
}
