//! Coach backend access
//!
//! This module provides:
//! - The `ChatBackend` seam and its HTTP implementation
//! - System prompt construction
//! - Canned replies used when the backend fails

pub mod client;
pub mod config;
pub mod fallback;
pub mod prompts;

pub use client::{ChatBackend, HttpChatClient};
pub use config::LlmConfig;
pub use fallback::FallbackReplies;
