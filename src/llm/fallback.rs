use std::sync::atomic::{AtomicUsize, Ordering};

/// Spoken when the coach backend cannot produce a reply
pub const FALLBACK_REPLIES: [&str; 3] = [
    "I'm having a little trouble connecting right now, but I'm still here. Could you tell me a bit more about what's on your mind?",
    "Sorry, I lost my train of thought for a moment. What feels like the biggest challenge in your career right now?",
    "That's worth thinking about carefully. While I gather my thoughts, what would an ideal next step look like for you?",
];

/// Hands out fallback lines in rotation so consecutive failures don't repeat
#[derive(Debug, Default)]
pub struct FallbackReplies {
    next: AtomicUsize,
}

impl FallbackReplies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_reply(&self) -> &'static str {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        FALLBACK_REPLIES[index % FALLBACK_REPLIES.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation() {
        let replies = FallbackReplies::new();
        let first = replies.next_reply();
        let second = replies.next_reply();
        assert_ne!(first, second);
        replies.next_reply();
        assert_eq!(replies.next_reply(), first);
        assert!(FALLBACK_REPLIES.contains(&second));
    }
}
