use async_trait::async_trait;

/// Microphone permission backend
#[async_trait]
pub trait MicPermission: Send + Sync {
    /// Ask for microphone access; may show a system dialog
    async fn request(&self) -> bool;
}

/// Permission backend for platforms without a permission model
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGrant;

#[async_trait]
impl MicPermission for AlwaysGrant {
    async fn request(&self) -> bool {
        true
    }
}
