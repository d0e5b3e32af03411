use async_trait::async_trait;

pub mod openai_vision;
pub mod types;
pub use types::*;

/// Trait for vision providers.
/// One call per capture; retrying is left to the caller.
#[async_trait]
pub trait VisionQuery: Send + Sync {
    /// Send one encoded frame and return the extracted answer text.
    async fn query(&self, image: &EncodedImage, credential: &Credential)
        -> Result<String, QueryError>;

    /// Provider name for logging/display
    fn name(&self) -> &str;
}
