//! Image generation collaborator

use async_trait::async_trait;

use crate::error::Result;

/// A generated image, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: String,
    pub mime_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// `size` is a free-form hint such as "1024x1024"
    async fn generate(&self, prompt: &str, size: Option<&str>) -> Result<GeneratedImage>;
}
