pub mod extractor;
pub mod orchestrator;
pub mod prompts;

#[cfg(feature = "gemini")]
pub mod client;
#[cfg(feature = "gemini")]
pub mod types;

pub use extractor::*;
pub use orchestrator::*;

#[cfg(feature = "gemini")]
pub use client::GeminiClient;

use crate::config::GenerationSettings;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The model capability: prompt in, raw text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn model(&self) -> &str {
        (**self).model()
    }

    async fn generate(&self, prompt: &str, settings: &GenerationSettings) -> Result<String> {
        (**self).generate(prompt, settings).await
    }
}
