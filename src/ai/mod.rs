//! Generative model integration for the two flows
//!
//! Provides the text-generation and multimodal seams used by the itinerary
//! and image Q&A flows, with Gemini REST clients and in-memory mocks.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::{GeminiTextClient, GeminiVisionClient};
pub use mock::{MockTextClient, MockVisionClient};

use crate::credential::Credential;
use crate::models::{GenerationConfig, PromptPart};
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait TextGenerationService: Send + Sync {
    async fn generate_text(
        &self,
        credential: &Credential,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String>;
}

#[async_trait]
pub trait MultimodalService: Send + Sync {
    /// Send the parts in order and return the model's text answer.
    async fn generate_from_parts(
        &self,
        credential: &Credential,
        parts: &[PromptPart],
    ) -> Result<String>;
}
