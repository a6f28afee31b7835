use super::client::GeminiHttpClient;
use super::types::{Content, Part};
use crate::ai::TextGenerationService;
use crate::credential::Credential;
use crate::models::GenerationConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TextRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: TextGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TextGenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

pub struct GeminiTextClient {
    http: GeminiHttpClient,
}

impl GeminiTextClient {
    pub fn new(model: String, timeout: Duration) -> Self {
        Self::new_with_client(model, timeout, reqwest::Client::new())
    }

    pub fn new_with_client(model: String, timeout: Duration, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(model, timeout, client),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }
}

#[async_trait]
impl TextGenerationService for GeminiTextClient {
    async fn generate_text(
        &self,
        credential: &Credential,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String> {
        let request = TextRequest {
            contents: vec![Content::user(vec![Part::Text {
                text: prompt.to_string(),
            }])],
            generation_config: TextGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        };

        let response = self.http.generate_content(credential, &request).await?;

        response.text().ok_or_else(|| {
            tracing::warn!(
                "Gemini text response had no text (finish reason: {:?})",
                response.finish_reason()
            );
            Error::EmptyResponse
        })
    }
}
