use super::client::GeminiHttpClient;
use super::types::{Content, InlineData, Part};
use crate::ai::MultimodalService;
use crate::credential::Credential;
use crate::models::PromptPart;
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct VisionRequest {
    contents: Vec<Content>,
}

pub struct GeminiVisionClient {
    http: GeminiHttpClient,
}

impl GeminiVisionClient {
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

    fn to_part(part: &PromptPart) -> Part {
        match part {
            PromptPart::Text(text) => Part::Text { text: text.clone() },
            PromptPart::Image { mime_type, data } => Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(data),
                },
            },
        }
    }
}

#[async_trait]
impl MultimodalService for GeminiVisionClient {
    async fn generate_from_parts(
        &self,
        credential: &Credential,
        parts: &[PromptPart],
    ) -> Result<String> {
        if parts.is_empty() {
            return Err(Error::Invariant(
                "Multimodal request needs at least one part".to_string(),
            ));
        }

        tracing::debug!(
            "Sending {} part(s) to Gemini model {}",
            parts.len(),
            self.http.model()
        );

        let request = VisionRequest {
            contents: vec![Content::user(parts.iter().map(Self::to_part).collect())],
        };

        let response = self.http.generate_content(credential, &request).await?;

        response.text().ok_or_else(|| {
            tracing::warn!(
                "Gemini vision response had no text (finish reason: {:?})",
                response.finish_reason()
            );
            Error::EmptyResponse
        })
    }
}
