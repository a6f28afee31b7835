use super::{MultimodalService, TextGenerationService};
use crate::credential::Credential;
use crate::models::{GenerationConfig, PromptPart};
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure a mock client should report instead of answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Provider,
    Auth,
    Empty,
}

impl MockFailure {
    fn to_error(self) -> Error {
        match self {
            MockFailure::Provider => Error::AiProvider("Mock provider failure".to_string()),
            MockFailure::Auth => Error::Auth("Mock rejected credential".to_string()),
            MockFailure::Empty => Error::EmptyResponse,
        }
    }
}

/// One recorded call to [`MockTextClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextCall {
    pub api_key: String,
    pub prompt: String,
    pub config: GenerationConfig,
}

#[derive(Clone, Default)]
pub struct MockTextClient {
    responses: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<TextCall>>>,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
}

impl MockTextClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: String) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<TextCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerationService for MockTextClient {
    async fn generate_text(
        &self,
        credential: &Credential,
        prompt: &str,
        config: GenerationConfig,
    ) -> Result<String> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(TextCall {
                api_key: credential.expose().to_string(),
                prompt: prompt.to_string(),
                config,
            });
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(format!("Mock itinerary for: {}", prompt))
        } else {
            Ok(responses[(count - 1) % responses.len()].clone())
        }
    }
}

#[derive(Clone, Default)]
pub struct MockVisionClient {
    responses: Arc<Mutex<Vec<String>>>,
    calls: Arc<Mutex<Vec<Vec<PromptPart>>>>,
    failure: Option<MockFailure>,
    delay: Option<Duration>,
}

impl MockVisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: String) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Parts received by each call, in call order.
    pub fn calls(&self) -> Vec<Vec<PromptPart>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MultimodalService for MockVisionClient {
    async fn generate_from_parts(
        &self,
        _credential: &Credential,
        parts: &[PromptPart],
    ) -> Result<String> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(parts.to_vec());
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.failure {
            return Err(failure.to_error());
        }

        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok("Mock description of the image".to_string())
        } else {
            Ok(responses[(count - 1) % responses.len()].clone())
        }
    }
}
