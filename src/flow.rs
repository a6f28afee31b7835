//! The two user-triggered flows and their observable state.
//!
//! Each flow is a single guarded call to a model: the call runs under a
//! timeout and a cancellation token, and any failure is folded into a
//! [`FlowState::Failed`] value instead of escaping to the web layer.

use crate::ai::{MultimodalService, TextGenerationService};
use crate::credential::Credential;
use crate::error::ErrorKind;
use crate::image::UploadedImage;
use crate::models::{
    FlowOutput, GenerationConfig, ImageAnswer, ItineraryOutput, ItineraryRequest, PromptPart,
};
use crate::prompts;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Pending {
        started_at: DateTime<Utc>,
    },
    Succeeded {
        output: FlowOutput,
        completed_at: DateTime<Utc>,
    },
    Failed {
        kind: ErrorKind,
        message: String,
        completed_at: DateTime<Utc>,
    },
}

impl FlowState {
    pub fn pending() -> Self {
        FlowState::Pending {
            started_at: Utc::now(),
        }
    }

    pub fn failed(error: &Error) -> Self {
        FlowState::Failed {
            kind: error.kind(),
            message: error.to_string(),
            completed_at: Utc::now(),
        }
    }

    pub fn from_result(result: Result<FlowOutput>) -> Self {
        match result {
            Ok(output) => FlowState::Succeeded {
                output,
                completed_at: Utc::now(),
            },
            Err(e) => Self::failed(&e),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, FlowState::Pending { .. })
    }
}

/// Timeout and cancellation applied to one outbound model call.
#[derive(Debug, Clone)]
pub struct CallGuard {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl CallGuard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn run<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => {
                outcome.map_err(|_| Error::Timeout(self.timeout.as_secs()))?
            }
        }
    }
}

pub async fn generate_itinerary(
    service: &dyn TextGenerationService,
    credential: &Credential,
    request: &ItineraryRequest,
    guard: &CallGuard,
) -> Result<ItineraryOutput> {
    let validated = prompts::validate_itinerary(request)?;
    let prompt = validated.prompt();

    tracing::info!(
        "Generating {}-day itinerary for {}",
        validated.days,
        validated.destination
    );

    let itinerary = guard
        .run(service.generate_text(credential, &prompt, GenerationConfig::ITINERARY))
        .await?;

    Ok(ItineraryOutput { prompt, itinerary })
}

/// Parts for an image question: `[text, image]` when a question was asked,
/// otherwise just `[image]`.
pub fn image_question_parts(question: Option<&str>, image: &UploadedImage) -> Vec<PromptPart> {
    match question.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => vec![PromptPart::Text(q.to_string()), image.to_part()],
        None => vec![image.to_part()],
    }
}

pub async fn answer_image_question(
    service: &dyn MultimodalService,
    credential: &Credential,
    question: Option<&str>,
    image: &UploadedImage,
    guard: &CallGuard,
) -> Result<ImageAnswer> {
    let parts = image_question_parts(question, image);
    let question = parts.iter().find_map(|p| match p {
        PromptPart::Text(text) => Some(text.clone()),
        PromptPart::Image { .. } => None,
    });

    tracing::info!(
        "Asking multimodal model about {}x{} image (question: {})",
        image.width,
        image.height,
        question.is_some()
    );

    let answer = guard
        .run(service.generate_from_parts(credential, &parts))
        .await?;

    Ok(ImageAnswer { question, answer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::{MockFailure, MockTextClient, MockVisionClient};
    use pretty_assertions::assert_eq;

    fn sample_image() -> UploadedImage {
        UploadedImage {
            file_name: Some("cat.png".to_string()),
            mime_type: "image/png",
            bytes: vec![0x89, 0x50, 0x4E, 0x47],
            width: 4,
            height: 4,
            resized: false,
        }
    }

    #[tokio::test]
    async fn test_itinerary_issues_one_call_with_fixed_config() {
        let client = MockTextClient::new().with_response("Day 1: Dubai Mall".to_string());
        let guard = CallGuard::new(Duration::from_secs(5));

        let output = generate_itinerary(
            &client,
            &Credential::new("AIzaKey"),
            &ItineraryRequest::default(),
            &guard,
        )
        .await
        .unwrap();

        assert_eq!(output.itinerary, "Day 1: Dubai Mall");
        assert_eq!(
            output.prompt,
            "Come up with a 5-day itinerary for a trip to United Arab Emirates. \
             The first suggested attraction should be Visiting Burj Khalifa in Dubai."
        );

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].config.temperature, 0.8);
        assert_eq!(calls[0].config.max_output_tokens, 2048);
        assert_eq!(calls[0].api_key, "AIzaKey");
        assert_eq!(calls[0].prompt, output.prompt);
    }

    #[tokio::test]
    async fn test_invalid_itinerary_never_calls_model() {
        let client = MockTextClient::new();
        let request = ItineraryRequest {
            days: "a week".to_string(),
            ..Default::default()
        };

        let err = generate_itinerary(
            &client,
            &Credential::new("AIza"),
            &request,
            &CallGuard::new(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(client.get_call_count(), 0);
    }

    #[test]
    fn test_parts_without_question_are_image_only() {
        let image = sample_image();
        for question in [None, Some(""), Some("   ")] {
            let parts = image_question_parts(question, &image);
            assert_eq!(parts.len(), 1);
            assert!(!parts[0].is_text());
        }
    }

    #[test]
    fn test_parts_with_question_put_text_first() {
        let parts = image_question_parts(Some(" What breed? "), &sample_image());
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], PromptPart::Text("What breed?".to_string()));
        assert!(!parts[1].is_text());
    }

    #[tokio::test]
    async fn test_answer_image_question_returns_model_text() {
        let client = MockVisionClient::new().with_response("A tabby cat".to_string());

        let answer = answer_image_question(
            &client,
            &Credential::new("AIza"),
            Some("What is this?"),
            &sample_image(),
            &CallGuard::new(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        assert_eq!(answer.answer, "A tabby cat");
        assert_eq!(answer.question.as_deref(), Some("What is this?"));
        assert_eq!(client.calls()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_failed_state() {
        let client = MockVisionClient::new().with_failure(MockFailure::Provider);

        let result = answer_image_question(
            &client,
            &Credential::new("AIza"),
            None,
            &sample_image(),
            &CallGuard::new(Duration::from_secs(5)),
        )
        .await
        .map(FlowOutput::ImageAnswer);

        match FlowState::from_result(result) {
            FlowState::Failed { kind, message, .. } => {
                assert_eq!(kind, ErrorKind::Provider);
                assert!(message.contains("Mock provider failure"));
            }
            other => panic!("expected failed state, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let client = MockTextClient::new().with_delay(Duration::from_secs(120));

        let err = generate_itinerary(
            &client,
            &Credential::new("AIza"),
            &ItineraryRequest::default(),
            &CallGuard::new(Duration::from_secs(30)),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout(30)));
    }

    #[tokio::test]
    async fn test_cancelled_call_reports_cancelled() {
        let client = MockTextClient::new().with_delay(Duration::from_secs(60));
        let guard = CallGuard::new(Duration::from_secs(120));
        guard.cancel.cancel();

        let err = generate_itinerary(
            &client,
            &Credential::new("AIza"),
            &ItineraryRequest::default(),
            &guard,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}
