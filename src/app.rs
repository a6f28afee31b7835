//! Application wiring: model clients, image processing, and session state.

use crate::ai::{GeminiTextClient, GeminiVisionClient, MultimodalService, TextGenerationService};
use crate::credential::{self, Credential, CredentialSource, CredentialStatus, ResolvedCredential};
use crate::flow::{self, CallGuard, FlowState};
use crate::image::{ImageProcessor, ImageService, UploadedImage};
use crate::models::{Config, FlowOutput, ItineraryRequest};
use crate::session::{FlowKind, Session, SessionStore};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Serves both flows for every session.
pub struct App {
    text: Arc<dyn TextGenerationService>,
    vision: Arc<dyn MultimodalService>,
    image: Arc<dyn ImageService>,
    sessions: SessionStore,
    secret: Option<Credential>,
    request_timeout: Duration,
    max_upload_bytes: usize,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub text: Arc<dyn TextGenerationService>,
    pub vision: Arc<dyn MultimodalService>,
    pub image: Arc<dyn ImageService>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialView {
    pub status: CredentialStatus,
    pub source: CredentialSource,
    pub message: &'static str,
}

impl From<&ResolvedCredential> for CredentialView {
    fn from(resolved: &ResolvedCredential) -> Self {
        Self {
            status: resolved.status,
            source: resolved.source,
            message: resolved.status.message(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSummary {
    pub file_name: Option<String>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub resized: bool,
}

impl From<&UploadedImage> for ImageSummary {
    fn from(image: &UploadedImage) -> Self {
        Self {
            file_name: image.file_name.clone(),
            mime_type: image.mime_type,
            width: image.width,
            height: image.height,
            size_bytes: image.bytes.len(),
            resized: image.resized,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub credential: CredentialView,
    pub busy: bool,
    pub itinerary: FlowState,
    pub image: Option<ImageSummary>,
    pub image_answer: FlowState,
}

impl App {
    /// Build an app from concrete service dependencies.
    ///
    /// This is primarily useful for integration tests and local harnesses that
    /// need to inject mocks.
    pub fn with_services(
        services: AppServices,
        secret: Option<Credential>,
        request_timeout: Duration,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            text: services.text,
            vision: services.vision,
            image: services.image,
            sessions: SessionStore::default(),
            secret,
            request_timeout,
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        // Reuse one HTTP connection pool across both model clients.
        let http_client = reqwest::Client::new();

        info!("Text model: {}", config.text_model);
        let text = GeminiTextClient::new_with_client(
            config.text_model.clone(),
            config.request_timeout,
            http_client.clone(),
        )
        .with_base_url(config.gemini_base_url.clone());

        info!("Vision model: {}", config.vision_model);
        let vision = GeminiVisionClient::new_with_client(
            config.vision_model.clone(),
            config.request_timeout,
            http_client,
        )
        .with_base_url(config.gemini_base_url.clone());

        let secret = config.google_api_key.clone().map(Credential::new);
        if secret.is_some() {
            info!("API key loaded from environment");
        } else {
            warn!("GOOGLE_API_KEY not set; users must enter a key in the sidebar");
        }

        Self::with_services(
            AppServices {
                text: Arc::new(text),
                vision: Arc::new(vision),
                image: Arc::new(ImageProcessor::new(
                    config.max_image_bytes,
                    config.max_image_dimension,
                )),
            },
            secret,
            config.request_timeout,
            config.max_image_bytes,
        )
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    fn resolve_credential(&self, session: &Session) -> ResolvedCredential {
        credential::resolve(self.secret.as_ref(), session.entered_key.as_deref())
    }

    fn view(&self, session: &Session) -> SessionView {
        SessionView {
            id: session.id,
            credential: CredentialView::from(&self.resolve_credential(session)),
            busy: session.is_busy(),
            itinerary: session.itinerary.clone(),
            image: session.image.as_ref().map(ImageSummary::from),
            image_answer: session.image_answer.clone(),
        }
    }

    pub fn create_session(&self) -> Result<SessionView> {
        let session = self.sessions.create()?;
        info!("Created session {}", session.id);
        Ok(self.view(&session))
    }

    pub fn session(&self, id: Uuid) -> Result<SessionView> {
        Ok(self.view(&self.sessions.get(id)?))
    }

    pub fn set_credential(&self, id: Uuid, key: String) -> Result<CredentialView> {
        self.sessions.set_entered_key(id, key.trim().to_string())?;
        let session = self.sessions.get(id)?;
        let resolved = self.resolve_credential(&session);
        if resolved.status == CredentialStatus::Warning {
            warn!("Session {} has no usable API key", id);
        }
        Ok(CredentialView::from(&resolved))
    }

    /// Run the itinerary flow. Model failures come back as
    /// [`FlowState::Failed`]; only an unknown session is an `Err`.
    ///
    /// If the returned future is dropped mid-call, the flow is recorded as
    /// cancelled and the session accepts new requests.
    pub async fn run_itinerary(&self, id: Uuid, request: ItineraryRequest) -> Result<FlowState> {
        let active = match self.sessions.begin_flow(id, FlowKind::Itinerary) {
            Ok(active) => active,
            Err(e @ (Error::Busy | Error::Validation(_))) => return Ok(FlowState::failed(&e)),
            Err(e) => return Err(e),
        };

        let credential = self.resolve_credential(active.session()).credential;
        let guard = CallGuard {
            timeout: self.request_timeout,
            cancel: active.cancel_token().clone(),
        };

        let result =
            flow::generate_itinerary(self.text.as_ref(), &credential, &request, &guard).await;
        if let Err(e) = &result {
            warn!("Itinerary flow failed for session {}: {}", id, e);
        }

        let state = FlowState::from_result(result.map(FlowOutput::Itinerary));
        active.finish(state.clone())?;
        Ok(state)
    }

    /// Validate and store an upload. A rejected upload also clears the
    /// previous image so later questions cannot target it.
    pub async fn upload_image(
        &self,
        id: Uuid,
        data: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<ImageSummary> {
        // Fail fast on unknown sessions before decoding anything.
        self.sessions.get(id)?;

        let image = match self.image.prepare_upload(data, file_name).await {
            Ok(image) => image,
            Err(e) => {
                self.discard_image(id)?;
                return Err(e);
            }
        };
        let summary = ImageSummary::from(&image);
        self.sessions.store_image(id, image)?;
        info!(
            "Session {} uploaded {} ({}x{})",
            id, summary.mime_type, summary.width, summary.height
        );
        Ok(summary)
    }

    /// Forget the session's image and answer after a failed upload attempt.
    pub fn discard_image(&self, id: Uuid) -> Result<()> {
        self.sessions.clear_image(id)?;
        info!("Session {} upload rejected; previous image cleared", id);
        Ok(())
    }

    pub fn image(&self, id: Uuid) -> Result<Option<UploadedImage>> {
        Ok(self.sessions.get(id)?.image)
    }

    /// Run the image Q&A flow against the session's current upload.
    pub async fn ask_image(&self, id: Uuid, question: Option<String>) -> Result<FlowState> {
        let active = match self.sessions.begin_flow(id, FlowKind::ImageAnswer) {
            Ok(active) => active,
            Err(e @ (Error::Busy | Error::Validation(_))) => return Ok(FlowState::failed(&e)),
            Err(e) => return Err(e),
        };
        let Some(image) = active.session().image.clone() else {
            return Err(Error::Invariant(
                "Image flow started without an image".to_string(),
            ));
        };

        let credential = self.resolve_credential(active.session()).credential;
        let guard = CallGuard {
            timeout: self.request_timeout,
            cancel: active.cancel_token().clone(),
        };

        let result = flow::answer_image_question(
            self.vision.as_ref(),
            &credential,
            question.as_deref(),
            &image,
            &guard,
        )
        .await;
        if let Err(e) = &result {
            warn!("Image flow failed for session {}: {}", id, e);
        }

        let state = FlowState::from_result(result.map(FlowOutput::ImageAnswer));
        if active.finish(state.clone())? {
            Ok(state)
        } else {
            // The image changed underneath us; the answer no longer applies.
            Ok(FlowState::failed(&Error::Cancelled))
        }
    }

    pub fn cancel(&self, id: Uuid) -> Result<bool> {
        let cancelled = self.sessions.cancel(id)?;
        if cancelled {
            info!("Cancelled running flow for session {}", id);
        }
        Ok(cancelled)
    }
}
