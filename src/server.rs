//! HTTP surface: the page plus a small JSON API per session.

use crate::app::{App, CredentialView, ImageSummary, SessionView};
use crate::error::ErrorKind;
use crate::flow::FlowState;
use crate::image::payload_too_large;
use crate::models::ItineraryRequest;
use crate::{Error, Result};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

/// Room for multipart boundaries and headers on top of the image itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub type AppState = Arc<App>;

/// [`Error`] rendered as a JSON body with a matching status code.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Provider | ErrorKind::Network | ErrorKind::EmptyResponse => {
                StatusCode::BAD_GATEWAY
            }
            ErrorKind::Cancelled => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(json!({ "error": self.0.to_string(), "kind": kind })),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CredentialForm {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    pub question: Option<String>,
}

pub fn app_router(app: AppState) -> Router {
    let body_limit = app.max_upload_bytes() + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/defaults", get(defaults))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/credential", post(set_credential))
        .route("/api/sessions/{id}/itinerary", post(run_itinerary))
        .route(
            "/api/sessions/{id}/image",
            get(get_image).post(upload_image),
        )
        .route("/api/sessions/{id}/image/ask", post(ask_image))
        .route("/api/sessions/{id}/cancel", post(cancel))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

pub async fn run_server(app: AppState, host: &str, port: u16) -> Result<()> {
    let router = app_router(app);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn index() -> impl IntoResponse {
    Html(include_str!("../ui/index.html"))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "gemini-showcase" }))
}

async fn defaults() -> Json<ItineraryRequest> {
    Json(ItineraryRequest::default())
}

async fn create_session(State(app): State<AppState>) -> ApiResult<(StatusCode, Json<SessionView>)> {
    Ok((StatusCode::CREATED, Json(app.create_session()?)))
}

async fn get_session(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    Ok(Json(app.session(id)?))
}

async fn set_credential(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(form): Json<CredentialForm>,
) -> ApiResult<Json<CredentialView>> {
    Ok(Json(app.set_credential(id, form.api_key)?))
}

async fn run_itinerary(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ItineraryRequest>,
) -> ApiResult<Json<FlowState>> {
    Ok(Json(app.run_itinerary(id, request).await?))
}

async fn upload_image(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<ImageSummary>> {
    match read_upload(multipart, app.max_upload_bytes()).await {
        Ok((data, file_name)) => Ok(Json(app.upload_image(id, data, file_name).await?)),
        Err(e) => {
            app.discard_image(id)?;
            Err(ApiError(e))
        }
    }
}

/// Pull the `file` field out of an upload form.
async fn read_upload(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<(Vec<u8>, Option<String>)> {
    let rejected = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            payload_too_large(None, max_upload_bytes)
        } else {
            Error::Validation(format!("Malformed upload: {}", e))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(rejected)? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(rejected)?;
        return Ok((data.to_vec(), file_name));
    }

    Err(Error::Validation(
        "Upload is missing the 'file' field".to_string(),
    ))
}

async fn get_image(State(app): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Response> {
    Ok(match app.image(id)? {
        Some(image) => ([(header::CONTENT_TYPE, image.mime_type)], image.bytes).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

async fn ask_image(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<FlowState>> {
    // An empty body means "no question".
    let form: AskForm = if body.is_empty() {
        AskForm::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::Validation(format!("Malformed question: {}", e)))?
    };
    Ok(Json(app.ask_image(id, form.question).await?))
}

async fn cancel(State(app): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!({ "cancelled": app.cancel(id)? })))
}
