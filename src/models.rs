//! Data models and structures
//!
//! Defines the per-request values exchanged between the web layer, the two
//! flows, and the model clients, plus runtime configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DESTINATION: &str = "United Arab Emirates";
pub const DEFAULT_DAYS: &str = "5";
pub const DEFAULT_ATTRACTION: &str = "Visiting Burj Khalifa in Dubai";

/// Raw itinerary form fields, exactly as the user typed them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ItineraryRequest {
    pub destination: String,
    pub days: String,
    pub attraction: String,
}

impl Default for ItineraryRequest {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            days: DEFAULT_DAYS.to_string(),
            attraction: DEFAULT_ATTRACTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItineraryOutput {
    pub prompt: String,
    pub itinerary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ImageAnswer {
    pub question: Option<String>,
    pub answer: String,
}

/// Output of a successful flow, tagged by which flow produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum FlowOutput {
    Itinerary(ItineraryOutput),
    ImageAnswer(ImageAnswer),
}

/// Decoding parameters for the text model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub const ITINERARY: GenerationConfig = GenerationConfig {
        temperature: 0.8,
        max_output_tokens: 2048,
    };
}

/// One ordered input part of a multimodal request.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image { mime_type: String, data: Vec<u8> },
}

impl PromptPart {
    pub fn is_text(&self) -> bool {
        matches!(self, PromptPart::Text(_))
    }
}

// Configuration
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_VISION_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub text_model: String,
    pub vision_model: String,
    pub gemini_base_url: String,
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
    pub max_image_bytes: usize,
    pub max_image_dimension: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            host: "127.0.0.1".to_string(),
            port: 8501,
            request_timeout: Duration::from_secs(60),
            max_image_bytes: 10 * 1024 * 1024,
            max_image_dimension: 3072,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            google_api_key: non_empty("GOOGLE_API_KEY"),
            text_model: non_empty("TEXT_MODEL").unwrap_or(defaults.text_model),
            vision_model: non_empty("VISION_MODEL").unwrap_or(defaults.vision_model),
            gemini_base_url: non_empty("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.gemini_base_url),
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT", non_empty("PORT"))?.unwrap_or(defaults.port),
            request_timeout: parse_var("REQUEST_TIMEOUT_SECS", non_empty("REQUEST_TIMEOUT_SECS"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_image_bytes: parse_var("MAX_IMAGE_BYTES", non_empty("MAX_IMAGE_BYTES"))?
                .unwrap_or(defaults.max_image_bytes),
            max_image_dimension: parse_var(
                "MAX_IMAGE_DIMENSION",
                non_empty("MAX_IMAGE_DIMENSION"),
            )?
            .unwrap_or(defaults.max_image_dimension),
        })
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw)))
        })
        .transpose()
}
