//! Gemini showcase - a small web app around two Gemini use cases
//!
//! Generates travel itineraries from three form fields with a text model, and
//! answers questions about an uploaded image with a multimodal model.

pub mod ai;
pub mod app;
pub mod credential;
pub mod error;
pub mod flow;
pub mod image;
pub mod models;
pub mod prompts;
pub mod server;
pub mod session;

pub use error::{Error, Result};
