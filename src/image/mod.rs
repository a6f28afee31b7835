//! Uploaded image validation and normalisation
//!
//! Checks that an upload is a decodable JPEG or PNG within the configured
//! payload limit, and downscales oversized images before they are stored in
//! the session and sent to the multimodal model.

pub mod processor;

pub use processor::ImageProcessor;

use crate::models::PromptPart;
use crate::{Error, Result};
use async_trait::async_trait;

/// An accepted upload, ready to be shown back to the user and sent to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub resized: bool,
}

impl UploadedImage {
    pub fn to_part(&self) -> PromptPart {
        PromptPart::Image {
            mime_type: self.mime_type.to_string(),
            data: self.bytes.clone(),
        }
    }
}

/// Rejection for an upload over the byte limit. `size` is omitted when the
/// body was cut off before its length was known.
pub fn payload_too_large(size: Option<usize>, limit: usize) -> Error {
    match size {
        Some(size) => Error::Validation(format!(
            "Image is {} bytes; the limit is {} bytes",
            size, limit
        )),
        None => Error::Validation(format!(
            "Image is too large; the limit is {} bytes",
            limit
        )),
    }
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn prepare_upload(
        &self,
        image_data: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<UploadedImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_too_large_names_limit() {
        let err = payload_too_large(Some(2048), 1024);
        assert_eq!(
            err.to_string(),
            Error::Validation("Image is 2048 bytes; the limit is 1024 bytes".to_string()).to_string()
        );

        let err = payload_too_large(None, 1024);
        assert!(err.to_string().contains("the limit is 1024 bytes"));
    }
}
