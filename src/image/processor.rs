use super::{payload_too_large, ImageService, UploadedImage};
use crate::ai::mime::{detect_upload_format, mime_for};
use crate::{Error, Result};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

pub struct ImageProcessor {
    max_bytes: usize,
    max_dimension: u32,
}

impl ImageProcessor {
    pub fn new(max_bytes: usize, max_dimension: u32) -> Self {
        Self {
            max_bytes,
            max_dimension,
        }
    }

    fn normalize_sync(
        data: Vec<u8>,
        format: ImageFormat,
        max_dimension: u32,
    ) -> Result<(Vec<u8>, u32, u32, bool)> {
        let img = ImageReader::with_format(Cursor::new(&data), format).decode()?;
        let (width, height) = img.dimensions();

        if width.max(height) <= max_dimension {
            return Ok((data, width, height, false));
        }

        let resized = img.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Lanczos3,
        );
        let (new_width, new_height) = resized.dimensions();
        let bytes = Self::encode(resized, format)?;
        Ok((bytes, new_width, new_height, true))
    }

    fn encode(img: DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
        // JPEG has no alpha channel.
        let img = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.into_rgb8()),
            _ => img,
        };
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format)?;
        Ok(bytes)
    }
}

#[async_trait]
impl ImageService for ImageProcessor {
    async fn prepare_upload(
        &self,
        image_data: Vec<u8>,
        file_name: Option<String>,
    ) -> Result<UploadedImage> {
        if image_data.is_empty() {
            return Err(Error::Validation("Uploaded file is empty".to_string()));
        }
        if image_data.len() > self.max_bytes {
            return Err(payload_too_large(Some(image_data.len()), self.max_bytes));
        }

        let format = detect_upload_format(&image_data).ok_or_else(|| {
            Error::Validation("Only JPEG and PNG images are supported".to_string())
        })?;

        let max_dimension = self.max_dimension;
        let (bytes, width, height, resized) = tokio::task::spawn_blocking(move || {
            Self::normalize_sync(image_data, format, max_dimension)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Image processing task join error: {}", e)))??;

        if resized {
            tracing::info!("Downscaled upload to {}x{}", width, height);
        }

        Ok(UploadedImage {
            file_name,
            mime_type: mime_for(format),
            bytes,
            width,
            height,
            resized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_small_png_is_kept_as_is() {
        let processor = ImageProcessor::new(1024 * 1024, 100);
        let data = create_test_image(10, 10, ImageFormat::Png);

        let upload = processor
            .prepare_upload(data.clone(), Some("red.png".to_string()))
            .await
            .unwrap();

        assert_eq!(upload.mime_type, "image/png");
        assert_eq!(upload.bytes, data);
        assert_eq!((upload.width, upload.height), (10, 10));
        assert!(!upload.resized);
        assert_eq!(upload.file_name.as_deref(), Some("red.png"));
    }

    #[tokio::test]
    async fn test_large_jpeg_is_downscaled_preserving_aspect() {
        let processor = ImageProcessor::new(10 * 1024 * 1024, 50);
        let data = create_test_image(200, 100, ImageFormat::Jpeg);

        let upload = processor.prepare_upload(data, None).await.unwrap();

        assert!(upload.resized);
        assert_eq!(upload.mime_type, "image/jpeg");
        assert_eq!((upload.width, upload.height), (50, 25));
        let decoded = image::load_from_memory(&upload.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (50, 25));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let processor = ImageProcessor::new(16, 100);
        let data = create_test_image(10, 10, ImageFormat::Png);

        let err = processor.prepare_upload(data, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected() {
        let processor = ImageProcessor::new(1024, 100);
        let err = processor
            .prepare_upload(b"GIF89a....".to_vec(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("JPEG and PNG"));
    }

    #[tokio::test]
    async fn test_corrupt_png_rejected() {
        let processor = ImageProcessor::new(1024, 100);
        let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(b"garbage");

        let err = processor.prepare_upload(data, None).await.unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }
}
