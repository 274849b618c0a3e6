use async_trait::async_trait;
use clinical_flow::ImagePayload;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use thiserror::Error;
use tracing::debug;

use crate::config::ImageSettings;

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/jpg", "image/dicom"];

pub fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type.trim().to_ascii_lowercase().as_str())
}

/// Image could not be prepared. Reported separately from inference failures.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("image worker failed: {0}")]
    Worker(String),
}

#[async_trait]
pub trait ImagePreprocessor: Send + Sync {
    async fn prepare(&self, image: ImagePayload) -> Result<ImagePayload, PreprocessError>;
}

/// Fits images inside a square of `max_dimension` pixels (never enlarging)
/// and re-encodes them as JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResizingPreprocessor {
    settings: ImageSettings,
}

impl ResizingPreprocessor {
    pub fn new(settings: ImageSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ImagePreprocessor for ResizingPreprocessor {
    async fn prepare(&self, image: ImagePayload) -> Result<ImagePayload, PreprocessError> {
        let settings = self.settings;
        let input_len = image.bytes.len();

        let bytes = tokio::task::spawn_blocking(move || resize_and_encode(&image.bytes, settings))
            .await
            .map_err(|e| PreprocessError::Worker(e.to_string()))??;

        debug!(input_len, prepared_len = bytes.len(), "Image prepared");
        Ok(ImagePayload::new("image/jpeg", bytes))
    }
}

fn resize_and_encode(bytes: &[u8], settings: ImageSettings) -> Result<Vec<u8>, PreprocessError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|e| PreprocessError::Decode(e.to_string()))?;

    let max = settings.max_dimension;
    let fitted = if decoded.width() > max || decoded.height() > max {
        decoded.resize(max, max, FilterType::Triangle)
    } else {
        decoded
    };

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, settings.jpeg_quality)
        .encode_image(&fitted.to_rgb8())
        .map_err(|e| PreprocessError::Encode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn dimensions(payload: &ImagePayload) -> (u32, u32) {
        image::load_from_memory(&payload.bytes).unwrap().dimensions()
    }

    #[tokio::test]
    async fn large_images_are_fitted_inside_the_bound() {
        let prepared = ResizingPreprocessor::default()
            .prepare(ImagePayload::new("image/png", png(2048, 1024)))
            .await
            .unwrap();

        assert_eq!(prepared.mime_type, "image/jpeg");
        assert_eq!(dimensions(&prepared), (1024, 512));
    }

    #[tokio::test]
    async fn small_images_are_not_enlarged() {
        let prepared = ResizingPreprocessor::new(ImageSettings {
            max_dimension: 512,
            jpeg_quality: 60,
        })
        .prepare(ImagePayload::new("image/png", png(120, 80)))
        .await
        .unwrap();

        assert_eq!(dimensions(&prepared), (120, 80));
    }

    #[tokio::test]
    async fn undecodable_bytes_are_a_decode_error() {
        let err = ResizingPreprocessor::default()
            .prepare(ImagePayload::new("image/jpeg", b"not an image".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
    }

    #[test]
    fn mime_allow_list() {
        assert!(is_allowed_mime("image/png"));
        assert!(is_allowed_mime("IMAGE/JPEG"));
        assert!(is_allowed_mime("image/dicom"));
        assert!(!is_allowed_mime("application/pdf"));
    }
}
