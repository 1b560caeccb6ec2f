use anyhow::Error;
use async_trait::async_trait;

use crate::config::config::{FaceDetectionConfig, FaceMeshConfig};
use crate::utils::coordinate::{FaceLandmark, RawFace};
use crate::utils::image::ImageBuffer;

/// Finds faces in a decoded image.
///
/// Implementations return boxes in pixel space, inside the image bounds, in
/// the order the underlying model reports them. An empty result is not an error.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &ImageBuffer, config: &FaceDetectionConfig) -> Result<Vec<RawFace>, Error>;
}

/// Locates landmarks of the most prominent face in a decoded image.
#[async_trait]
pub trait LandmarkEngine: Send + Sync {
    async fn detect_landmarks(
        &self,
        image: &ImageBuffer,
        config: &FaceMeshConfig,
    ) -> Result<Option<FaceLandmark>, Error>;
}
