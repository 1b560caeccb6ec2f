use std::sync::Arc;

use tracing::{debug, info};

use crate::config::config::{FaceDetectionConfig, FaceMeshConfig, TritonConfig};
use crate::error::DetectionError;
use crate::modules::detector::{FaceDetector, LandmarkEngine};
use crate::modules::face_detection_client::TritonFaceDetector;
use crate::modules::face_mesh_client::TritonFaceMesh;
use crate::utils::coordinate::{
    normalize_bbox, normalize_landmarks, DetectionResponse, FaceLandmark, NormalizedFace, RawFace,
};
use crate::utils::image::{decode_image, validate_upload};

#[derive(Clone)]
pub struct FaceLandmarkPipeline {
    face_detector: Arc<dyn FaceDetector>,
    landmark_engine: Arc<dyn LandmarkEngine>,
    detection_config: FaceDetectionConfig,
    mesh_config: FaceMeshConfig,
}

impl FaceLandmarkPipeline {

    /// new initializes new instance of the pipeline
    pub fn new(face_detector: Arc<dyn FaceDetector>, landmark_engine: Arc<dyn LandmarkEngine>) -> Self {
        FaceLandmarkPipeline {
            face_detector,
            landmark_engine,
            detection_config: FaceDetectionConfig::new(),
            mesh_config: FaceMeshConfig::new(),
        }
    }

    /// with_triton initializes the pipeline with the Triton-served detector and face mesh.
    pub fn with_triton(config: &TritonConfig) -> Self {
        Self::new(
            Arc::new(TritonFaceDetector::new(config)),
            Arc::new(TritonFaceMesh::new(config)),
        )
    }

    /// detect_faces_in_image validates the upload and runs the detection.
    ///
    /// # Arguments
    /// * `filename` - name of the uploaded file, only its extension is used
    /// * `content` - raw encoded image bytes
    ///
    /// # Returns
    /// * `Result<DetectionResponse, DetectionError>`
    pub async fn detect_faces_in_image(&self, filename: &str, content: &[u8]) -> Result<DetectionResponse, DetectionError> {
        validate_upload(filename, content)?;
        self.detect(content).await
    }

    /// detect decodes the image, finds the faces and their landmarks and
    /// returns them in normalized coordinates.
    ///
    /// The landmark engine runs only when at least one face was found. It
    /// reports on a single face, and that one landmark set is attached to
    /// every face in the response.
    ///
    /// # Arguments
    /// * `content` - raw encoded image bytes, non-empty
    ///
    /// # Returns
    /// * `Result<DetectionResponse, DetectionError>`
    pub async fn detect(&self, content: &[u8]) -> Result<DetectionResponse, DetectionError> {
        let image = decode_image(content)?;
        let (width, height) = (image.width(), image.height());
        debug!(width, height, "decoded image");

        let faces = self.face_detector.detect(&image, &self.detection_config).await?;
        if faces.is_empty() {
            info!(width, height, "no face detected");
            return Ok(assemble_response(width, height, &[], None));
        }

        let landmarks = self.landmark_engine.detect_landmarks(&image, &self.mesh_config).await?;
        if landmarks.is_none() {
            debug!("landmark engine returned no mesh");
        }

        info!(width, height, faces = faces.len(), landmarks = landmarks.is_some(), "detection finished");
        Ok(assemble_response(width, height, &faces, landmarks.as_ref()))
    }
}

/// assemble_response normalizes every face against the image size, keeping
/// the detector's order, and attaches the same landmark set to each of them.
///
/// # Arguments
/// * `width` - image width in pixels
/// * `height` - image height in pixels
/// * `faces` - detector output in pixel space
/// * `landmarks` - the landmark mesh, if any
///
/// # Returns
/// * `DetectionResponse`
pub fn assemble_response(
    width: u32,
    height: u32,
    faces: &[RawFace],
    landmarks: Option<&FaceLandmark>,
) -> DetectionResponse {
    let normalized_landmarks = normalize_landmarks(landmarks, width, height);
    let faces = faces
        .iter()
        .map(|face| NormalizedFace {
            bbox: normalize_bbox(&face.bounding_box, width, height),
            landmarks: normalized_landmarks.clone(),
        })
        .collect();

    DetectionResponse {
        image_width: width,
        image_height: height,
        faces,
    }
}
