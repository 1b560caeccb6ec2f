use std::sync::Arc;

use anyhow::Error;
use async_trait::async_trait;
use opencv::core::{Mat, Scalar, Vector, CV_8UC3};
use opencv::imgcodecs::imencode;

use rs_face_landmark_pipeline::config::config::{FaceDetectionConfig, FaceMeshConfig};
use rs_face_landmark_pipeline::modules::detector::{FaceDetector, LandmarkEngine};
use rs_face_landmark_pipeline::utils::coordinate::{Coordinate2D, LandmarkName, PixelBox};
use rs_face_landmark_pipeline::utils::image::ImageBuffer;
use rs_face_landmark_pipeline::{DetectionError, FaceLandmark, FaceLandmarkPipeline, RawFace};

/// Reports a fixed set of boxes scaled to the image: each entry is a fraction
/// of the width/height.
struct ProportionalDetector(Vec<[f64; 4]>);

#[async_trait]
impl FaceDetector for ProportionalDetector {
    async fn detect(&self, image: &ImageBuffer, _config: &FaceDetectionConfig) -> Result<Vec<RawFace>, Error> {
        let (w, h) = (image.width() as f64, image.height() as f64);
        Ok(self
            .0
            .iter()
            .map(|b| RawFace::from(PixelBox::new((b[0] * w) as u32, (b[1] * h) as u32, (b[2] * w) as u32, (b[3] * h) as u32)))
            .collect())
    }
}

struct FixedMesh;

#[async_trait]
impl LandmarkEngine for FixedMesh {
    async fn detect_landmarks(&self, image: &ImageBuffer, _config: &FaceMeshConfig) -> Result<Option<FaceLandmark>, Error> {
        Ok(Some(FaceLandmark {
            left_eye: Coordinate2D::new(image.width() / 4, image.height() / 3),
            right_eye: Coordinate2D::new(image.width() * 3 / 4, image.height() / 3),
            nose: Coordinate2D::new(image.width() / 2, image.height() / 2),
        }))
    }
}

fn encode(width: i32, height: i32, ext: &str) -> Vec<u8> {
    let mat = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(128.0)).unwrap();
    let mut buf = Vector::<u8>::new();
    imencode(ext, &mat, &mut buf, &Vector::new()).unwrap();
    buf.to_vec()
}

fn pipeline() -> FaceLandmarkPipeline {
    let boxes = vec![[0.1, 0.2, 0.3, 0.3], [0.5, 0.5, 0.5, 0.5], [0.0, 0.0, 1.0, 1.0]];
    FaceLandmarkPipeline::new(Arc::new(ProportionalDetector(boxes)), Arc::new(FixedMesh))
}

#[tokio::test]
async fn test_normalized_output_recovers_pixels() {
    for (w, h, name, ext) in [(640, 480, "a.JPG", ".jpg"), (333, 1001, "b.jpeg", ".jpg"), (97, 53, "c.png", ".png")] {
        let content = encode(w, h, ext);
        let response = pipeline().detect_faces_in_image(name, &content).await.unwrap();

        assert_eq!((response.image_width, response.image_height), (w as u32, h as u32));
        assert_eq!(response.faces.len(), 3);

        let (wf, hf) = (w as f64, h as f64);
        for face in &response.faces {
            assert!(face.bbox.iter().all(|v| (0.0..=1.0).contains(v)), "{name}: {:?}", face.bbox);
            let pixels = [face.bbox[0] * wf, face.bbox[1] * hf, face.bbox[2] * wf, face.bbox[3] * hf];
            for p in pixels {
                assert!((p - p.round()).abs() < 1e-6, "{name}: {p} is not a whole pixel");
            }
            assert_eq!(face.landmarks, response.faces[0].landmarks);
        }

        let nose = response.faces[0].landmarks[&LandmarkName::Nose];
        assert!((nose[0] * wf - (w / 2) as f64).abs() < 1e-6);
        assert!((nose[1] * hf - (h / 2) as f64).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_invalid_uploads() {
    let png = encode(10, 10, ".png");

    for name in ["d.gif", "e.bmp", "noext"] {
        let err = pipeline().detect_faces_in_image(name, &png).await.unwrap_err();
        assert!(matches!(err, DetectionError::UnsupportedFormat(_)), "{name}: {err:?}");
        assert!(err.is_client_error());
    }

    let err = pipeline().detect_faces_in_image("x.png", &[]).await.unwrap_err();
    assert!(matches!(err, DetectionError::EmptyPayload));

    let err = pipeline().detect_faces_in_image("x.png", b"hello from a text file").await.unwrap_err();
    assert!(matches!(err, DetectionError::InvalidImageData));
}
