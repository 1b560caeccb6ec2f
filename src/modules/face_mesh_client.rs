use anyhow::{Context, Error};
use async_trait::async_trait;
use ndarray::{Array4, ArrayD};

use crate::config::config::{FaceMeshConfig, TritonConfig};
use crate::helper::face_helper::{
    clamp_to_pixel, get_face_roi, get_most_prominent_face, resize_exact, to_nhwc_tensor,
};
use crate::modules::detector::LandmarkEngine;
use crate::modules::face_detection_client::TritonFaceDetector;
use crate::triton_client::client::triton::model_infer_request::{InferInputTensor, InferRequestedOutputTensor};
use crate::triton_client::client::triton::{InferTensorContents, ModelInferRequest};
use crate::triton_client::client::{output_tensor, TritonInferenceClient};
use crate::utils::coordinate::{Coordinate2D, FaceLandmark, PixelBox};
use crate::utils::image::ImageBuffer;

const INPUT_NAME: &str = "input";
const LANDMARKS_OUTPUT: &str = "landmarks";

/// The face mesh reports on the short-range detector's best face.
const MESH_DETECTOR_SELECTION: u8 = 0;
const ROI_SCALE: f32 = 1.5;

// face mesh topology indices
const LEFT_EYE_INDEX: usize = 33;
const RIGHT_EYE_INDEX: usize = 263;
const NOSE_INDEX: usize = 1;

const MESH_POINTS: usize = 468;
const REFINED_MESH_POINTS: usize = 478;

/// Landmark engine served by Triton: detect, crop the most prominent face,
/// run the face mesh model on the crop.
#[derive(Debug, Clone)]
pub struct TritonFaceMesh {
    face_det: TritonFaceDetector,
    mesh_model: String,
    refined_mesh_model: String,
    imsize: (u32, u32),
    mean: f32,
    scale: f32,
}

impl TritonFaceMesh {
    pub fn new(config: &TritonConfig) -> Self {
        TritonFaceMesh {
            face_det: TritonFaceDetector::new(config),
            mesh_model: config.face_mesh_model.clone(),
            refined_mesh_model: config.face_mesh_refined_model.clone(),
            imsize: config.face_mesh_imsize,
            mean: config.face_mesh_mean,
            scale: config.face_mesh_scale,
        }
    }

    fn model(&self, refine_landmarks: bool) -> (&str, usize) {
        if refine_landmarks {
            (&self.refined_mesh_model, REFINED_MESH_POINTS)
        } else {
            (&self.mesh_model, MESH_POINTS)
        }
    }

    fn preprocess(&self, image: &ImageBuffer, roi: &PixelBox) -> Result<Array4<f32>, Error> {
        let face = image.crop(roi)?;
        let resized = resize_exact(&face, self.imsize)?;
        to_nhwc_tensor(&resized, self.mean, self.scale)
    }

    fn build_request(&self, model_name: &str, tensor: Array4<f32>) -> ModelInferRequest {
        let shape = tensor.shape().iter().map(|&x| x as i64).collect();
        ModelInferRequest {
            model_name: model_name.to_owned(),
            model_version: "".to_string(),
            id: "".to_string(),
            inputs: vec![InferInputTensor {
                name: INPUT_NAME.to_string(),
                datatype: "FP32".to_string(),
                shape,
                contents: Some(InferTensorContents {
                    fp32_contents: tensor.into_iter().collect(),
                    ..Default::default()
                }),
            }],
            outputs: vec![InferRequestedOutputTensor {
                name: LANDMARKS_OUTPUT.to_string(),
            }],
            raw_input_contents: vec![],
        }
    }

    /// Picks the named points out of the flat `x, y, z` mesh (in model input
    /// pixels) and maps them back onto the original image through `roi`.
    pub fn postprocess(
        &self,
        mesh: &ArrayD<f32>,
        expected_points: usize,
        roi: &PixelBox,
        image_size: (u32, u32),
    ) -> Result<FaceLandmark, Error> {
        let values: Vec<f32> = mesh.iter().cloned().collect();
        if values.len() != expected_points * 3 {
            return Err(Error::msg(format!(
                "face_mesh_client - expected {} landmark values, got {}",
                expected_points * 3,
                values.len()
            )));
        }

        let (img_w, img_h) = image_size;
        let scale_x = roi.width as f32 / self.imsize.0 as f32;
        let scale_y = roi.height as f32 / self.imsize.1 as f32;
        let point = |index: usize| {
            let x = roi.x as f32 + values[index * 3] * scale_x;
            let y = roi.y as f32 + values[index * 3 + 1] * scale_y;
            Coordinate2D::new(clamp_to_pixel(x, img_w), clamp_to_pixel(y, img_h))
        };

        Ok(FaceLandmark {
            left_eye: point(LEFT_EYE_INDEX),
            right_eye: point(RIGHT_EYE_INDEX),
            nose: point(NOSE_INDEX),
        })
    }
}

#[async_trait]
impl LandmarkEngine for TritonFaceMesh {
    async fn detect_landmarks(
        &self,
        image: &ImageBuffer,
        config: &FaceMeshConfig,
    ) -> Result<Option<FaceLandmark>, Error> {
        if !config.static_image_mode {
            return Err(Error::msg("face_mesh_client - only static image mode is supported"));
        }

        let session = TritonInferenceClient::connect(self.face_det.url(), self.face_det.timeout()).await?;

        let faces = self
            .face_det
            .infer(&session, image, MESH_DETECTOR_SELECTION, config.min_detection_confidence)
            .await?;
        let face = match get_most_prominent_face(&faces) {
            None => {
                tracing::debug!("face mesh found no face");
                return Ok(None);
            }
            Some(idx) => faces[idx],
        };

        // axis-aligned crop, no eye-line rotation
        let roi = get_face_roi(&face.bbox, image.width(), image.height(), ROI_SCALE);
        let (model_name, expected_points) = self.model(config.refine_landmarks);
        let tensor = self.preprocess(image, &roi)?;
        let request = self.build_request(model_name, tensor);

        let response = session.model_infer(request).await?;
        let mesh = output_tensor(&response, LANDMARKS_OUTPUT)?;
        let landmarks = self
            .postprocess(&mesh, expected_points, &roi, (image.width(), image.height()))
            .with_context(|| format!("unexpected output from {model_name}"))?;

        Ok(Some(landmarks))
    }
}
