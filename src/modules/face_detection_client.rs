use std::time::Duration;

use anyhow::{Context, Error};
use async_trait::async_trait;
use ndarray::{Array4, ArrayD};

use crate::config::config::{FaceDetectionConfig, TritonConfig};
use crate::helper::face_helper::{clamp_to_pixel, letterbox, to_nhwc_tensor, ScoredFace};
use crate::modules::detector::FaceDetector;
use crate::triton_client::client::triton::model_infer_request::{InferInputTensor, InferRequestedOutputTensor};
use crate::triton_client::client::triton::{InferTensorContents, ModelInferRequest};
use crate::triton_client::client::{output_tensor, TritonInferenceClient};
use crate::utils::coordinate::{PixelBox, RawFace};
use crate::utils::image::ImageBuffer;

const INPUT_NAME: &str = "input";
const BOXES_OUTPUT: &str = "boxes";
const SCORES_OUTPUT: &str = "scores";

/// Face detector served by Triton.
///
/// The served model takes a letterboxed `[1, H, W, 3]` FP32 image and returns
/// `boxes` (`xmin, ymin, xmax, ymax`, relative to the model input) and
/// `scores`, one per candidate, already filtered by non-maximum suppression.
#[derive(Debug, Clone)]
pub struct TritonFaceDetector {
    url: String,
    timeout: Duration,
    short_range_model: String,
    full_range_model: String,
    short_range_imsize: (u32, u32),
    full_range_imsize: (u32, u32),
    mean: f32,
    scale: f32,
}

impl TritonFaceDetector {
    pub fn new(config: &TritonConfig) -> Self {
        TritonFaceDetector {
            url: config.url.clone(),
            timeout: config.timeout(),
            short_range_model: config.short_range_model.clone(),
            full_range_model: config.full_range_model.clone(),
            short_range_imsize: config.short_range_imsize,
            full_range_imsize: config.detection_imsize,
            mean: config.detection_mean,
            scale: config.detection_scale,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn model_name(&self, model_selection: u8) -> Result<&str, Error> {
        Ok(self.model(model_selection)?.0)
    }

    /// Model name and its input size (width, height) for `model_selection`.
    pub fn model(&self, model_selection: u8) -> Result<(&str, (u32, u32)), Error> {
        match model_selection {
            0 => Ok((&self.short_range_model, self.short_range_imsize)),
            1 => Ok((&self.full_range_model, self.full_range_imsize)),
            other => Err(Error::msg(format!("face_detection_client - unknown model selection {other}"))),
        }
    }

    fn preprocess(&self, image: &ImageBuffer, imsize: (u32, u32)) -> Result<(Array4<f32>, f32), Error> {
        let (padded, ratio) = letterbox(image, imsize)?;
        let tensor = to_nhwc_tensor(&padded, self.mean, self.scale)?;
        Ok((tensor, ratio))
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
            outputs: [BOXES_OUTPUT, SCORES_OUTPUT]
                .iter()
                .map(|name| InferRequestedOutputTensor { name: name.to_string() })
                .collect(),
            raw_input_contents: vec![],
        }
    }

    /// Maps model-space detections back onto the original image.
    ///
    /// Candidates under `min_confidence` and boxes that collapse to nothing
    /// after clamping are dropped; the model's order is kept otherwise.
    pub fn postprocess(
        &self,
        boxes: &ArrayD<f32>,
        scores: &ArrayD<f32>,
        ratio: f32,
        imsize: (u32, u32),
        image_size: (u32, u32),
        min_confidence: f32,
    ) -> Result<Vec<ScoredFace>, Error> {
        let boxes: Vec<f32> = boxes.iter().cloned().collect();
        let scores: Vec<f32> = scores.iter().cloned().collect();
        if boxes.len() != scores.len() * 4 {
            return Err(Error::msg(format!(
                "face_detection_client - {} box values for {} scores",
                boxes.len(),
                scores.len()
            )));
        }

        let (img_w, img_h) = image_size;
        let scale_x = imsize.0 as f32 / ratio;
        let scale_y = imsize.1 as f32 / ratio;

        let mut result = Vec::with_capacity(scores.len());
        for (face_box, &score) in boxes.chunks_exact(4).zip(scores.iter()) {
            if score < min_confidence {
                continue;
            }
            let x0 = clamp_to_pixel(face_box[0] * scale_x, img_w);
            let y0 = clamp_to_pixel(face_box[1] * scale_y, img_h);
            let x1 = clamp_to_pixel(face_box[2] * scale_x, img_w);
            let y1 = clamp_to_pixel(face_box[3] * scale_y, img_h);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }
            result.push(ScoredFace {
                bbox: PixelBox::new(x0, y0, x1 - x0, y1 - y0),
                score,
            });
        }
        Ok(result)
    }

    /// Runs the detector on an already opened session.
    pub async fn infer(
        &self,
        session: &TritonInferenceClient,
        image: &ImageBuffer,
        model_selection: u8,
        min_confidence: f32,
    ) -> Result<Vec<ScoredFace>, Error> {
        let (model_name, imsize) = self.model(model_selection)?;
        let model_name = model_name.to_owned();
        let (tensor, ratio) = self.preprocess(image, imsize)?;
        let request = self.build_request(&model_name, tensor);

        let response = session.model_infer(request).await?;
        let boxes = output_tensor(&response, BOXES_OUTPUT)?;
        let scores = output_tensor(&response, SCORES_OUTPUT)?;

        let faces = self
            .postprocess(&boxes, &scores, ratio, imsize, (image.width(), image.height()), min_confidence)
            .with_context(|| format!("unexpected output from {model_name}"))?;
        tracing::debug!(model = %model_name, faces = faces.len(), "face detection finished");
        Ok(faces)
    }
}

#[async_trait]
impl FaceDetector for TritonFaceDetector {
    async fn detect(&self, image: &ImageBuffer, config: &FaceDetectionConfig) -> Result<Vec<RawFace>, Error> {
        let session = TritonInferenceClient::connect(&self.url, self.timeout).await?;
        let faces = self
            .infer(&session, image, config.model_selection, config.min_detection_confidence)
            .await?;
        Ok(faces.into_iter().map(|face| RawFace::from(face.bbox)).collect())
    }
}
