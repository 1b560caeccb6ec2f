use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Integer point in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate2D {
    pub x: u32,
    pub y: u32,
}

impl Coordinate2D {
    pub fn new(x: u32, y: u32) -> Self {
        Coordinate2D { x, y }
    }
}

/// Axis-aligned box in pixel space, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        PixelBox { x, y, width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// One face reported by a detector, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFace {
    pub bounding_box: PixelBox,
}

impl From<PixelBox> for RawFace {
    fn from(bounding_box: PixelBox) -> Self {
        RawFace { bounding_box }
    }
}

/// Landmarks of the single face the landmark engine reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceLandmark {
    pub left_eye: Coordinate2D,
    pub right_eye: Coordinate2D,
    pub nose: Coordinate2D,
}

impl FaceLandmark {
    pub fn points(&self) -> [(LandmarkName, Coordinate2D); 3] {
        [
            (LandmarkName::LeftEye, self.left_eye),
            (LandmarkName::RightEye, self.right_eye),
            (LandmarkName::Nose, self.nose),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LandmarkName {
    LeftEye,
    RightEye,
    Nose,
}

pub type NormalizedLandmarks = BTreeMap<LandmarkName, [f64; 2]>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFace {
    /// `[x, y, width, height]` as fractions of the image size.
    pub bbox: [f64; 4],
    pub landmarks: NormalizedLandmarks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResponse {
    pub image_width: u32,
    pub image_height: u32,
    pub faces: Vec<NormalizedFace>,
}

/// Divides a pixel box by `(width, height, width, height)`.
pub fn normalize_bbox(bbox: &PixelBox, image_width: u32, image_height: u32) -> [f64; 4] {
    let w = image_width as f64;
    let h = image_height as f64;
    [
        bbox.x as f64 / w,
        bbox.y as f64 / h,
        bbox.width as f64 / w,
        bbox.height as f64 / h,
    ]
}

pub fn normalize_point(point: &Coordinate2D, image_width: u32, image_height: u32) -> [f64; 2] {
    [
        point.x as f64 / image_width as f64,
        point.y as f64 / image_height as f64,
    ]
}

/// Normalizes every named point of `landmarks`; `None` yields an empty mapping.
pub fn normalize_landmarks(
    landmarks: Option<&FaceLandmark>,
    image_width: u32,
    image_height: u32,
) -> NormalizedLandmarks {
    match landmarks {
        None => NormalizedLandmarks::new(),
        Some(landmarks) => landmarks
            .points()
            .iter()
            .map(|(name, point)| (*name, normalize_point(point, image_width, image_height)))
            .collect(),
    }
}
