use anyhow::Error;
use ndarray::{Array, Array4};
use opencv::core::{Mat, Size};
use opencv::imgproc::{resize, INTER_LINEAR};

use crate::utils::coordinate::PixelBox;
use crate::utils::image::ImageBuffer;

/// A detector hit together with its confidence, in original image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredFace {
    pub bbox: PixelBox,
    pub score: f32,
}

/// Resizes to exactly `size` (width, height) with bilinear interpolation.
pub fn resize_exact(image: &ImageBuffer, size: (u32, u32)) -> Result<ImageBuffer, Error> {
    let src = image.to_mat()?;
    let mut dst = Mat::default();
    resize(
        &src,
        &mut dst,
        Size::new(size.0 as i32, size.1 as i32),
        0.0,
        0.0,
        INTER_LINEAR,
    )?;
    ImageBuffer::from_mat(&dst)
}

/// Fits the image into `input_size` keeping its aspect ratio, anchored at the
/// top-left corner and padded with zeros. Returns the padded image and the
/// scale factor applied to the original.
pub fn letterbox(image: &ImageBuffer, input_size: (u32, u32)) -> Result<(ImageBuffer, f32), Error> {
    let (in_w, in_h) = input_size;
    let ratio = f32::min(
        in_w as f32 / image.width() as f32,
        in_h as f32 / image.height() as f32,
    );
    let new_width = ((image.width() as f32 * ratio) as u32).clamp(1, in_w);
    let new_height = ((image.height() as f32 * ratio) as u32).clamp(1, in_h);

    let resized = resize_exact(image, (new_width, new_height))?;

    let mut canvas = vec![0u8; in_w as usize * in_h as usize * 3];
    let src_row = new_width as usize * 3;
    let dst_row = in_w as usize * 3;
    for (y, row) in resized.data().chunks_exact(src_row).enumerate() {
        canvas[y * dst_row..y * dst_row + src_row].copy_from_slice(row);
    }

    Ok((ImageBuffer::new(in_w, in_h, canvas)?, ratio))
}

/// Builds a `[1, H, W, 3]` float tensor with `(pixel - mean) * scale`.
pub fn to_nhwc_tensor(image: &ImageBuffer, mean: f32, scale: f32) -> Result<Array4<f32>, Error> {
    let values: Vec<f32> = image
        .data()
        .iter()
        .map(|&p| (p as f32 - mean) * scale)
        .collect();
    let tensor = Array::from_shape_vec(
        (1, image.height() as usize, image.width() as usize, 3),
        values,
    )?;
    Ok(tensor)
}

/// Index of the face with the highest score; the first one wins ties.
pub fn get_most_prominent_face(faces: &[ScoredFace]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, face) in faces.iter().enumerate() {
        match best {
            Some((_, score)) if face.score <= score => {}
            _ => best = Some((idx, face.score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Square region centered on `bbox` whose side is `scale` times the larger
/// box side, clamped to the image.
///
/// The region is axis-aligned: it is not rotated to the eye line, so the mesh
/// sees tilted faces tilted and their landmarks are less precise.
pub fn get_face_roi(bbox: &PixelBox, image_width: u32, image_height: u32, scale: f32) -> PixelBox {
    let center_x = bbox.x as f32 + bbox.width as f32 / 2.0;
    let center_y = bbox.y as f32 + bbox.height as f32 / 2.0;
    let side = bbox.width.max(bbox.height) as f32 * scale;

    let left = (center_x - side / 2.0).max(0.0) as u32;
    let top = (center_y - side / 2.0).max(0.0) as u32;
    let right = ((center_x + side / 2.0) as u32).min(image_width);
    let bottom = ((center_y + side / 2.0) as u32).min(image_height);

    PixelBox::new(
        left.min(image_width - 1),
        top.min(image_height - 1),
        right.saturating_sub(left).max(1),
        bottom.saturating_sub(top).max(1),
    )
}

/// Converts a continuous pixel position to an integer pixel inside the image.
pub fn clamp_to_pixel(value: f32, length: u32) -> u32 {
    if value <= 0.0 || value.is_nan() {
        0
    } else if value >= length as f32 {
        length
    } else {
        value as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(x: u32, score: f32) -> ScoredFace {
        ScoredFace {
            bbox: PixelBox::new(x, 0, 10, 10),
            score,
        }
    }

    #[test]
    fn test_most_prominent_face() {
        assert_eq!(get_most_prominent_face(&[]), None);
        let faces = vec![scored(0, 0.6), scored(10, 0.9), scored(20, 0.9)];
        assert_eq!(get_most_prominent_face(&faces), Some(1));
    }

    #[test]
    fn test_face_roi_is_square_and_centered() {
        let roi = get_face_roi(&PixelBox::new(100, 100, 40, 60), 1000, 1000, 1.5);
        assert_eq!(roi, PixelBox::new(75, 85, 90, 90));
    }

    #[test]
    fn test_face_roi_stays_axis_aligned() {
        // a wide box from a tilted face still yields an upright square
        let roi = get_face_roi(&PixelBox::new(200, 300, 100, 40), 1000, 1000, 1.5);
        assert_eq!(roi, PixelBox::new(175, 245, 150, 150));
    }

    #[test]
    fn test_face_roi_clamped_to_image() {
        let roi = get_face_roi(&PixelBox::new(0, 0, 50, 50), 60, 40, 1.5);
        assert_eq!(roi.x, 0);
        assert_eq!(roi.y, 0);
        assert!(roi.x + roi.width <= 60);
        assert!(roi.y + roi.height <= 40);
    }

    #[test]
    fn test_clamp_to_pixel() {
        assert_eq!(clamp_to_pixel(-3.2, 10), 0);
        assert_eq!(clamp_to_pixel(4.9, 10), 4);
        assert_eq!(clamp_to_pixel(12.0, 10), 10);
    }

    #[test]
    fn test_letterbox_pads_bottom() {
        let image = ImageBuffer::new(4, 2, vec![200; 4 * 2 * 3]).unwrap();
        let (padded, ratio) = letterbox(&image, (8, 8)).unwrap();

        assert_eq!(ratio, 2.0);
        assert_eq!((padded.width(), padded.height()), (8, 8));
        // first four rows hold the image, the rest is padding
        assert!(padded.data()[..8 * 4 * 3].iter().all(|&p| p == 200));
        assert!(padded.data()[8 * 4 * 3..].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_to_nhwc_tensor() {
        let image = ImageBuffer::new(2, 1, vec![0, 127, 255, 255, 255, 255]).unwrap();
        let tensor = to_nhwc_tensor(&image, 127.5, 1.0 / 127.5).unwrap();

        assert_eq!(tensor.shape(), &[1, 1, 2, 3]);
        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 1e-6);
        assert!((tensor[[0, 0, 1, 2]] - 1.0).abs() < 1e-6);
    }
}
