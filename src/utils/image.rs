use anyhow::Error;
use opencv::core::{Mat, MatTraitConst, MatTraitConstManual, MatTraitManual, Scalar, Vector, CV_8UC3};
use opencv::imgcodecs::{imdecode, IMREAD_COLOR};
use opencv::imgproc::{cvt_color, COLOR_BGR2RGB};

use crate::error::DetectionError;
use crate::utils::coordinate::PixelBox;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Owned, row-major, interleaved RGB pixel grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wraps RGB bytes; fails when the dimensions are zero or disagree with the data length.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, Error> {
        if width == 0 || height == 0 {
            return Err(Error::msg("image dimensions must be positive"));
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::msg(format!(
                "image buffer holds {} bytes, expected {expected} for {width}x{height} RGB",
                data.len()
            )));
        }
        Ok(ImageBuffer { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copies the pixels inside `rect` into a new buffer. `rect` must lie within the image.
    pub fn crop(&self, rect: &PixelBox) -> Result<ImageBuffer, Error> {
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return Err(Error::msg(format!(
                "crop {:?} exceeds image bounds {}x{}",
                rect, self.width, self.height
            )));
        }
        let row_len = self.width as usize * 3;
        let mut data = Vec::with_capacity(rect.area() as usize * 3);
        for y in rect.y..rect.y + rect.height {
            let start = y as usize * row_len + rect.x as usize * 3;
            data.extend_from_slice(&self.data[start..start + rect.width as usize * 3]);
        }
        ImageBuffer::new(rect.width, rect.height, data)
    }

    /// Copies the pixels into an 8-bit, 3-channel OpenCV matrix (RGB order is kept).
    pub fn to_mat(&self) -> Result<Mat, Error> {
        let mut mat = Mat::new_rows_cols_with_default(
            self.height as i32,
            self.width as i32,
            CV_8UC3,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(&self.data);
        Ok(mat)
    }

    /// Reads an 8-bit, 3-channel matrix back into an owned buffer.
    pub fn from_mat(mat: &Mat) -> Result<Self, Error> {
        let size = mat.size()?;
        let data = if mat.is_continuous() {
            mat.data_bytes()?.to_vec()
        } else {
            mat.try_clone()?.data_bytes()?.to_vec()
        };
        ImageBuffer::new(size.width as u32, size.height as u32, data)
    }
}

/// Checks the upload before any decoding work is done.
///
/// The extension is the text after the final `.`, compared case-insensitively;
/// a name without `.` is its own extension.
pub fn validate_upload(filename: &str, content: &[u8]) -> Result<(), DetectionError> {
    if content.is_empty() {
        return Err(DetectionError::EmptyPayload);
    }

    let ext = filename.rsplit('.').next().unwrap_or(filename).to_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(DetectionError::UnsupportedFormat(ext));
    }
    Ok(())
}

/// Decodes JPEG/PNG bytes into an RGB [`ImageBuffer`].
pub fn decode_image(im_bytes: &[u8]) -> Result<ImageBuffer, DetectionError> {
    let encoded = Vector::<u8>::from_slice(im_bytes);

    // OpenCV reports undecodable content either as an error or as an empty matrix
    let img_bgr = match imdecode(&encoded, IMREAD_COLOR) {
        Ok(img_bgr) if !img_bgr.empty() => img_bgr,
        Ok(_) => return Err(DetectionError::InvalidImageData),
        Err(e) => {
            tracing::debug!("imdecode failed: {e}");
            return Err(DetectionError::InvalidImageData);
        }
    };

    let mut img_rgb = Mat::default();
    cvt_color(&img_bgr, &mut img_rgb, COLOR_BGR2RGB, 0).map_err(Error::from)?;

    Ok(ImageBuffer::from_mat(&img_rgb)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use opencv::core::{Mat, Scalar, Vector, CV_8UC3};
    use opencv::imgcodecs::imencode;

    use super::*;

    /// Encodes a solid-color BGR image with the given OpenCV extension (".png", ".jpg").
    pub(crate) fn encode_solid(width: i32, height: i32, bgr: (f64, f64, f64), ext: &str) -> Vec<u8> {
        let mat = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::new(bgr.0, bgr.1, bgr.2, 0.0)).unwrap();
        let mut buf = Vector::<u8>::new();
        imencode(ext, &mat, &mut buf, &Vector::new()).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_validate_upload_accepts_images() {
        for name in ["a.JPG", "b.jpeg", "c.png", "archive.tar.PNG"] {
            assert!(validate_upload(name, b"x").is_ok(), "{name} should pass");
        }
    }

    #[test]
    fn test_validate_upload_rejects_other_extensions() {
        for name in ["d.gif", "e.bmp", "noext", "png.", "jpg.txt"] {
            match validate_upload(name, b"x") {
                Err(DetectionError::UnsupportedFormat(_)) => {}
                other => panic!("{name}: unexpected {other:?}"),
            }
        }
        // a bare extension is its own extension
        assert!(validate_upload("png", b"x").is_ok());
    }

    #[test]
    fn test_validate_upload_empty_payload() {
        for name in ["a.jpg", "d.gif", "noext"] {
            assert!(matches!(validate_upload(name, &[]), Err(DetectionError::EmptyPayload)));
        }
    }

    #[test]
    fn test_decode_png_to_rgb() {
        // pure blue in BGR
        let png = encode_solid(4, 3, (255.0, 0.0, 0.0), ".png");
        let image = decode_image(&png).unwrap();

        assert_eq!(image.width(), 4);
        assert_eq!(image.height(), 3);
        assert_eq!(image.data().len(), 4 * 3 * 3);
        assert_eq!(&image.data()[..3], &[0, 0, 255]);
    }

    #[test]
    fn test_decode_jpeg() {
        let jpg = encode_solid(16, 8, (0.0, 0.0, 0.0), ".jpg");
        let image = decode_image(&jpg).unwrap();
        assert_eq!((image.width(), image.height()), (16, 8));
    }

    #[test]
    fn test_decode_rejects_text() {
        let result = decode_image(b"this is a text file renamed to x.png");
        assert!(matches!(result, Err(DetectionError::InvalidImageData)));
    }

    #[test]
    fn test_crop() {
        let data: Vec<u8> = (0..4 * 2 * 3).map(|v| v as u8).collect();
        let image = ImageBuffer::new(4, 2, data).unwrap();
        let crop = image.crop(&PixelBox::new(1, 1, 2, 1)).unwrap();

        assert_eq!((crop.width(), crop.height()), (2, 1));
        assert_eq!(crop.data(), &[15, 16, 17, 18, 19, 20]);
        assert!(image.crop(&PixelBox::new(3, 0, 2, 1)).is_err());
    }

    #[test]
    fn test_buffer_rejects_bad_shape() {
        assert!(ImageBuffer::new(0, 2, vec![]).is_err());
        assert!(ImageBuffer::new(2, 2, vec![0; 5]).is_err());
    }

    #[test]
    fn test_mat_round_trip() {
        let data: Vec<u8> = (0..3 * 2 * 3).map(|v| v as u8).collect();
        let image = ImageBuffer::new(3, 2, data).unwrap();
        let mat = image.to_mat().unwrap();
        assert_eq!(ImageBuffer::from_mat(&mat).unwrap(), image);
    }
}
