//! Decoded camera frames and pixel intensity statistics.

use crate::{constants::LUMA_WEIGHTS, Error, Result};
use image::{GrayImage, Luma, RgbImage};

/// A decoded color raster owned by a single analysis call
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Decode an encoded image (JPEG, PNG, ...) into a frame
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the bytes are not a valid raster image
    /// or the image has no pixels.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(|e| Error::Decode(e.to_string()))?;
        let image = decoded.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Decode("image has no pixels".to_string()));
        }
        Ok(Self { image })
    }

    /// Wrap an already decoded RGB buffer
    #[must_use]
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    /// Frame width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying RGB buffer
    #[must_use]
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Convert to 8-bit grayscale with BT.601 luma weights
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Rounded luma is within 0..=255
    pub fn to_grayscale(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            let [r, g, b] = self.image.get_pixel(x, y).0;
            let luma = LUMA_WEIGHTS[0] * f64::from(r) + LUMA_WEIGHTS[1] * f64::from(g) + LUMA_WEIGHTS[2] * f64::from(b);
            Luma([luma.round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Intensity statistics of a grayscale image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    /// Mean pixel intensity
    pub mean: f64,
    /// Population standard deviation of pixel intensity
    pub std_dev: f64,
}

impl IntensityStats {
    /// Compute mean and population standard deviation
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Pixel counts fit comfortably in f64
    pub fn of(gray: &GrayImage) -> Self {
        let n = gray.as_raw().len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0 };
        }
        let n = n as f64;
        let mean = gray.as_raw().iter().map(|&p| f64::from(p)).sum::<f64>() / n;
        let variance = gray
            .as_raw()
            .iter()
            .map(|&p| (f64::from(p) - mean).powi(2))
            .sum::<f64>()
            / n;

        Self {
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

/// Fraction of pixels whose intensity changed between two frames.
///
/// Returns `None` when the frames have different dimensions.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn changed_pixel_ratio(current: &GrayImage, previous: &GrayImage) -> Option<f64> {
    if current.dimensions() != previous.dimensions() {
        return None;
    }
    let total = current.as_raw().len();
    if total == 0 {
        return Some(0.0);
    }
    let changed = current
        .as_raw()
        .iter()
        .zip(previous.as_raw())
        .filter(|(a, b)| a != b)
        .count();
    Some(changed as f64 / total as f64)
}
