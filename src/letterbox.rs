//! Aspect-preserving resize onto a fixed model input canvas.

use image::{imageops, imageops::FilterType, Rgb, RgbImage};

/// Where the resized frame sits on the padded canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Equal padding on both sides (YOLO style)
    Centered,
    /// Padding only on the right and bottom (SCRFD style)
    TopLeft,
}

/// Mapping between frame pixels and model input pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Frame to input scale factor
    pub scale: f32,
    /// Horizontal padding before the frame content
    pub pad_x: f32,
    /// Vertical padding before the frame content
    pub pad_y: f32,
}

impl Letterbox {
    /// Compute the mapping for a frame of `width`x`height` onto the input canvas
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(width: u32, height: u32, input_width: u32, input_height: u32, placement: Placement) -> Self {
        let scale = (input_width as f32 / width.max(1) as f32).min(input_height as f32 / height.max(1) as f32);
        let (new_width, new_height) = scaled_size(width, height, scale);
        let (pad_x, pad_y) = match placement {
            Placement::Centered => (
                input_width.saturating_sub(new_width) as f32 / 2.0,
                input_height.saturating_sub(new_height) as f32 / 2.0,
            ),
            Placement::TopLeft => (0.0, 0.0),
        };
        Self { scale, pad_x, pad_y }
    }

    /// Map a point from input space back to frame space
    #[must_use]
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        ((width as f32 * scale).round() as u32).max(1),
        ((height as f32 * scale).round() as u32).max(1),
    )
}

/// Resize `image` into an `input_width`x`input_height` canvas filled with `fill`,
/// keeping the aspect ratio
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn letterbox(
    image: &RgbImage,
    input_width: u32,
    input_height: u32,
    placement: Placement,
    fill: [u8; 3],
) -> (RgbImage, Letterbox) {
    let mapping = Letterbox::fit(image.width(), image.height(), input_width, input_height, placement);
    let (new_width, new_height) = scaled_size(image.width(), image.height(), mapping.scale);
    let new_width = new_width.min(input_width);
    let new_height = new_height.min(input_height);

    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(input_width, input_height, Rgb(fill));
    imageops::replace(
        &mut canvas,
        &resized,
        i64::from(mapping.pad_x as u32),
        i64::from(mapping.pad_y as u32),
    );
    (canvas, mapping)
}
