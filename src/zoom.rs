//! Digital zoom through sensor cropping.

use crate::types::SensorRect;

/// Crop rectangle for `zoom_factor` over the sensor's active pixel array.
///
/// Factors below 1.0 (and NaN) are treated as 1.0, which yields the active
/// array unchanged. Half extents are truncated toward zero so the crop stays
/// centered on the array center.
pub fn compute_crop_rect(active_array: SensorRect, zoom_factor: f32) -> SensorRect {
    let z = clamp_factor(zoom_factor);
    if z == 1.0 {
        return active_array;
    }

    let cx = active_array.center_x();
    let cy = active_array.center_y();
    let half_width = (active_array.width() as f32 / (2.0 * z)) as i32;
    let half_height = (active_array.height() as f32 / (2.0 * z)) as i32;

    SensorRect::new(cx - half_width, cy - half_height, cx + half_width, cy + half_height)
}

fn clamp_factor(zoom_factor: f32) -> f32 {
    if zoom_factor.is_nan() || zoom_factor < 1.0 {
        1.0
    } else {
        zoom_factor
    }
}

/// Current digital zoom factor. Only meaningful in ZOOM mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    factor: f32,
}

impl Default for ZoomState {
    fn default() -> Self {
        Self { factor: 1.0 }
    }
}

impl ZoomState {
    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn set(&mut self, factor: f32) {
        self.factor = clamp_factor(factor);
    }

    pub fn reset(&mut self) {
        self.factor = 1.0;
    }

    pub fn is_zoomed(&self) -> bool {
        self.factor > 1.0
    }
}
