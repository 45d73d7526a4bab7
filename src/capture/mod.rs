//! Still capture: request construction and image post-processing.
//!
//! A still request mirrors what the viewfinder shows: AF mode, AF regions and
//! crop are copied from the live repeating request. Torch mode is never
//! copied; an enabled flash becomes a single flash for this frame only.

pub mod overlay;
pub mod process;

use crate::platform::StillSink;
use crate::types::{
    CaptureRequest, DeviceRotation, FlashMode, LensFacing, OutputTarget, RequestTemplate,
};

pub use process::{decode_upright, render_capture};

/// JPEG rotation for the still, from sensor mounting and device rotation.
///
/// Front-facing sensors are mirrored, so device rotation is added for them
/// and subtracted otherwise.
pub fn jpeg_orientation(sensor_orientation: u32, rotation: DeviceRotation, facing: LensFacing) -> u32 {
    let sign = if facing == LensFacing::Front { 1 } else { -1 };
    let degrees = sensor_orientation as i32 + sign * rotation.degrees() + 360;
    degrees.rem_euclid(360) as u32
}

pub fn build_still_request(
    live: &CaptureRequest,
    sink: &StillSink,
    flash_enabled: bool,
    orientation: u32,
) -> CaptureRequest {
    let mut request =
        CaptureRequest::new(RequestTemplate::StillCapture).with_target(OutputTarget::StillSink(sink.token));
    request.af_mode = live.af_mode;
    request.af_regions = live.af_regions.clone();
    request.crop_region = live.crop_region;
    request.flash_mode = if flash_enabled {
        FlashMode::Single
    } else {
        FlashMode::Off
    };
    request.jpeg_orientation = Some(orientation);
    request
}
