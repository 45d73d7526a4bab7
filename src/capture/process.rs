//! Decode, upright, label and re-encode a still image.

use crate::capture::overlay;
use crate::config::CaptureConfig;
use crate::errors::RangefinderError;
use crate::types::Measurement;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{DynamicImage, ImageDecoder, RgbImage};
use std::io::Cursor;

/// Decode a JPEG and rotate/flip its pixels according to the embedded EXIF
/// orientation, so the result is upright whatever the source tag said.
pub fn decode_upright(jpeg: &[u8]) -> Result<DynamicImage, RangefinderError> {
    if jpeg.is_empty() {
        return Err(RangefinderError::EncodeFailed("empty image buffer".to_string()));
    }
    let mut decoder = JpegDecoder::new(Cursor::new(jpeg))?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, RangefinderError> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(image)?;
    Ok(out)
}

/// Full still-image treatment: upright pixels, ring and label burned in,
/// JPEG out. The output carries no orientation tag.
pub fn render_capture(
    jpeg: &[u8],
    measurement: &Measurement,
    config: &CaptureConfig,
) -> Result<Vec<u8>, RangefinderError> {
    let mut rgb = decode_upright(jpeg)?.to_rgb8();
    log::debug!(
        "Rendering capture {}x{} with label {:?}",
        rgb.width(),
        rgb.height(),
        measurement.label()
    );
    overlay::burn_in(&mut rgb, measurement.label(), config);
    encode_jpeg(&rgb, config.jpeg_quality)
}
