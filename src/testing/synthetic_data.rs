//! Synthetic camera units and JPEG stills
//!
//! The reference units describe a typical phone rear module: one fused
//! logical camera with two physical lenses, a fixed-focus ultra-wide and a
//! front camera. JPEGs are small gradients so they decode quickly.

use crate::capture::process::encode_jpeg;
use crate::types::{CameraUnit, LensFacing, SensorRect, Size};
use image::{Rgb, RgbImage};

/// Gradient still encoded as an untagged JPEG.
pub fn synthetic_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x % 256) as u8,
            (y % 256) as u8,
            ((x + y) % 256) as u8,
        ])
    });
    match encode_jpeg(&image, 90) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("Synthetic JPEG encode failed: {}", e);
            Vec::new()
        }
    }
}

/// Insert an EXIF APP1 segment carrying `orientation` (1-8) right after SOI.
///
/// Input that does not start with SOI is returned unchanged.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return jpeg.to_vec();
    }

    let mut tiff = Vec::with_capacity(26);
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&0x002Au16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());
    // One IFD entry: Orientation, SHORT, count 1.
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut payload = Vec::with_capacity(6 + tiff.len());
    payload.extend_from_slice(b"Exif\0\0");
    payload.extend_from_slice(&tiff);

    let segment_len = (payload.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Rear logical camera fusing a wide and a telephoto lens.
pub fn logical_main_unit(id: &str) -> CameraUnit {
    CameraUnit {
        id: id.to_string(),
        facing: LensFacing::Back,
        is_logical_multi_lens: true,
        physical_lens_count: 2,
        min_focal_length_mm: Some(4.3),
        has_auto_focus: true,
        has_flash: true,
        active_array: SensorRect::new(0, 0, 4000, 3000),
        sensor_orientation: 90,
        preview_sizes: vec![Size::new(1440, 1080), Size::new(1920, 1080), Size::new(1280, 720)],
        jpeg_sizes: vec![Size::new(1920, 1080), Size::new(4000, 3000), Size::new(3000, 3000)],
    }
}

/// Rear fixed-focus ultra-wide.
pub fn ultra_wide_unit(id: &str) -> CameraUnit {
    CameraUnit {
        id: id.to_string(),
        facing: LensFacing::Back,
        is_logical_multi_lens: false,
        physical_lens_count: 1,
        min_focal_length_mm: Some(1.8),
        has_auto_focus: false,
        has_flash: false,
        active_array: SensorRect::new(0, 0, 3264, 2448),
        sensor_orientation: 90,
        preview_sizes: vec![Size::new(1920, 1080)],
        jpeg_sizes: vec![Size::new(3264, 2448)],
    }
}

pub fn front_unit(id: &str) -> CameraUnit {
    CameraUnit {
        id: id.to_string(),
        facing: LensFacing::Front,
        is_logical_multi_lens: false,
        physical_lens_count: 1,
        min_focal_length_mm: Some(2.5),
        has_auto_focus: false,
        has_flash: false,
        active_array: SensorRect::new(0, 0, 2592, 1944),
        sensor_orientation: 270,
        preview_sizes: vec![Size::new(1280, 720)],
        jpeg_sizes: vec![Size::new(2592, 1944)],
    }
}

/// Units A (logical main, id "0"), B (ultra-wide, id "2") and C (front,
/// id "1") in driver order.
pub fn reference_units() -> Vec<CameraUnit> {
    vec![logical_main_unit("0"), front_unit("1"), ultra_wide_unit("2")]
}
