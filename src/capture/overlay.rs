//! Burn-in of the focus ring and distance label.
//!
//! Geometry scales with image height so the overlay looks the same on every
//! still size. Text uses a built-in 5x7 bitmap face covering the characters
//! distance labels are made of.

use crate::config::CaptureConfig;
use image::{Rgb, RgbImage};

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

const RING_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

fn glyph(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11100, 0b10010, 0b10001, 0b10001, 0b10001, 0b10010, 0b11100],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'm' => [0b00000, 0b00000, 0b11010, 0b10101, 0b10101, 0b10001, 0b10001],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '∞' => [0b00000, 0b00000, 0b01010, 0b10101, 0b10101, 0b01010, 0b00000],
        _ => [0; 7],
    }
}

fn blend(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, alpha: f32) {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    let px = image.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let under = px.0[c] as f32;
        px.0[c] = (under + (color.0[c] as f32 - under) * alpha).round() as u8;
    }
}

/// Stroke a circle of `radius` around the image center.
pub fn draw_focus_ring(image: &mut RgbImage, config: &CaptureConfig) {
    let h = image.height() as f32;
    let radius = h * config.ring_radius_ratio;
    let half_stroke = (h * 0.001).max(1.0) / 2.0;
    let cx = image.width() as f32 / 2.0;
    let cy = h / 2.0;

    let reach = (radius + half_stroke + 1.0).ceil() as i64;
    let (cxi, cyi) = (cx as i64, cy as i64);
    for y in (cyi - reach)..=(cyi + reach) {
        for x in (cxi - reach)..=(cxi + reach) {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let off = ((dx * dx + dy * dy).sqrt() - radius).abs();
            if off <= half_stroke + 0.5 {
                blend(image, x, y, RING_COLOR, config.ring_opacity);
            }
        }
    }
}

/// Pixel extent of `text` at the given glyph scale.
fn text_extent(text: &str, scale: u32) -> (u32, u32) {
    let count = text.chars().count() as u32;
    if count == 0 {
        return (0, GLYPH_H * scale);
    }
    let advance = (GLYPH_W + 1) * scale;
    (count * advance - scale, GLYPH_H * scale)
}

/// Nearest point of `[lo, hi]` to `v`. When rounding inverts the interval
/// (radius equal to half the extent) the midpoint is the core.
fn clamp_to_core(v: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        (lo + hi) / 2.0
    } else {
        v.clamp(lo, hi)
    }
}

fn inside_rounded_rect(x: f32, y: f32, rect: (f32, f32, f32, f32), r: f32) -> bool {
    let (left, top, right, bottom) = rect;
    if x < left || x >= right || y < top || y >= bottom {
        return false;
    }
    let nx = clamp_to_core(x, left + r, right - r);
    let ny = clamp_to_core(y, top + r, bottom - r);
    let (dx, dy) = (x - nx, y - ny);
    dx * dx + dy * dy <= r * r
}

/// Draw `label` centered horizontally near the top, on a translucent box.
pub fn draw_label(image: &mut RgbImage, label: &str, config: &CaptureConfig) {
    let h = image.height() as f32;
    let text_height = (h * config.text_height_ratio).max(GLYPH_H as f32);
    let scale = ((text_height / GLYPH_H as f32).round() as u32).max(1);
    let (text_w, text_h) = text_extent(label, scale);

    let x = (image.width() as f32 - text_w as f32) / 2.0;
    let baseline = h * config.label_baseline_ratio;
    let top = baseline - text_h as f32;
    let pad = config.label_padding_px as f32;

    let rect = (
        x - pad,
        top - pad / 2.0,
        x + text_w as f32 + pad,
        baseline + pad / 2.0,
    );
    let radius = (config.label_corner_radius_px as f32)
        .min((rect.2 - rect.0) / 2.0)
        .min((rect.3 - rect.1) / 2.0);
    let box_alpha = config.label_background_alpha as f32 / 255.0;
    for py in rect.1.floor() as i64..rect.3.ceil() as i64 {
        for px in rect.0.floor() as i64..rect.2.ceil() as i64 {
            if inside_rounded_rect(px as f32 + 0.5, py as f32 + 0.5, rect, radius) {
                blend(image, px, py, BOX_COLOR, box_alpha);
            }
        }
    }

    let origin_x = x.round() as i64;
    let origin_y = top.round() as i64;
    let advance = ((GLYPH_W + 1) * scale) as i64;
    for (i, c) in label.chars().enumerate() {
        let rows = glyph(c);
        let gx = origin_x + i as i64 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..scale {
                    for sx in 0..scale {
                        blend(
                            image,
                            gx + (col * scale + sx) as i64,
                            origin_y + (row as u32 * scale + sy) as i64,
                            TEXT_COLOR,
                            1.0,
                        );
                    }
                }
            }
        }
    }
}

/// Focus ring at the center plus the labeled box near the top.
pub fn burn_in(image: &mut RgbImage, label: &str, config: &CaptureConfig) {
    draw_focus_ring(image, config);
    draw_label(image, label, config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RangefinderConfig;

    fn gray(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([128, 128, 128]))
    }

    #[test]
    fn test_ring_tints_circle_not_center() {
        let config = RangefinderConfig::default().capture;
        let mut img = gray(800, 600);
        draw_focus_ring(&mut img, &config);

        // radius = 600 * 0.065 = 39
        let on_ring = img.get_pixel(400 + 39, 300);
        assert!(on_ring.0[1] > 200 && on_ring.0[0] < 100);
        assert_eq!(*img.get_pixel(400, 300), Rgb([128, 128, 128]));
    }

    #[test]
    fn test_label_box_darkens_top_band_only() {
        let config = RangefinderConfig::default().capture;
        let mut img = gray(800, 600);
        draw_label(&mut img, "DISTANCE: 2.00 m", &config);

        // Box spans roughly y = 8..58 around the horizontal center.
        let mut touched_top = false;
        for x in 200..600 {
            let p = img.get_pixel(x, 20);
            if p.0 != [128, 128, 128] {
                touched_top = true;
            }
        }
        assert!(touched_top);
        assert_eq!(*img.get_pixel(400, 500), Rgb([128, 128, 128]));
        assert_eq!(*img.get_pixel(2, 20), Rgb([128, 128, 128]));
    }

    #[test]
    fn test_label_draws_white_glyph_pixels() {
        let config = RangefinderConfig::default().capture;
        let mut img = gray(800, 600);
        draw_label(&mut img, "DISTANCE: ∞", &config);
        let white = img.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert!(white > 100);
    }

    #[test]
    fn test_tiny_image_does_not_panic() {
        let config = RangefinderConfig::default().capture;
        let mut img = gray(4, 3);
        burn_in(&mut img, "DISTANCE: 123.45 m", &config);
    }

    #[test]
    fn test_burn_in_every_small_height() {
        let config = RangefinderConfig::default().capture;
        for height in 1..=600 {
            for label in ["DISTANCE: 2.00 m", "DISTANCE: ∞"] {
                let mut img = gray(80, height);
                burn_in(&mut img, label, &config);
            }
        }
    }

    #[test]
    fn test_clamp_to_core_handles_inverted_interval() {
        assert_eq!(clamp_to_core(3.0, 6.0999994, 6.0999985), (6.0999994 + 6.0999985) / 2.0);
        assert_eq!(clamp_to_core(0.0, 1.0, 2.0), 1.0);
        assert_eq!(clamp_to_core(5.0, 1.0, 2.0), 2.0);
    }

    #[test]
    fn test_square_box_radius_at_half_extent() {
        // Box exactly as tall as twice the corner radius.
        assert!(inside_rounded_rect(5.0, 5.0, (0.0, 0.0, 10.0, 10.0), 5.0));
        assert!(!inside_rounded_rect(0.1, 0.1, (0.0, 0.0, 10.0, 10.0), 5.0));
    }

    #[test]
    fn test_text_extent() {
        assert_eq!(text_extent("AB", 2), (22, 14));
        assert_eq!(text_extent("", 3), (0, 21));
    }
}
