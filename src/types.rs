//! Data model shared by the enumerator, session controller and capture pipeline.

use serde::{Deserialize, Serialize};

/// Direction a camera unit points relative to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LensFacing {
    Back,
    Front,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_16_9(&self) -> bool {
        self.height != 0 && self.width as u64 * 9 == self.height as u64 * 16
    }
}

/// Rectangle in sensor pixel coordinates, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl SensorRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> i32 {
        (self.left + self.right) >> 1
    }

    pub fn center_y(&self) -> i32 {
        (self.top + self.bottom) >> 1
    }
}

/// Static description of one camera unit, read once from the hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraUnit {
    pub id: String,
    pub facing: LensFacing,
    pub is_logical_multi_lens: bool,
    /// Number of physical sensors behind this unit; 1 when not a fused unit.
    pub physical_lens_count: u32,
    /// Shortest focal length the lens offers, if reported.
    pub min_focal_length_mm: Option<f32>,
    pub has_auto_focus: bool,
    pub has_flash: bool,
    pub active_array: SensorRect,
    /// Clockwise mounting angle of the sensor in degrees.
    pub sensor_orientation: u32,
    pub preview_sizes: Vec<Size>,
    pub jpeg_sizes: Vec<Size>,
}

pub const FALLBACK_OUTPUT_SIZE: Size = Size::new(1920, 1080);

impl CameraUnit {
    /// First 16:9 preview size, or 1920x1080.
    pub fn preview_size(&self) -> Size {
        self.preview_sizes
            .iter()
            .copied()
            .find(Size::is_16_9)
            .unwrap_or(FALLBACK_OUTPUT_SIZE)
    }

    /// Largest JPEG output size by area, or 1920x1080.
    pub fn still_size(&self) -> Size {
        self.jpeg_sizes
            .iter()
            .copied()
            .max_by_key(Size::area)
            .unwrap_or(FALLBACK_OUTPUT_SIZE)
    }
}

/// Which lens the rangefinder is measuring through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraMode {
    Wide,
    UltraWide,
    Zoom,
}

impl CameraMode {
    /// Tag persisted alongside saved captures.
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraMode::Wide => "WIDE",
            CameraMode::UltraWide => "ULTRAWIDE",
            CameraMode::Zoom => "ZOOM",
        }
    }
}

impl std::str::FromStr for CameraMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WIDE" => Ok(CameraMode::Wide),
            "ULTRAWIDE" => Ok(CameraMode::UltraWide),
            "ZOOM" => Ok(CameraMode::Zoom),
            other => Err(format!("unknown camera mode: {}", other)),
        }
    }
}

impl std::fmt::Display for CameraMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusState {
    Continuous,
    UserTriggered,
}

/// A distance reading and the label derived from it.
///
/// Only [`crate::distance::estimate`] builds non-placeholder values, so the
/// label can never drift from the number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    distance_meters: Option<f32>,
    label: String,
}

impl Measurement {
    pub(crate) fn new(distance_meters: Option<f32>, label: String) -> Self {
        Self {
            distance_meters,
            label,
        }
    }

    /// Placeholder shown before the lens has reported a usable focus state.
    pub fn pending() -> Self {
        Self::new(None, "DISTANCE: -".to_string())
    }

    /// `None` means focused at infinity.
    pub fn distance_meters(&self) -> Option<f32> {
        self.distance_meters
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfMode {
    Off,
    Auto,
    ContinuousPicture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfTrigger {
    Idle,
    Start,
    Cancel,
}

/// Autofocus state reported with every capture result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
    PassiveUnfocused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlashMode {
    Off,
    Single,
    Torch,
}

pub const METERING_WEIGHT_MAX: u32 = 1000;

/// Autofocus metering region, origin plus extent in sensor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeteringRegion {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

/// Output surface a request renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputTarget {
    Preview,
    StillSink(u64),
}

/// Settings carried by a single or repeating capture request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputTarget>,
    pub af_mode: AfMode,
    pub af_trigger: AfTrigger,
    pub af_regions: Vec<MeteringRegion>,
    pub crop_region: Option<SensorRect>,
    pub flash_mode: FlashMode,
    pub jpeg_orientation: Option<u32>,
}

impl CaptureRequest {
    pub fn new(template: RequestTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
            af_mode: AfMode::Off,
            af_trigger: AfTrigger::Idle,
            af_regions: Vec::new(),
            crop_region: None,
            flash_mode: FlashMode::Off,
            jpeg_orientation: None,
        }
    }

    pub fn with_target(mut self, target: OutputTarget) -> Self {
        self.targets.push(target);
        self
    }
}

/// Telemetry attached to a completed capture.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CaptureResult {
    pub af_state: Option<AfState>,
    pub focus_distance_diopters: Option<f32>,
}

/// Display rotation relative to the device's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviceRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DeviceRotation {
    pub fn degrees(&self) -> i32 {
        match self {
            DeviceRotation::Rotation0 => 0,
            DeviceRotation::Rotation90 => 90,
            DeviceRotation::Rotation180 => 180,
            DeviceRotation::Rotation270 => 270,
        }
    }
}
