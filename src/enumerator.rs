//! Camera unit discovery and classification.
//!
//! The main unit is the first rear-facing logical multi-camera (it can zoom
//! across its fused lenses); the ultra-wide unit is the remaining rear unit
//! with the shortest focal length.

use crate::errors::RangefinderError;
use crate::platform::CameraHardware;
use crate::types::{CameraMode, CameraUnit, LensFacing};

/// Outcome of classifying the available camera units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enumeration {
    pub main_unit: Option<CameraUnit>,
    pub ultra_wide_unit: Option<CameraUnit>,
}

impl Enumeration {
    /// No rear-facing unit at all. Rangefinding is impossible.
    pub fn is_empty(&self) -> bool {
        self.main_unit.is_none() && self.ultra_wide_unit.is_none()
    }

    /// ZOOM mode needs a main unit fusing at least two physical lenses.
    pub fn zoom_available(&self) -> bool {
        self.main_unit
            .as_ref()
            .is_some_and(|unit| unit.physical_lens_count >= 2)
    }

    pub fn camera_for(&self, mode: CameraMode) -> Option<&str> {
        self.unit_for(mode).map(|unit| unit.id.as_str())
    }

    pub fn unit_for(&self, mode: CameraMode) -> Option<&CameraUnit> {
        match mode {
            CameraMode::Wide => self.main_unit.as_ref().or(self.ultra_wide_unit.as_ref()),
            CameraMode::UltraWide => self.ultra_wide_unit.as_ref(),
            CameraMode::Zoom if self.zoom_available() => self.main_unit.as_ref(),
            CameraMode::Zoom => None,
        }
    }

    /// Mode to tag captures with while `camera_id` is open. Keeps `current`
    /// when that mode already resolves to the unit.
    pub fn mode_serving(&self, camera_id: &str, current: CameraMode) -> CameraMode {
        if self.camera_for(current) == Some(camera_id) {
            return current;
        }
        if self.main_unit.as_ref().is_some_and(|u| u.id == camera_id) {
            CameraMode::Wide
        } else if self.ultra_wide_unit.as_ref().is_some_and(|u| u.id == camera_id) {
            CameraMode::UltraWide
        } else {
            current
        }
    }

    pub fn unit(&self, camera_id: &str) -> Option<&CameraUnit> {
        [self.main_unit.as_ref(), self.ultra_wide_unit.as_ref()]
            .into_iter()
            .flatten()
            .find(|unit| unit.id == camera_id)
    }

    /// Modes offered to the user, in button order.
    pub fn available_modes(&self) -> Vec<CameraMode> {
        let mut modes = Vec::new();
        if self.ultra_wide_unit.is_some() {
            modes.push(CameraMode::UltraWide);
        }
        if !self.is_empty() {
            modes.push(CameraMode::Wide);
        }
        if self.zoom_available() {
            modes.push(CameraMode::Zoom);
        }
        modes
    }
}

/// Classify `units` (in driver order) into main and ultra-wide.
pub fn enumerate(units: &[CameraUnit]) -> Enumeration {
    let rear: Vec<&CameraUnit> = units
        .iter()
        .filter(|unit| unit.facing == LensFacing::Back)
        .collect();

    let logical_main = rear.iter().copied().find(|unit| unit.is_logical_multi_lens);

    let mut best_ultra_wide: Option<&CameraUnit> = None;
    for unit in rear.iter().copied() {
        if logical_main.is_some_and(|main| main.id == unit.id) {
            continue;
        }
        let Some(focal) = unit.min_focal_length_mm else {
            continue;
        };
        let shorter = best_ultra_wide
            .and_then(|best| best.min_focal_length_mm)
            .map_or(true, |best_focal| focal < best_focal);
        if shorter {
            best_ultra_wide = Some(unit);
        }
    }

    let main_unit = logical_main.or_else(|| rear.first().copied());
    let ultra_wide_unit = match (best_ultra_wide, main_unit) {
        (Some(uw), Some(main)) if uw.id == main.id => None,
        (uw, _) => uw,
    };

    let enumeration = Enumeration {
        main_unit: main_unit.cloned(),
        ultra_wide_unit: ultra_wide_unit.cloned(),
    };

    log::debug!(
        "main unit = {:?}, ultra-wide unit = {:?}, main physical lenses = {}",
        enumeration.main_unit.as_ref().map(|u| &u.id),
        enumeration.ultra_wide_unit.as_ref().map(|u| &u.id),
        enumeration
            .main_unit
            .as_ref()
            .map_or(0, |u| u.physical_lens_count)
    );
    enumeration
}

/// Reads every unit from the driver and classifies them.
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    /// Units whose characteristics cannot be read are skipped.
    pub fn scan(hardware: &dyn CameraHardware) -> Result<Enumeration, RangefinderError> {
        let ids = hardware.camera_ids()?;
        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            match hardware.characteristics(&id) {
                Ok(unit) => units.push(unit),
                Err(e) => log::warn!("Skipping camera {}: {}", id, e),
            }
        }
        Ok(enumerate(&units))
    }
}
