//! Focus telemetry to subject distance.
//!
//! Lens focus distance is reported in diopters, the reciprocal of the focus
//! distance in meters. Zero diopters (or no report at all) means the lens is
//! focused at infinity.

use crate::types::{AfState, Measurement};

pub const INFINITY_LABEL: &str = "DISTANCE: ∞";

/// Convert a focus distance in diopters into a [`Measurement`].
pub fn estimate(focus_distance_diopters: Option<f32>) -> Measurement {
    match focus_distance_diopters {
        Some(diopters) if diopters > 0.0 => {
            let meters = 1.0 / diopters;
            Measurement::new(Some(meters), format!("DISTANCE: {:.2} m", meters))
        }
        _ => Measurement::new(None, INFINITY_LABEL.to_string()),
    }
}

/// Whether a result with this AF state may update the displayed distance.
///
/// Only settled states count; while the lens is still scanning the last
/// reading stays on screen.
pub fn is_settled(af_state: Option<AfState>) -> bool {
    matches!(
        af_state,
        Some(AfState::FocusedLocked) | Some(AfState::PassiveFocused)
    )
}
