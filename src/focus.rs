//! Autofocus coordination: continuous focus by default, one-shot trigger on tap.
//!
//! The coordinator edits the live repeating request in place. A tap moves it
//! to AUTO with a START trigger for a single request; the completion of that
//! request puts the live request back to CONTINUOUS_PICTURE with an IDLE
//! trigger, keeping the metering region.

use crate::distance;
use crate::types::{
    AfMode, AfTrigger, CaptureRequest, CaptureResult, FocusState, Measurement, MeteringRegion,
    OutputTarget, RequestTemplate, SensorRect, METERING_WEIGHT_MAX,
};

/// Metering region covering the central `1/divisor` of the active array in
/// each dimension.
pub fn center_metering_region(active_array: SensorRect, divisor: i32) -> MeteringRegion {
    let divisor = divisor.max(1);
    let width = active_array.width() / divisor;
    let height = active_array.height() / divisor;
    MeteringRegion {
        x: active_array.center_x() - width / 2,
        y: active_array.center_y() - height / 2,
        width,
        height,
        weight: METERING_WEIGHT_MAX,
    }
}

/// Repeating preview request a fresh session starts with.
pub fn initial_preview_request(
    active_array: SensorRect,
    region: MeteringRegion,
    has_auto_focus: bool,
) -> CaptureRequest {
    let mut request = CaptureRequest::new(RequestTemplate::Preview).with_target(OutputTarget::Preview);
    request.af_mode = if has_auto_focus {
        AfMode::ContinuousPicture
    } else {
        AfMode::Off
    };
    request.af_regions = vec![region];
    request.crop_region = Some(active_array);
    request
}

/// Result of a tap-to-focus attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Issue this request once; the live request has been moved to AUTO.
    Started(CaptureRequest),
    /// The lens cannot focus; nothing was changed.
    FixedFocus,
}

#[derive(Debug, Clone)]
pub struct AutofocusCoordinator {
    state: FocusState,
    region_divisor: i32,
}

impl AutofocusCoordinator {
    pub fn new(region_divisor: i32) -> Self {
        Self {
            state: FocusState::Continuous,
            region_divisor,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    pub fn region(&self, active_array: SensorRect) -> MeteringRegion {
        center_metering_region(active_array, self.region_divisor)
    }

    /// Back to continuous focus without touching any request.
    pub fn reset(&mut self) {
        self.state = FocusState::Continuous;
    }

    pub fn begin_trigger(
        &mut self,
        has_auto_focus: bool,
        active_array: SensorRect,
        live: &mut CaptureRequest,
    ) -> TriggerOutcome {
        if !has_auto_focus {
            return TriggerOutcome::FixedFocus;
        }

        live.af_regions = vec![self.region(active_array)];
        live.af_mode = AfMode::Auto;
        live.af_trigger = AfTrigger::Start;
        self.state = FocusState::UserTriggered;
        TriggerOutcome::Started(live.clone())
    }

    /// Restore continuous focus on the live request after the trigger request
    /// completed (or failed). Returns the request to resume repeating.
    pub fn complete_trigger(&mut self, live: &mut CaptureRequest) -> CaptureRequest {
        live.af_mode = AfMode::ContinuousPicture;
        live.af_trigger = AfTrigger::Idle;
        self.state = FocusState::Continuous;
        live.clone()
    }

    /// Feed one capture result. Yields a new measurement only for settled
    /// AF states.
    pub fn observe(&mut self, result: &CaptureResult) -> Option<Measurement> {
        if !distance::is_settled(result.af_state) {
            return None;
        }
        if self.state == FocusState::UserTriggered {
            log::debug!("Autofocus settled after trigger: {:?}", result.af_state);
            self.state = FocusState::Continuous;
        }
        Some(distance::estimate(result.focus_distance_diopters))
    }
}
