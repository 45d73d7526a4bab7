//! Worker-side transitions: hardware jobs and the single event handler.
//!
//! Everything here runs on the camera worker with the core locked, except
//! still-image processing, which releases the lock while it decodes, draws
//! and stores.

use super::state::{ActiveSession, Phase};
use super::{Core, Shared};
use crate::assert_invariant;
use crate::capture;
use crate::errors::RangefinderError;
use crate::focus::{self, TriggerOutcome};
use crate::platform::{
    CaptureTag, DeviceHandle, HardwareEvent, HardwareEvents, SessionHandle, SessionOutputs,
};
use crate::storage::SavedCapture;
use crate::types::{AfTrigger, CameraUnit, CaptureRequest, CaptureResult, FlashMode, FocusState};
use crate::ui::{FocusIndicator, UiEvent};
use crate::zoom;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

pub const RESOURCE_INVARIANT: &str = "Session resources exist all together or not at all";

/// The repeating request as submitted: a pending one-shot START never repeats.
fn repeating_submission(live: &CaptureRequest) -> CaptureRequest {
    let mut request = live.clone();
    if request.af_trigger == AfTrigger::Start {
        request.af_trigger = AfTrigger::Idle;
    }
    request
}

/// A hardware event on its way to the worker. Whatever is still inside when
/// it drops (the worker stopped or discarded the job) is released as stale.
struct Parcel {
    event: Option<HardwareEvent>,
    generation: u64,
    target: Weak<Shared>,
}

impl Parcel {
    fn deliver(mut self) {
        if let (Some(shared), Some(event)) = (self.target.upgrade(), self.event.take()) {
            shared.handle_event(self.generation, event);
        }
    }
}

impl Drop for Parcel {
    fn drop(&mut self) {
        if let (Some(event), Some(shared)) = (self.event.take(), self.target.upgrade()) {
            shared.release_stale(event);
        }
    }
}

impl Shared {
    /// Event sink for the open sequence `generation`. Holds the shared state
    /// weakly so a dropped controller does not outlive its driver.
    ///
    /// Once the worker that opened the device has stopped, the sequence is
    /// stale by construction; handles arriving that late are released by the
    /// undelivered [`Parcel`].
    fn events_for(self: &Arc<Self>, core: &Core, generation: u64) -> Option<HardwareEvents> {
        let worker = core.worker.clone()?;
        let weak = Arc::downgrade(self);
        Some(HardwareEvents::new(generation, move |generation, event| {
            let parcel = Parcel {
                event: Some(event),
                generation,
                target: weak.clone(),
            };
            worker.post(Box::new(move || parcel.deliver()))
        }))
    }

    pub(crate) fn enter_opening(&self, core: &mut Core, unit: CameraUnit) -> u64 {
        core.generation += 1;
        core.sequence_pending = true;
        core.af.reset();
        log::info!("Opening camera {}", unit.id);
        core.phase = Phase::Opening { unit };
        core.generation
    }

    pub(crate) fn issue_open(self: &Arc<Self>, generation: u64) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        self.open_locked(core, generation);
        self.settle(core);
    }

    fn open_locked(self: &Arc<Self>, core: &mut Core, generation: u64) {
        if core.generation != generation {
            log::debug!("Open {} superseded before it started", generation);
            return;
        }
        let Phase::Opening { unit } = &core.phase else {
            return;
        };
        let camera_id = unit.id.clone();
        let Some(events) = self.events_for(core, generation) else {
            self.fail(
                core,
                RangefinderError::DeviceUnavailable("Camera worker stopped".to_string()),
            );
            return;
        };
        if let Err(e) = self.hardware.open_device(&camera_id, events) {
            self.fail(
                core,
                RangefinderError::DeviceUnavailable(format!(
                    "Couldn't open camera {}: {}",
                    camera_id,
                    e.detail()
                )),
            );
        }
    }

    /// Undo an open that never reached the worker.
    pub(crate) fn abandon(&self, generation: u64) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        if core.generation == generation && matches!(core.phase, Phase::Opening { .. }) {
            core.phase = Phase::Closed;
            core.sequence_pending = false;
            self.settle(core);
        }
    }

    pub(crate) fn switch_to(self: &Arc<Self>, unit: CameraUnit) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        self.teardown(core);
        let generation = self.enter_opening(core, unit);
        self.open_locked(core, generation);
        self.settle(core);
    }

    /// Release whatever the current phase holds and land in CLOSED.
    ///
    /// Order: stop repeating, abort captures, close the session, release the
    /// still sink, close the device. Missing resources are skipped.
    pub(crate) fn teardown(&self, core: &mut Core) {
        let phase = std::mem::replace(&mut core.phase, Phase::Closing);
        core.generation += 1;

        match phase {
            Phase::Ready(active) => {
                if let Err(e) = self.hardware.stop_repeating(&active.session) {
                    log::warn!("stop_repeating on {} failed: {}", active.unit.id, e);
                }
                if let Err(e) = self.hardware.abort_captures(&active.session) {
                    log::warn!("abort_captures on {} failed: {}", active.unit.id, e);
                }
                self.hardware.close_session(active.session);
                self.hardware.release_still_sink(active.still_sink);
                self.hardware.close_device(active.device);
                log::info!("Camera {} closed", active.unit.id);
            }
            Phase::Configuring {
                unit,
                device,
                still_sink,
            } => {
                self.hardware.release_still_sink(still_sink);
                self.hardware.close_device(device);
                log::info!("Camera {} closed before its session was ready", unit.id);
            }
            Phase::Opening { unit } => {
                log::debug!("Open of camera {} cancelled", unit.id);
            }
            Phase::Closed | Phase::Closing | Phase::Error(_) => {}
        }

        core.sequence_pending = false;
        if core.af.state() == FocusState::UserTriggered {
            self.ui.dispatch(UiEvent::FocusIndicator(FocusIndicator::FadeOut {
                delay_ms: 0,
                duration_ms: self.config.focus.indicator_fade_duration_ms,
            }));
        }
        core.af.reset();
        if core.flash_on {
            core.flash_on = false;
            self.ui.dispatch(UiEvent::FlashChanged(false));
        }
        if core.capture.take().is_some() {
            log::info!("In-flight capture aborted by close");
            self.ui.dispatch(UiEvent::CaptureInProgress(false));
        }
        core.phase = Phase::Closed;
    }

    /// Tear down into ERROR and surface one message.
    fn fail(&self, core: &mut Core, error: RangefinderError) {
        self.teardown(core);
        core.phase = Phase::Error(error.kind());
        self.ui.error(&error);
    }

    /// Check the resource invariant and publish a changed state.
    pub(crate) fn settle(&self, core: &mut Core) {
        let census = core.phase.census();
        assert_invariant!(
            census.is_all_or_none() || core.phase.is_transitional(),
            RESOURCE_INVARIANT,
            "session"
        );
        self.publish(core);
    }

    pub(crate) fn publish(&self, core: &mut Core) {
        let state = core.phase.state();
        if state != core.published {
            core.published = state;
            log::debug!("Session state {}", state);
            self.ui.dispatch(UiEvent::SessionStateChanged(state));
        }
    }

    pub(crate) fn handle_event(&self, generation: u64, event: HardwareEvent) {
        let mut guard = self.lock_core();
        if generation != guard.generation {
            drop(guard);
            self.release_stale(event);
            return;
        }

        let core = &mut *guard;
        match event {
            HardwareEvent::DeviceOpened(device) => self.on_device_opened(core, device),
            HardwareEvent::DeviceDisconnected => self.fail(
                core,
                RangefinderError::DeviceUnavailable("Camera disconnected".to_string()),
            ),
            HardwareEvent::DeviceError(reason) => self.fail(
                core,
                RangefinderError::DeviceUnavailable(format!("Camera error: {}", reason)),
            ),
            HardwareEvent::SessionConfigured {
                session,
                still_target_attached,
            } => self.on_session_configured(core, session, still_target_attached),
            HardwareEvent::SessionConfigureFailed(reason) => {
                self.fail(core, RangefinderError::ConfigurationFailed(reason))
            }
            HardwareEvent::CaptureCompleted { tag, result } => {
                self.on_capture_completed(core, tag, &result)
            }
            HardwareEvent::CaptureFailed { tag, reason } => {
                self.on_capture_failed(core, tag, &reason)
            }
            HardwareEvent::StillImageAvailable(image) => {
                self.on_still_image(guard, image);
                return;
            }
        }
        self.settle(core);
    }

    /// Events from a superseded open sequence: release any handle they carry.
    fn release_stale(&self, event: HardwareEvent) {
        match event {
            HardwareEvent::DeviceOpened(device) => {
                log::debug!("Releasing stale device {}", device.camera_id);
                self.hardware.close_device(device);
            }
            HardwareEvent::SessionConfigured { session, .. } => {
                log::debug!("Releasing stale session {}", session.token);
                self.hardware.close_session(session);
            }
            HardwareEvent::StillImageAvailable(_) => {
                log::debug!("Discarding still image from a closed session");
            }
            other => log::trace!("Ignoring stale event {:?}", other),
        }
    }

    fn on_device_opened(&self, core: &mut Core, device: DeviceHandle) {
        let unit = match &core.phase {
            Phase::Opening { unit } => unit.clone(),
            _ => {
                self.hardware.close_device(device);
                return;
            }
        };

        let still_sink = match self.hardware.create_still_sink(
            &device,
            unit.still_size(),
            self.config.camera.still_max_images,
        ) {
            Ok(sink) => sink,
            Err(e) => {
                self.hardware.close_device(device);
                self.fail(
                    core,
                    RangefinderError::ConfigurationFailed(format!(
                        "still sink unavailable: {}",
                        e.detail()
                    )),
                );
                return;
            }
        };

        let outputs = SessionOutputs {
            preview_size: unit.preview_size(),
            still_sink,
        };
        log::debug!(
            "Camera {} open, configuring preview {}x{} and still {}x{}",
            unit.id,
            outputs.preview_size.width,
            outputs.preview_size.height,
            still_sink.size.width,
            still_sink.size.height
        );
        let configured = self.hardware.configure_session(&device, &outputs);
        core.phase = Phase::Configuring {
            unit,
            device,
            still_sink,
        };
        if let Err(e) = configured {
            self.fail(core, RangefinderError::ConfigurationFailed(e.detail().to_string()));
        }
    }

    fn on_session_configured(
        &self,
        core: &mut Core,
        session: SessionHandle,
        still_target_attached: bool,
    ) {
        let (unit, device, still_sink) = match std::mem::replace(&mut core.phase, Phase::Closing) {
            Phase::Configuring {
                unit,
                device,
                still_sink,
            } => (unit, device, still_sink),
            other => {
                core.phase = other;
                self.hardware.close_session(session);
                return;
            }
        };

        let region = core.af.region(unit.active_array);
        let mut repeating = focus::initial_preview_request(unit.active_array, region, unit.has_auto_focus);
        if core.zoom.is_zoomed() {
            repeating.crop_region = Some(zoom::compute_crop_rect(unit.active_array, core.zoom.factor()));
        }
        let submission = repeating_submission(&repeating);

        if !still_target_attached {
            log::warn!("Camera {} session has no still target; capture disabled", unit.id);
        }
        log::info!("Camera {} session ready", unit.id);
        core.phase = Phase::Ready(ActiveSession {
            unit,
            device,
            session,
            repeating,
            still_sink,
            still_target_attached,
        });

        if let Err(e) = self.hardware.set_repeating_request(&session, &submission) {
            self.fail(
                core,
                RangefinderError::ConfigurationFailed(format!("preview rejected: {}", e.detail())),
            );
            return;
        }
        core.sequence_pending = false;
    }

    fn on_capture_completed(&self, core: &mut Core, tag: CaptureTag, result: &CaptureResult) {
        match tag {
            CaptureTag::Preview => self.observe(core, result),
            CaptureTag::FocusTrigger => {
                self.observe(core, result);
                self.finish_focus_trigger(core);
            }
            CaptureTag::Still => log::debug!("Still exposure complete"),
        }
    }

    fn on_capture_failed(&self, core: &mut Core, tag: CaptureTag, reason: &str) {
        match tag {
            CaptureTag::Preview => log::debug!("Preview frame dropped: {}", reason),
            CaptureTag::FocusTrigger => {
                log::warn!("Focus trigger failed: {}", reason);
                self.finish_focus_trigger(core);
            }
            CaptureTag::Still => {
                log::error!("Still capture failed: {}", reason);
                if core.capture.is_some() {
                    self.finish_capture(
                        core,
                        Err(RangefinderError::CaptureFailed(
                            "Failed to capture image".to_string(),
                        )),
                    );
                }
            }
        }
    }

    /// Feed telemetry to the autofocus coordinator; publish settled readings.
    fn observe(&self, core: &mut Core, result: &CaptureResult) {
        if !matches!(core.phase, Phase::Ready(_)) {
            return;
        }
        if let Some(measurement) = core.af.observe(result) {
            if measurement != core.measurement {
                core.measurement = measurement.clone();
                self.ui.dispatch(UiEvent::DistanceUpdated(measurement));
            }
        }
    }

    pub(crate) fn apply_zoom(&self, factor: f32) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let Phase::Ready(active) = &mut core.phase else {
            log::debug!("Zoom {} dropped: session not ready", factor);
            return;
        };

        let previous = active.repeating.crop_region;
        active.repeating.crop_region = Some(zoom::compute_crop_rect(active.unit.active_array, factor));
        match self
            .hardware
            .set_repeating_request(&active.session, &repeating_submission(&active.repeating))
        {
            Ok(()) => {
                core.zoom.set(factor);
                log::debug!("Zoom {}x crop {:?}", factor, active.repeating.crop_region);
            }
            Err(e) => {
                active.repeating.crop_region = previous;
                log::warn!("Crop update rejected, keeping previous crop: {}", e);
            }
        }
    }

    pub(crate) fn start_focus_trigger(&self) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let Phase::Ready(active) = &mut core.phase else {
            return;
        };

        let request = match core.af.begin_trigger(
            active.unit.has_auto_focus,
            active.unit.active_array,
            &mut active.repeating,
        ) {
            TriggerOutcome::Started(request) => request,
            TriggerOutcome::FixedFocus => {
                log::debug!("Camera {} is fixed-focus; trigger skipped", active.unit.id);
                return;
            }
        };

        self.ui.dispatch(UiEvent::FocusIndicator(FocusIndicator::Show));
        let submitted = self
            .hardware
            .capture(&active.session, &request, CaptureTag::FocusTrigger);
        if let Err(e) = submitted {
            log::warn!("Focus trigger rejected: {}", e);
            self.finish_focus_trigger(core);
        }
    }

    /// Fade the indicator and put the live request back to continuous focus.
    fn finish_focus_trigger(&self, core: &mut Core) {
        let Phase::Ready(active) = &mut core.phase else {
            return;
        };
        let request = core.af.complete_trigger(&mut active.repeating);
        self.ui.dispatch(UiEvent::FocusIndicator(FocusIndicator::FadeOut {
            delay_ms: self.config.focus.indicator_fade_delay_ms,
            duration_ms: self.config.focus.indicator_fade_duration_ms,
        }));
        if let Err(e) = self.hardware.set_repeating_request(&active.session, &request) {
            log::warn!("Couldn't resume continuous focus: {}", e);
        }
    }

    pub(crate) fn toggle_torch(&self) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        let Phase::Ready(active) = &mut core.phase else {
            return;
        };

        let enable = !core.flash_on;
        let previous = active.repeating.flash_mode;
        active.repeating.flash_mode = if enable { FlashMode::Torch } else { FlashMode::Off };
        match self
            .hardware
            .set_repeating_request(&active.session, &repeating_submission(&active.repeating))
        {
            Ok(()) => {
                core.flash_on = enable;
                log::info!("Torch {}", if enable { "on" } else { "off" });
                self.ui.dispatch(UiEvent::FlashChanged(enable));
            }
            Err(e) => {
                active.repeating.flash_mode = previous;
                log::warn!("Torch request rejected: {}", e);
                self.ui.warning("Couldn't switch the flashlight");
            }
        }
    }

    pub(crate) fn issue_still(&self) {
        let mut guard = self.lock_core();
        let core = &mut *guard;
        if core.capture.is_none() {
            return;
        }

        let submitted = match &core.phase {
            Phase::Ready(active) => {
                let orientation = capture::jpeg_orientation(
                    active.unit.sensor_orientation,
                    core.rotation,
                    active.unit.facing,
                );
                let request = capture::build_still_request(
                    &active.repeating,
                    &active.still_sink,
                    core.flash_on,
                    orientation,
                );
                log::debug!("Still capture, JPEG orientation {}", orientation);
                self.hardware
                    .capture(&active.session, &request, CaptureTag::Still)
                    .map_err(|e| {
                        log::error!("Still capture rejected: {}", e);
                        RangefinderError::CaptureFailed("Failed to capture image".to_string())
                    })
            }
            _ => Err(RangefinderError::DeviceUnavailable("Camera not ready".to_string())),
        };

        if let Err(e) = submitted {
            self.finish_capture(core, Err(e));
        }
    }

    /// Decode, label and store the still that answers the pending capture.
    fn on_still_image(&self, mut guard: std::sync::MutexGuard<'_, Core>, image: Option<Vec<u8>>) {
        let Some(pending) = guard.capture.clone() else {
            log::debug!("Discarding still image with no capture in flight");
            return;
        };
        let Some(jpeg) = image else {
            self.finish_capture(
                &mut guard,
                Err(RangefinderError::CaptureFailed(
                    "Camera returned no image".to_string(),
                )),
            );
            return;
        };
        drop(guard);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            capture::render_capture(&jpeg, &pending.measurement, &self.config.capture)
                .and_then(|labeled| self.store.save(&labeled, &pending.measurement, pending.mode))
        }))
        .unwrap_or_else(|_| {
            log::error!("Still processing panicked; capture abandoned");
            Err(RangefinderError::EncodeFailed(
                "image processing failed".to_string(),
            ))
        });

        let mut guard = self.lock_core();
        if guard.capture.is_some() {
            self.finish_capture(&mut guard, outcome);
        } else if let Ok(saved) = outcome {
            log::info!("Capture {} saved after its session closed", saved.id);
        }
    }

    fn finish_capture(&self, core: &mut Core, outcome: Result<SavedCapture, RangefinderError>) {
        core.capture = None;
        self.ui.dispatch(UiEvent::CaptureInProgress(false));
        match outcome {
            Ok(saved) => {
                log::info!("Saved capture {} ({})", saved.id, saved.distance_label);
                self.ui.dispatch(UiEvent::CaptureSaved(saved));
                self.ui.info("Measurement saved!");
            }
            Err(e) => self.ui.error(&e),
        }
    }
}
