//! Scriptable in-process camera driver.
//!
//! By default every asynchronous call completes at once: the completion is
//! posted through the device's [`HardwareEvents`] sink, so it is still
//! delivered on the controller's worker, after the call returns. In deferred
//! mode completions are parked until [`SimulatedCamera::release_pending`].

use crate::errors::RangefinderError;
use crate::platform::{
    CameraHardware, CaptureTag, DeviceHandle, HardwareEvent, HardwareEvents, SessionHandle,
    SessionOutputs, StillSink,
};
use crate::testing::synthetic_data::{reference_units, synthetic_jpeg};
use crate::types::{AfState, CameraUnit, CaptureRequest, CaptureResult, Size};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Driver calls in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    OpenDevice(String),
    CreateStillSink(u64),
    ConfigureSession(u64),
    SetRepeating(u64),
    Capture(CaptureTag),
    StopRepeating(u64),
    AbortCaptures(u64),
    CloseSession(u64),
    ReleaseStillSink(u64),
    CloseDevice(u64),
}

/// Failures to inject. Each stays active until cleared.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// `open_device` returns an error.
    pub open_error: bool,
    /// Opening completes with `DeviceError`.
    pub device_error: bool,
    /// Configuration completes with `SessionConfigureFailed`.
    pub configure_fails: bool,
    /// The session is configured without the still sink.
    pub detach_still_target: bool,
    /// `set_repeating_request` returns an error.
    pub reject_repeating: bool,
    /// `capture` returns an error.
    pub reject_capture: bool,
    /// Still captures complete with `CaptureFailed`.
    pub still_fails: bool,
    /// Still captures deliver an empty buffer.
    pub null_image: bool,
    /// Units whose characteristics cannot be read.
    pub unreadable: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimResources {
    pub devices: usize,
    pub sessions: usize,
    pub sinks: usize,
    pub repeating: usize,
}

impl SimResources {
    pub fn is_empty(&self) -> bool {
        *self == SimResources::default()
    }
}

struct SimState {
    units: Vec<CameraUnit>,
    faults: SimFaults,
    deferred: bool,
    next_token: u64,
    events: Option<HardwareEvents>,
    pending: VecDeque<(HardwareEvents, HardwareEvent)>,
    devices: BTreeSet<u64>,
    sessions: BTreeSet<u64>,
    sinks: BTreeSet<u64>,
    /// Sessions with a repeating request running.
    repeating: BTreeSet<u64>,
    repeating_history: Vec<CaptureRequest>,
    captures: Vec<(CaptureTag, CaptureRequest)>,
    calls: Vec<SimCall>,
    trigger_result: CaptureResult,
    still_jpeg: Vec<u8>,
}

pub struct SimulatedCamera {
    state: Mutex<SimState>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(reference_units())
    }
}

impl SimulatedCamera {
    pub fn new(units: Vec<CameraUnit>) -> Self {
        Self {
            state: Mutex::new(SimState {
                units,
                faults: SimFaults::default(),
                deferred: false,
                next_token: 1,
                events: None,
                pending: VecDeque::new(),
                devices: BTreeSet::new(),
                sessions: BTreeSet::new(),
                sinks: BTreeSet::new(),
                repeating: BTreeSet::new(),
                repeating_history: Vec::new(),
                captures: Vec::new(),
                calls: Vec::new(),
                trigger_result: CaptureResult {
                    af_state: Some(AfState::FocusedLocked),
                    focus_distance_diopters: Some(0.5),
                },
                still_jpeg: synthetic_jpeg(320, 240),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_faults(&self, update: impl FnOnce(&mut SimFaults)) {
        update(&mut self.lock().faults);
    }

    pub fn clear_faults(&self) {
        self.lock().faults = SimFaults::default();
    }

    /// Park completions until `release_pending`.
    pub fn set_deferred(&self, deferred: bool) {
        self.lock().deferred = deferred;
    }

    /// Deliver every parked completion in order. Returns how many were sent.
    pub fn release_pending(&self) -> usize {
        let parked: Vec<_> = self.lock().pending.drain(..).collect();
        let count = parked.len();
        for (sink, event) in parked {
            sink.emit(event);
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Result reported when a focus trigger completes.
    pub fn set_trigger_result(&self, result: CaptureResult) {
        self.lock().trigger_result = result;
    }

    pub fn set_still_jpeg(&self, jpeg: Vec<u8>) {
        self.lock().still_jpeg = jpeg;
    }

    /// Post `event` through the most recently opened device's sink.
    pub fn emit(&self, event: HardwareEvent) -> bool {
        let sink = self.lock().events.clone();
        match sink {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    /// Deliver one preview telemetry frame.
    pub fn emit_preview(&self, af_state: Option<AfState>, focus_distance_diopters: Option<f32>) -> bool {
        self.emit(HardwareEvent::CaptureCompleted {
            tag: CaptureTag::Preview,
            result: CaptureResult {
                af_state,
                focus_distance_diopters,
            },
        })
    }

    pub fn resources(&self) -> SimResources {
        let state = self.lock();
        SimResources {
            devices: state.devices.len(),
            sessions: state.sessions.len(),
            sinks: state.sinks.len(),
            repeating: state.repeating.len(),
        }
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Every repeating request accepted so far.
    pub fn repeating_history(&self) -> Vec<CaptureRequest> {
        self.lock().repeating_history.clone()
    }

    pub fn last_repeating(&self) -> Option<CaptureRequest> {
        self.lock().repeating_history.last().cloned()
    }

    pub fn captures(&self) -> Vec<(CaptureTag, CaptureRequest)> {
        self.lock().captures.clone()
    }

    fn token(state: &mut SimState) -> u64 {
        let token = state.next_token;
        state.next_token += 1;
        token
    }

    fn complete(state: &mut SimState, event: HardwareEvent) {
        let Some(sink) = state.events.clone() else {
            return;
        };
        if state.deferred {
            state.pending.push_back((sink, event));
        } else {
            sink.emit(event);
        }
    }
}

impl CameraHardware for SimulatedCamera {
    fn camera_ids(&self) -> Result<Vec<String>, RangefinderError> {
        Ok(self.lock().units.iter().map(|unit| unit.id.clone()).collect())
    }

    fn characteristics(&self, camera_id: &str) -> Result<CameraUnit, RangefinderError> {
        let state = self.lock();
        if state.faults.unreadable.contains(camera_id) {
            return Err(RangefinderError::DeviceUnavailable(format!(
                "characteristics of {} unreadable",
                camera_id
            )));
        }
        state
            .units
            .iter()
            .find(|unit| unit.id == camera_id)
            .cloned()
            .ok_or_else(|| RangefinderError::DeviceUnavailable(format!("no camera {}", camera_id)))
    }

    fn open_device(&self, camera_id: &str, events: HardwareEvents) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::OpenDevice(camera_id.to_string()));
        if state.faults.open_error {
            return Err(RangefinderError::DeviceUnavailable("camera in use".to_string()));
        }
        if !state.units.iter().any(|unit| unit.id == camera_id) {
            return Err(RangefinderError::DeviceUnavailable(format!("no camera {}", camera_id)));
        }

        state.events = Some(events);
        if state.faults.device_error {
            Self::complete(&mut state, HardwareEvent::DeviceError("ERROR_CAMERA_DEVICE".to_string()));
            return Ok(());
        }
        let token = Self::token(&mut state);
        state.devices.insert(token);
        Self::complete(
            &mut state,
            HardwareEvent::DeviceOpened(DeviceHandle {
                camera_id: camera_id.to_string(),
                token,
            }),
        );
        Ok(())
    }

    fn create_still_sink(
        &self,
        device: &DeviceHandle,
        size: Size,
        max_images: u32,
    ) -> Result<StillSink, RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::CreateStillSink(device.token));
        if !state.devices.contains(&device.token) {
            return Err(RangefinderError::DeviceUnavailable("device closed".to_string()));
        }
        let token = Self::token(&mut state);
        state.sinks.insert(token);
        Ok(StillSink {
            token,
            size,
            max_images,
        })
    }

    fn configure_session(
        &self,
        device: &DeviceHandle,
        outputs: &SessionOutputs,
    ) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::ConfigureSession(device.token));
        if !state.devices.contains(&device.token) || !state.sinks.contains(&outputs.still_sink.token) {
            return Err(RangefinderError::ConfigurationFailed(
                "unknown device or output".to_string(),
            ));
        }
        if state.faults.configure_fails {
            Self::complete(
                &mut state,
                HardwareEvent::SessionConfigureFailed("stream combination unsupported".to_string()),
            );
            return Ok(());
        }
        let token = Self::token(&mut state);
        state.sessions.insert(token);
        let still_target_attached = !state.faults.detach_still_target;
        Self::complete(
            &mut state,
            HardwareEvent::SessionConfigured {
                session: SessionHandle { token },
                still_target_attached,
            },
        );
        Ok(())
    }

    fn set_repeating_request(
        &self,
        session: &SessionHandle,
        request: &CaptureRequest,
    ) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::SetRepeating(session.token));
        if state.faults.reject_repeating {
            return Err(RangefinderError::ConfigurationFailed("request rejected".to_string()));
        }
        if !state.sessions.contains(&session.token) {
            return Err(RangefinderError::ConfigurationFailed("session closed".to_string()));
        }
        state.repeating.insert(session.token);
        state.repeating_history.push(request.clone());
        Ok(())
    }

    fn capture(
        &self,
        session: &SessionHandle,
        request: &CaptureRequest,
        tag: CaptureTag,
    ) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::Capture(tag));
        if state.faults.reject_capture {
            return Err(RangefinderError::CaptureFailed("request rejected".to_string()));
        }
        if !state.sessions.contains(&session.token) {
            return Err(RangefinderError::CaptureFailed("session closed".to_string()));
        }
        state.captures.push((tag, request.clone()));

        match tag {
            CaptureTag::FocusTrigger => {
                let result = state.trigger_result;
                Self::complete(&mut state, HardwareEvent::CaptureCompleted { tag, result });
            }
            CaptureTag::Still if state.faults.still_fails => {
                Self::complete(
                    &mut state,
                    HardwareEvent::CaptureFailed {
                        tag,
                        reason: "frame dropped".to_string(),
                    },
                );
            }
            CaptureTag::Still => {
                Self::complete(
                    &mut state,
                    HardwareEvent::CaptureCompleted {
                        tag,
                        result: CaptureResult::default(),
                    },
                );
                let image = if state.faults.null_image {
                    None
                } else {
                    Some(state.still_jpeg.clone())
                };
                Self::complete(&mut state, HardwareEvent::StillImageAvailable(image));
            }
            CaptureTag::Preview => {}
        }
        Ok(())
    }

    fn stop_repeating(&self, session: &SessionHandle) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::StopRepeating(session.token));
        state.repeating.remove(&session.token);
        Ok(())
    }

    fn abort_captures(&self, session: &SessionHandle) -> Result<(), RangefinderError> {
        let mut state = self.lock();
        state.calls.push(SimCall::AbortCaptures(session.token));
        Ok(())
    }

    fn close_session(&self, session: SessionHandle) {
        let mut state = self.lock();
        state.calls.push(SimCall::CloseSession(session.token));
        state.repeating.remove(&session.token);
        state.sessions.remove(&session.token);
    }

    fn release_still_sink(&self, sink: StillSink) {
        let mut state = self.lock();
        state.calls.push(SimCall::ReleaseStillSink(sink.token));
        state.sinks.remove(&sink.token);
    }

    fn close_device(&self, device: DeviceHandle) {
        let mut state = self.lock();
        state.calls.push(SimCall::CloseDevice(device.token));
        state.devices.remove(&device.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn recording_sink() -> (HardwareEvents, Arc<StdMutex<Vec<HardwareEvent>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink = HardwareEvents::new(1, move |_, event| {
            sink_seen.lock().unwrap().push(event);
            true
        });
        (sink, seen)
    }

    #[test]
    fn test_open_completes_immediately() {
        let camera = SimulatedCamera::default();
        let (sink, seen) = recording_sink();
        camera.open_device("0", sink).unwrap();
        assert!(matches!(
            seen.lock().unwrap()[0],
            HardwareEvent::DeviceOpened(ref handle) if handle.camera_id == "0"
        ));
        assert_eq!(camera.resources().devices, 1);
    }

    #[test]
    fn test_deferred_mode_parks_completions() {
        let camera = SimulatedCamera::default();
        camera.set_deferred(true);
        let (sink, seen) = recording_sink();
        camera.open_device("0", sink).unwrap();
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(camera.pending_count(), 1);
        assert_eq!(camera.release_pending(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_open_error_fault() {
        let camera = SimulatedCamera::default();
        camera.update_faults(|f| f.open_error = true);
        let (sink, _) = recording_sink();
        assert!(camera.open_device("0", sink).is_err());
        assert!(camera.resources().is_empty());
    }
}
