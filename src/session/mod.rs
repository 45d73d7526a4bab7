//! Session Controller: owns the camera session and every piece of state that
//! hangs off it.
//!
//! Public methods run on the caller's (UI) thread. They validate the request
//! against a locked copy of the state, then queue the hardware work on the
//! dedicated camera worker. Hardware callbacks come back to the same worker
//! as [`HardwareEvent`](crate::platform::HardwareEvent)s and are applied by a
//! single transition handler. Nothing the UI sees is a live field: it gets
//! [`UiEvent`](crate::ui::UiEvent)s and [`SessionSnapshot`]s.
//!
//! There is no watchdog. A driver that never calls back leaves the session
//! parked in its current state until `close()` or `pause()`.

mod handler;
pub mod state;
mod worker;

pub use handler::RESOURCE_INVARIANT;
pub use state::{ResourceCensus, SessionSnapshot, SessionState};

use crate::config::RangefinderConfig;
use crate::enumerator::{DeviceEnumerator, Enumeration};
use crate::errors::{ErrorKind, RangefinderError};
use crate::focus::AutofocusCoordinator;
use crate::permissions::PermissionGate;
use crate::platform::CameraHardware;
use crate::storage::MeasurementStore;
use crate::types::{CameraMode, CameraUnit, DeviceRotation, FocusState, Measurement};
use crate::ui::{self, UiDispatcher, UiEvent, UiEventReceiver};
use crate::zoom::ZoomState;
use state::Phase;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use worker::{Worker, WorkerHandle};

pub const WORKER_THREAD_NAME: &str = "rangefinder-camera-worker";

pub const ULTRAWIDE_FIXED_FOCUS_WARNING: &str =
    "Ultrawide lens has fixed focus.\nMeasurement may be inaccurate.";
pub const FIXED_FOCUS_TAP_WARNING: &str = "This lens has fixed focus.\nNothing to focus.";

const FLUSH_ROUNDS: usize = 64;

/// A still capture between the user's request and the saved file.
#[derive(Debug, Clone)]
pub(crate) struct PendingCapture {
    /// Reading on screen when the user pressed capture.
    pub measurement: Measurement,
    pub mode: CameraMode,
}

pub(crate) struct Core {
    pub phase: Phase,
    /// Bumped on every teardown and every open; callbacks carry the value
    /// current when their device was opened.
    pub generation: u64,
    /// An open, close or switch has been accepted and not yet resolved.
    pub sequence_pending: bool,
    /// Public operations are accepted.
    pub running: bool,
    pub worker: Option<WorkerHandle>,
    pub enumeration: Enumeration,
    pub mode: CameraMode,
    pub zoom: ZoomState,
    pub af: AutofocusCoordinator,
    pub flash_on: bool,
    pub measurement: Measurement,
    pub rotation: DeviceRotation,
    pub capture: Option<PendingCapture>,
    pub published: SessionState,
}

pub(crate) struct Shared {
    core: Mutex<Core>,
    hardware: Arc<dyn CameraHardware>,
    store: Arc<dyn MeasurementStore>,
    permissions: Arc<dyn PermissionGate>,
    ui: UiDispatcher,
    config: RangefinderConfig,
    worker: Mutex<Option<Worker>>,
}

impl Shared {
    pub(crate) fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn paused() -> RangefinderError {
    RangefinderError::DeviceUnavailable("Camera paused".to_string())
}

fn not_ready() -> RangefinderError {
    RangefinderError::DeviceUnavailable("Camera not ready".to_string())
}

fn busy(what: &str) -> RangefinderError {
    RangefinderError::SessionBusy(format!("{} rejected: another camera sequence is in flight", what))
}

/// Queue `job` on `worker` with a strong reference to the shared state.
fn post<F>(shared: &Arc<Shared>, worker: &WorkerHandle, job: F) -> Result<(), RangefinderError>
where
    F: FnOnce(&Arc<Shared>) + Send + 'static,
{
    let target = Arc::clone(shared);
    if worker.post(Box::new(move || job(&target))) {
        Ok(())
    } else {
        Err(paused())
    }
}

pub struct SessionController {
    shared: Arc<Shared>,
}

impl SessionController {
    /// Build a controller. The returned receiver is the UI end of the
    /// redispatch channel.
    pub fn new(
        hardware: Arc<dyn CameraHardware>,
        store: Arc<dyn MeasurementStore>,
        permissions: Arc<dyn PermissionGate>,
        config: RangefinderConfig,
    ) -> (Self, UiEventReceiver) {
        let (dispatcher, receiver) = ui::channel();
        (Self::with_dispatcher(hardware, store, permissions, config, dispatcher), receiver)
    }

    pub fn with_dispatcher(
        hardware: Arc<dyn CameraHardware>,
        store: Arc<dyn MeasurementStore>,
        permissions: Arc<dyn PermissionGate>,
        config: RangefinderConfig,
        dispatcher: UiDispatcher,
    ) -> Self {
        let core = Core {
            phase: Phase::Closed,
            generation: 0,
            sequence_pending: false,
            running: false,
            worker: None,
            enumeration: Enumeration::default(),
            mode: config.camera.default_mode,
            zoom: ZoomState::default(),
            af: AutofocusCoordinator::new(config.focus.region_divisor),
            flash_on: false,
            measurement: Measurement::pending(),
            rotation: DeviceRotation::default(),
            capture: None,
            published: SessionState::Closed,
        };
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(core),
                hardware,
                store,
                permissions,
                ui: dispatcher,
                config,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Start the camera worker and enumerate the camera units.
    ///
    /// An enumeration without a rear unit is returned as-is, after one
    /// user-visible message: rangefinding is impossible but the host keeps
    /// running.
    pub fn resume(&self) -> Result<Enumeration, RangefinderError> {
        {
            let mut slot = self.shared.worker.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                let worker = Worker::spawn(WORKER_THREAD_NAME)?;
                let mut core = self.shared.lock_core();
                core.worker = Some(worker.handle());
                core.running = true;
                *slot = Some(worker);
                log::info!("Camera worker started");
            }
        }
        self.refresh_devices()
    }

    /// Close the session, then drain and join the worker.
    pub fn pause(&self) {
        let handle = {
            let mut core = self.shared.lock_core();
            core.running = false;
            core.worker.clone()
        };
        if let Some(handle) = handle {
            self.close_via(&handle);
        }

        let worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown();
            log::info!("Camera worker stopped");
        }
        self.shared.lock_core().worker = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_core().running
    }

    /// Re-read every camera unit through the worker.
    pub fn refresh_devices(&self) -> Result<Enumeration, RangefinderError> {
        let scanned = self.run_on_worker(|shared| DeviceEnumerator::scan(shared.hardware.as_ref()))?;
        let enumeration = match scanned {
            Ok(enumeration) => enumeration,
            Err(e) => {
                self.shared.ui.error(&e);
                return Err(e);
            }
        };

        let mut core = self.shared.lock_core();
        core.enumeration = enumeration.clone();
        if core.enumeration.unit_for(core.mode).is_none() {
            core.mode = CameraMode::Wide;
        }
        drop(core);

        if enumeration.is_empty() {
            self.shared.ui.error(&RangefinderError::DeviceUnavailable(
                "No rear-facing camera available".to_string(),
            ));
        } else {
            log::info!(
                "Cameras: main = {:?}, ultra-wide = {:?}, zoom available = {}",
                enumeration.main_unit.as_ref().map(|u| &u.id),
                enumeration.ultra_wide_unit.as_ref().map(|u| &u.id),
                enumeration.zoom_available()
            );
        }
        Ok(enumeration)
    }

    pub fn enumeration(&self) -> Enumeration {
        self.shared.lock_core().enumeration.clone()
    }

    pub fn available_modes(&self) -> Vec<CameraMode> {
        self.shared.lock_core().enumeration.available_modes()
    }

    pub fn zoom_presets(&self) -> &[f32] {
        &self.shared.config.zoom.presets
    }

    pub fn config(&self) -> &RangefinderConfig {
        &self.shared.config
    }

    pub fn store(&self) -> &Arc<dyn MeasurementStore> {
        &self.shared.store
    }

    /// Open `camera_id`. Valid from CLOSED (or ERROR, which holds nothing).
    pub fn open(&self, camera_id: &str) -> Result<(), RangefinderError> {
        let result = self.request_open(camera_id);
        self.report(result)
    }

    /// Open the unit behind the current mode.
    pub fn open_current(&self) -> Result<(), RangefinderError> {
        let camera_id = {
            let core = self.shared.lock_core();
            core.enumeration.camera_for(core.mode).map(str::to_string)
        };
        match camera_id {
            Some(id) => self.open(&id),
            None => self.report(Err(RangefinderError::DeviceUnavailable(
                "No camera available".to_string(),
            ))),
        }
    }

    fn request_open(&self, camera_id: &str) -> Result<(), RangefinderError> {
        let mut core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        if core.sequence_pending || !matches!(core.phase, Phase::Closed | Phase::Error(_)) {
            return Err(busy("open"));
        }
        self.check_permission()?;
        let unit = core
            .enumeration
            .unit(camera_id)
            .cloned()
            .ok_or_else(|| {
                RangefinderError::DeviceUnavailable(format!("Camera {} not available", camera_id))
            })?;
        self.align_mode(&mut core, &unit);

        let generation = self.shared.enter_opening(&mut core, unit);
        self.shared.publish(&mut core);
        drop(core);

        let posted = post(&self.shared, &worker, move |shared| {
            shared.issue_open(generation)
        });
        if posted.is_err() {
            self.shared.abandon(generation);
        }
        posted
    }

    /// Tear everything down. A no-op when already closed; never fails.
    pub fn close(&self) {
        let handle = {
            let mut core = self.shared.lock_core();
            if matches!(core.phase, Phase::Closed) && !core.sequence_pending {
                log::debug!("close() on a closed session");
                return;
            }
            match core.worker.clone() {
                Some(handle) => handle,
                None => {
                    self.shared.teardown(&mut core);
                    self.shared.settle(&mut core);
                    return;
                }
            }
        };
        self.close_via(&handle);
    }

    fn close_via(&self, handle: &WorkerHandle) {
        if handle.is_current_thread() {
            let mut core = self.shared.lock_core();
            self.shared.teardown(&mut core);
            self.shared.settle(&mut core);
            return;
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let posted = post(&self.shared, handle, move |shared| {
            let mut core = shared.lock_core();
            shared.teardown(&mut core);
            shared.settle(&mut core);
            drop(core);
            let _ = done_tx.send(());
        });
        if posted.is_ok() && done_rx.recv().is_err() {
            log::warn!("Camera worker stopped before close completed");
        }
    }

    /// `close()` followed by `open(camera_id)`, as one worker job.
    pub fn switch_camera(&self, camera_id: &str) -> Result<(), RangefinderError> {
        let result = self.request_switch(camera_id);
        self.report(result)
    }

    fn request_switch(&self, camera_id: &str) -> Result<(), RangefinderError> {
        let mut core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        if core.sequence_pending {
            return Err(busy("switch"));
        }
        self.check_permission()?;
        let unit = core.enumeration.unit(camera_id).cloned().ok_or_else(|| {
            RangefinderError::DeviceUnavailable(format!("Camera {} not available", camera_id))
        })?;
        self.align_mode(&mut core, &unit);
        self.queue_switch(&mut core, &worker, unit)
    }

    /// Opening a unit directly by id moves the mode to the one it serves.
    fn align_mode(&self, core: &mut Core, unit: &CameraUnit) {
        let mode = core.enumeration.mode_serving(&unit.id, core.mode);
        if mode == core.mode {
            return;
        }
        core.zoom.reset();
        core.mode = mode;
        self.shared.ui.dispatch(UiEvent::ModeChanged {
            mode,
            zoom_presets_visible: false,
        });
        log::info!("Camera {} selects mode {}", unit.id, mode);
    }

    fn queue_switch(
        &self,
        core: &mut Core,
        worker: &WorkerHandle,
        unit: CameraUnit,
    ) -> Result<(), RangefinderError> {
        core.sequence_pending = true;
        let posted = post(&self.shared, worker, move |shared| shared.switch_to(unit));
        if posted.is_err() {
            core.sequence_pending = false;
        }
        posted
    }

    /// Change lens mode and reopen on the unit serving it.
    pub fn select_mode(&self, mode: CameraMode) -> Result<(), RangefinderError> {
        let result = self.request_mode(mode);
        self.report(result)
    }

    fn request_mode(&self, mode: CameraMode) -> Result<(), RangefinderError> {
        let mut core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        if core.sequence_pending {
            return Err(busy("mode change"));
        }
        self.check_permission()?;
        let unit = core.enumeration.unit_for(mode).cloned().ok_or_else(|| {
            RangefinderError::DeviceUnavailable(format!("{} camera not available", mode))
        })?;

        if mode == CameraMode::UltraWide && !unit.has_auto_focus {
            self.shared.ui.warning(ULTRAWIDE_FIXED_FOCUS_WARNING);
        }
        if mode != CameraMode::Zoom {
            core.zoom.reset();
        }
        core.mode = mode;
        self.shared.ui.dispatch(UiEvent::ModeChanged {
            mode,
            zoom_presets_visible: mode == CameraMode::Zoom,
        });
        log::info!("Mode {} on camera {}", mode, unit.id);
        self.queue_switch(&mut core, &worker, unit)
    }

    /// Apply a zoom preset. Only ZOOM mode crops; the other modes show the
    /// full active array.
    pub fn select_zoom(&self, factor: f32) -> Result<(), RangefinderError> {
        let result = self.request_zoom(factor);
        self.report(result)
    }

    fn request_zoom(&self, factor: f32) -> Result<(), RangefinderError> {
        let core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        if !matches!(core.phase, Phase::Ready(_)) {
            return Err(not_ready());
        }
        let factor = match core.mode {
            CameraMode::Zoom => factor,
            CameraMode::Wide | CameraMode::UltraWide => 1.0,
        };
        drop(core);
        post(&self.shared, &worker, move |shared| shared.apply_zoom(factor))
    }

    /// One-shot autofocus on the center region.
    pub fn tap_to_focus(&self) -> Result<(), RangefinderError> {
        let result = self.request_focus();
        self.report(result)
    }

    fn request_focus(&self) -> Result<(), RangefinderError> {
        let core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        let Phase::Ready(active) = &core.phase else {
            return Err(not_ready());
        };
        if !active.unit.has_auto_focus {
            self.shared.ui.warning(FIXED_FOCUS_TAP_WARNING);
            return Ok(());
        }
        if core.af.state() == FocusState::UserTriggered {
            log::debug!("Focus trigger already running");
            return Ok(());
        }
        drop(core);
        post(&self.shared, &worker, |shared| shared.start_focus_trigger())
    }

    /// Switch the torch on or off.
    pub fn toggle_flash(&self) -> Result<(), RangefinderError> {
        let result = self.request_flash();
        self.report(result)
    }

    fn request_flash(&self) -> Result<(), RangefinderError> {
        let core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        let Phase::Ready(active) = &core.phase else {
            return Err(not_ready());
        };
        if !active.unit.has_flash {
            return Err(RangefinderError::DeviceUnavailable(
                "Flash not available on this camera".to_string(),
            ));
        }
        drop(core);
        post(&self.shared, &worker, |shared| shared.toggle_torch())
    }

    /// Take a labeled still of the current reading.
    ///
    /// Every rejection is reported to the UI, including a capture that is
    /// already in flight.
    pub fn capture(&self) -> Result<(), RangefinderError> {
        let result = self.request_capture();
        if let Err(e) = &result {
            self.shared.ui.error(e);
        }
        result
    }

    fn request_capture(&self) -> Result<(), RangefinderError> {
        let mut core = self.shared.lock_core();
        let worker = running_worker(&core)?;
        if core.capture.is_some() {
            return Err(RangefinderError::SessionBusy(
                "Capture already in progress".to_string(),
            ));
        }
        let Phase::Ready(active) = &core.phase else {
            return Err(not_ready());
        };
        if !active.still_target_attached {
            return Err(RangefinderError::CaptureFailed(
                "Image capture not initialized".to_string(),
            ));
        }

        core.capture = Some(PendingCapture {
            measurement: core.measurement.clone(),
            mode: core.mode,
        });
        self.shared.ui.dispatch(UiEvent::CaptureInProgress(true));
        drop(core);

        let posted = post(&self.shared, &worker, |shared| shared.issue_still());
        if posted.is_err() {
            self.shared.lock_core().capture = None;
            self.shared.ui.dispatch(UiEvent::CaptureInProgress(false));
        }
        posted
    }

    /// Current device rotation, used for the still's JPEG orientation.
    pub fn set_device_rotation(&self, rotation: DeviceRotation) {
        self.shared.lock_core().rotation = rotation;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let core = self.shared.lock_core();
        SessionSnapshot {
            state: core.phase.state(),
            camera_id: core.phase.unit().map(|unit| unit.id.clone()),
            mode: core.mode,
            zoom_factor: core.zoom.factor(),
            focus_state: core.af.state(),
            flash_on: core.flash_on,
            measurement: core.measurement.clone(),
            capturing: core.capture.is_some(),
            resources: core.phase.census(),
        }
    }

    /// Block until the worker has no queued work, including callbacks
    /// queued by the work it ran meanwhile.
    pub fn flush(&self) {
        let Some(handle) = self.shared.lock_core().worker.clone() else {
            return;
        };
        for _ in 0..FLUSH_ROUNDS {
            match handle.barrier() {
                Some(0) | None => return,
                Some(_) => {}
            }
        }
        log::warn!("Camera worker still busy after {} flush rounds", FLUSH_ROUNDS);
    }

    /// Run `f` on the worker and wait for its result.
    fn run_on_worker<T, F>(&self, f: F) -> Result<T, RangefinderError>
    where
        T: Send + 'static,
        F: FnOnce(&Arc<Shared>) -> T + Send + 'static,
    {
        let handle = running_worker(&self.shared.lock_core())?;
        if handle.is_current_thread() {
            return Ok(f(&self.shared));
        }
        let (tx, rx) = crossbeam_channel::bounded(1);
        post(&self.shared, &handle, move |shared| {
            let _ = tx.send(f(shared));
        })?;
        rx.recv().map_err(|_| paused())
    }

    fn check_permission(&self) -> Result<(), RangefinderError> {
        if self.shared.permissions.camera_permission_granted() {
            Ok(())
        } else {
            Err(RangefinderError::PermissionDenied(
                "Camera permission not granted".to_string(),
            ))
        }
    }

    /// One UI message per failure. A busy rejection is a silent no-op.
    fn report(&self, result: Result<(), RangefinderError>) -> Result<(), RangefinderError> {
        if let Err(e) = &result {
            if e.kind() == ErrorKind::SessionBusy {
                log::debug!("{}", e);
            } else {
                self.shared.ui.error(e);
            }
        }
        result
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.pause();
    }
}

fn running_worker(core: &Core) -> Result<WorkerHandle, RangefinderError> {
    match (&core.worker, core.running) {
        (Some(handle), true) => Ok(handle.clone()),
        _ => Err(paused()),
    }
}
