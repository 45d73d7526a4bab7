//! Hardware seam between the rangefinder core and a camera driver.
//!
//! Every [`CameraHardware`] call is non-blocking. Completions come back as
//! [`HardwareEvent`]s through the [`HardwareEvents`] sink handed to
//! [`CameraHardware::open_device`]; the driver keeps that sink for the
//! lifetime of the device and reports every device, session and capture
//! callback through it. Drivers must never call back synchronously into the
//! controller.

use crate::errors::RangefinderError;
use crate::types::{CameraUnit, CaptureRequest, CaptureResult, Size};
use std::fmt;
use std::sync::Arc;

/// An open camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    pub camera_id: String,
    pub token: u64,
}

/// A configured capture session on an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHandle {
    pub token: u64,
}

/// Buffer queue that receives encoded still images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StillSink {
    pub token: u64,
    pub size: Size,
    pub max_images: u32,
}

/// Output targets requested when configuring a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOutputs {
    pub preview_size: Size,
    pub still_sink: StillSink,
}

/// Which request a capture callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureTag {
    /// A frame of the repeating preview request.
    Preview,
    /// The one-shot autofocus trigger request.
    FocusTrigger,
    /// A still capture into the still sink.
    Still,
}

/// Callbacks a driver delivers for an open device.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareEvent {
    DeviceOpened(DeviceHandle),
    DeviceDisconnected,
    DeviceError(String),
    SessionConfigured {
        session: SessionHandle,
        /// False when the driver accepted the preview output but dropped the
        /// still sink from the stream combination.
        still_target_attached: bool,
    },
    SessionConfigureFailed(String),
    CaptureCompleted {
        tag: CaptureTag,
        result: CaptureResult,
    },
    CaptureFailed {
        tag: CaptureTag,
        reason: String,
    },
    /// The still sink produced an image; `None` when the buffer was empty.
    StillImageAvailable(Option<Vec<u8>>),
}

type Deliver = dyn Fn(u64, HardwareEvent) -> bool + Send + Sync;

/// Sink a driver posts [`HardwareEvent`]s into.
///
/// Each sink is bound to the open sequence that created it. Events emitted
/// after that sequence has been superseded are discarded by the controller.
#[derive(Clone)]
pub struct HardwareEvents {
    generation: u64,
    deliver: Arc<Deliver>,
}

impl HardwareEvents {
    pub fn new<F>(generation: u64, deliver: F) -> Self
    where
        F: Fn(u64, HardwareEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Post an event. Returns false once the receiving worker is gone.
    pub fn emit(&self, event: HardwareEvent) -> bool {
        (self.deliver)(self.generation, event)
    }
}

impl fmt::Debug for HardwareEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareEvents")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Camera driver operations used by the core.
pub trait CameraHardware: Send + Sync {
    /// Identifiers of every camera unit the driver exposes.
    fn camera_ids(&self) -> Result<Vec<String>, RangefinderError>;

    fn characteristics(&self, camera_id: &str) -> Result<CameraUnit, RangefinderError>;

    /// Start opening a device. Completes with `DeviceOpened`,
    /// `DeviceDisconnected` or `DeviceError`.
    fn open_device(&self, camera_id: &str, events: HardwareEvents) -> Result<(), RangefinderError>;

    fn create_still_sink(
        &self,
        device: &DeviceHandle,
        size: Size,
        max_images: u32,
    ) -> Result<StillSink, RangefinderError>;

    /// Start configuring a session. Completes with `SessionConfigured` or
    /// `SessionConfigureFailed`.
    fn configure_session(
        &self,
        device: &DeviceHandle,
        outputs: &SessionOutputs,
    ) -> Result<(), RangefinderError>;

    /// Replace the repeating request. Results arrive as
    /// `CaptureCompleted { tag: Preview, .. }`.
    fn set_repeating_request(
        &self,
        session: &SessionHandle,
        request: &CaptureRequest,
    ) -> Result<(), RangefinderError>;

    /// Submit a single request.
    fn capture(
        &self,
        session: &SessionHandle,
        request: &CaptureRequest,
        tag: CaptureTag,
    ) -> Result<(), RangefinderError>;

    fn stop_repeating(&self, session: &SessionHandle) -> Result<(), RangefinderError>;

    fn abort_captures(&self, session: &SessionHandle) -> Result<(), RangefinderError>;

    fn close_session(&self, session: SessionHandle);

    fn release_still_sink(&self, sink: StillSink);

    fn close_device(&self, device: DeviceHandle);
}
