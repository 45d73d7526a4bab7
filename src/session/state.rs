//! Session phases and the snapshots handed across the UI boundary.

use crate::errors::ErrorKind;
use crate::platform::{DeviceHandle, SessionHandle, StillSink};
use crate::types::{CameraMode, CameraUnit, CaptureRequest, FocusState, Measurement};
use serde::{Deserialize, Serialize};

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Closed,
    Opening,
    OpenNoSession,
    SessionReady,
    Closing,
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Closed => write!(f, "CLOSED"),
            SessionState::Opening => write!(f, "OPENING"),
            SessionState::OpenNoSession => write!(f, "OPEN_NO_SESSION"),
            SessionState::SessionReady => write!(f, "SESSION_READY"),
            SessionState::Closing => write!(f, "CLOSING"),
            SessionState::Error => write!(f, "ERROR"),
        }
    }
}

/// The four resources of a ready session. They only ever exist together.
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub unit: CameraUnit,
    pub device: DeviceHandle,
    pub session: SessionHandle,
    pub repeating: CaptureRequest,
    pub still_sink: StillSink,
    pub still_target_attached: bool,
}

#[derive(Debug)]
pub(crate) enum Phase {
    Closed,
    Opening {
        unit: CameraUnit,
    },
    /// Device open, sink created, session configuration requested.
    Configuring {
        unit: CameraUnit,
        device: DeviceHandle,
        still_sink: StillSink,
    },
    Ready(ActiveSession),
    Closing,
    Error(ErrorKind),
}

impl Phase {
    pub(crate) fn state(&self) -> SessionState {
        match self {
            Phase::Closed => SessionState::Closed,
            Phase::Opening { .. } => SessionState::Opening,
            Phase::Configuring { .. } => SessionState::OpenNoSession,
            Phase::Ready(_) => SessionState::SessionReady,
            Phase::Closing => SessionState::Closing,
            Phase::Error(_) => SessionState::Error,
        }
    }

    /// An open or close sequence is waiting on the hardware.
    pub(crate) fn is_transitional(&self) -> bool {
        matches!(
            self,
            Phase::Opening { .. } | Phase::Configuring { .. } | Phase::Closing
        )
    }

    pub(crate) fn unit(&self) -> Option<&CameraUnit> {
        match self {
            Phase::Opening { unit } | Phase::Configuring { unit, .. } => Some(unit),
            Phase::Ready(active) => Some(&active.unit),
            _ => None,
        }
    }

    pub(crate) fn census(&self) -> ResourceCensus {
        match self {
            Phase::Ready(_) => ResourceCensus {
                device: true,
                session: true,
                repeating: true,
                still_sink: true,
            },
            Phase::Configuring { .. } => ResourceCensus {
                device: true,
                still_sink: true,
                ..ResourceCensus::default()
            },
            _ => ResourceCensus::default(),
        }
    }
}

/// Which session resources are currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCensus {
    pub device: bool,
    pub session: bool,
    pub repeating: bool,
    pub still_sink: bool,
}

impl ResourceCensus {
    pub fn held(&self) -> usize {
        [self.device, self.session, self.repeating, self.still_sink]
            .iter()
            .filter(|held| **held)
            .count()
    }

    pub fn is_all_or_none(&self) -> bool {
        matches!(self.held(), 0 | 4)
    }
}

/// Consistent copy of the controller's state for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub camera_id: Option<String>,
    pub mode: CameraMode,
    pub zoom_factor: f32,
    pub focus_state: FocusState,
    pub flash_on: bool,
    pub measurement: Measurement,
    pub capturing: bool,
    pub resources: ResourceCensus,
}
