//! Rangefinder: measure distance with a phone-style camera module
//!
//! The lens autofocus system reports where it is focused in diopters; the
//! reciprocal is the distance to the subject. This crate is the core of such
//! a rangefinder, independent of any UI toolkit or camera driver.
//!
//! # Features
//! - Rear camera enumeration (logical multi-lens main unit, ultra-wide)
//! - Camera session state machine on a dedicated worker thread
//! - Center crop zoom presets
//! - Continuous autofocus with tap-to-trigger
//! - Focus telemetry to distance readings
//! - Labeled still captures persisted through a pluggable store
//!
//! # Usage
//! ```rust,no_run
//! use rangefinder::permissions::StaticPermission;
//! use rangefinder::storage::FileMeasurementStore;
//! use rangefinder::testing::SimulatedCamera;
//! use rangefinder::{RangefinderConfig, SessionController};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), rangefinder::RangefinderError> {
//! rangefinder::init_logging();
//! let config = RangefinderConfig::load_or_default();
//! let store = FileMeasurementStore::open(&config.storage.output_directory)?;
//! let (controller, mut ui_events) = SessionController::new(
//!     Arc::new(SimulatedCamera::default()),
//!     Arc::new(store),
//!     Arc::new(StaticPermission::granted()),
//!     config,
//! );
//!
//! controller.resume()?;
//! controller.open_current()?;
//! controller.flush();
//! for event in ui_events.drain() {
//!     println!("{:?}", event);
//! }
//! controller.pause();
//! # Ok(())
//! # }
//! ```
pub mod capture;
pub mod config;
pub mod distance;
pub mod enumerator;
pub mod errors;
pub mod focus;
pub mod invariant_ppt;
pub mod permissions;
pub mod platform;
pub mod session;
pub mod storage;
pub mod types;
pub mod ui;
pub mod zoom;

// Testing utilities - simulated camera and synthetic data for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::RangefinderConfig;
pub use enumerator::{DeviceEnumerator, Enumeration};
pub use errors::{ErrorKind, RangefinderError};
pub use platform::{CameraHardware, HardwareEvent, HardwareEvents};
pub use session::{SessionController, SessionSnapshot, SessionState};
pub use storage::{FileMeasurementStore, MeasurementStore, SavedCapture};
pub use types::{CameraMode, CameraUnit, Measurement};
pub use ui::{UiEvent, UiEventReceiver};

/// Initialize logging for the rangefinder
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "rangefinder=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
