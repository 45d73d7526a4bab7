//! Testing utilities for the rangefinder
//!
//! A simulated camera driver, an in-memory capture store and synthetic
//! data, for offline tests and the simulator binary.

pub mod memory_store;
pub mod simulated;
pub mod synthetic_data;

pub use memory_store::MemoryStore;
pub use simulated::{SimCall, SimFaults, SimResources, SimulatedCamera};
pub use synthetic_data::{
    front_unit, logical_main_unit, reference_units, synthetic_jpeg, ultra_wide_unit,
    with_exif_orientation,
};
