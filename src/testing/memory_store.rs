//! In-memory [`MeasurementStore`] for tests and the simulator.

use crate::errors::RangefinderError;
use crate::storage::{new_record, MeasurementStore, SavedCapture};
use crate::types::{CameraMode, Measurement};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<SavedCapture>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail with a storage error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn image(&self, id: &str) -> Option<Vec<u8>> {
        self.images
            .lock()
            .ok()
            .and_then(|images| images.get(id).cloned())
    }

    fn poisoned() -> RangefinderError {
        RangefinderError::StorageError("store lock poisoned".to_string())
    }
}

impl MeasurementStore for MemoryStore {
    fn save(
        &self,
        image: &[u8],
        measurement: &Measurement,
        mode: CameraMode,
    ) -> Result<SavedCapture, RangefinderError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RangefinderError::StorageError("disk full".to_string()));
        }
        let id = uuid::Uuid::new_v4().to_string();
        let record = new_record(
            id.clone(),
            PathBuf::from(format!("memory/{}.jpg", id)),
            measurement,
            mode,
        );
        self.images
            .lock()
            .map_err(|_| Self::poisoned())?
            .insert(id, image.to_vec());
        self.records
            .lock()
            .map_err(|_| Self::poisoned())?
            .push(record.clone());
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<SavedCapture>, RangefinderError> {
        Ok(self.records.lock().map_err(|_| Self::poisoned())?.clone())
    }

    fn delete(&self, id: &str) -> Result<(), RangefinderError> {
        self.records
            .lock()
            .map_err(|_| Self::poisoned())?
            .retain(|record| record.id != id);
        self.images.lock().map_err(|_| Self::poisoned())?.remove(id);
        Ok(())
    }
}
