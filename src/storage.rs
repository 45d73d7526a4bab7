//! Persistence of labeled captures.
//!
//! The core hands finished JPEG bytes to a [`MeasurementStore`] and treats it
//! as durable. [`FileMeasurementStore`] keeps images as `<id>.jpg` files next
//! to a JSON index.

use crate::errors::RangefinderError;
use crate::types::{CameraMode, Measurement};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const INDEX_FILE: &str = "index.json";

/// A stored, labeled capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedCapture {
    pub id: String,
    pub image_path: PathBuf,
    /// `None` for a reading at infinity.
    pub distance: Option<f32>,
    pub distance_label: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub camera_mode: String,
}

impl SavedCapture {
    /// Capture time in local time, e.g. `Mar 07, 2026 14:05`.
    pub fn formatted_date(&self) -> String {
        match chrono::DateTime::from_timestamp_millis(self.timestamp) {
            Some(utc) => utc
                .with_timezone(&chrono::Local)
                .format("%b %d, %Y %H:%M")
                .to_string(),
            None => String::new(),
        }
    }
}

/// Storage collaborator for saved captures.
pub trait MeasurementStore: Send + Sync {
    fn save(
        &self,
        image: &[u8],
        measurement: &Measurement,
        mode: CameraMode,
    ) -> Result<SavedCapture, RangefinderError>;

    fn list_all(&self) -> Result<Vec<SavedCapture>, RangefinderError>;

    fn get(&self, id: &str) -> Result<Option<SavedCapture>, RangefinderError> {
        Ok(self.list_all()?.into_iter().find(|c| c.id == id))
    }

    /// Remove a capture and its image. Unknown ids are ignored.
    fn delete(&self, id: &str) -> Result<(), RangefinderError>;

    fn count(&self) -> Result<usize, RangefinderError> {
        Ok(self.list_all()?.len())
    }

    fn list_by_time(&self, newest_first: bool) -> Result<Vec<SavedCapture>, RangefinderError> {
        let mut captures = self.list_all()?;
        sort_by_time(&mut captures, newest_first);
        Ok(captures)
    }

    fn list_by_distance(&self, ascending: bool) -> Result<Vec<SavedCapture>, RangefinderError> {
        let mut captures = self.list_all()?;
        sort_by_distance(&mut captures, ascending);
        Ok(captures)
    }
}

pub fn sort_by_time(captures: &mut [SavedCapture], newest_first: bool) {
    if newest_first {
        captures.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    } else {
        captures.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    }
}

/// Orders by distance; readings at infinity sort last in both directions.
pub fn sort_by_distance(captures: &mut [SavedCapture], ascending: bool) {
    captures.sort_by(|a, b| match (a.distance, b.distance) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

pub(crate) fn new_record(
    id: String,
    image_path: PathBuf,
    measurement: &Measurement,
    mode: CameraMode,
) -> SavedCapture {
    SavedCapture {
        id,
        image_path,
        distance: measurement.distance_meters(),
        distance_label: measurement.label().to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
        camera_mode: mode.as_str().to_string(),
    }
}

/// Images on disk plus a JSON index.
#[derive(Debug)]
pub struct FileMeasurementStore {
    images_dir: PathBuf,
    records: Mutex<Vec<SavedCapture>>,
}

impl FileMeasurementStore {
    pub fn open<P: AsRef<Path>>(images_dir: P) -> Result<Self, RangefinderError> {
        let images_dir = images_dir.as_ref().to_path_buf();
        fs::create_dir_all(&images_dir).map_err(|e| {
            RangefinderError::StorageError(format!(
                "Failed to create {}: {}",
                images_dir.display(),
                e
            ))
        })?;

        let index_path = images_dir.join(INDEX_FILE);
        let records = if index_path.exists() {
            let contents = fs::read_to_string(&index_path).map_err(|e| {
                RangefinderError::StorageError(format!("Failed to read index: {}", e))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                RangefinderError::StorageError(format!("Failed to parse index: {}", e))
            })?
        } else {
            Vec::new()
        };

        log::info!(
            "Opened capture store at {:?} ({} records)",
            images_dir,
            records.len()
        );
        Ok(Self {
            images_dir,
            records: Mutex::new(records),
        })
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SavedCapture>>, RangefinderError> {
        self.records
            .lock()
            .map_err(|_| RangefinderError::StorageError("index lock poisoned".to_string()))
    }

    fn persist(&self, records: &[SavedCapture]) -> Result<(), RangefinderError> {
        let json = serde_json::to_string_pretty(records).map_err(|e| {
            RangefinderError::StorageError(format!("Failed to serialize index: {}", e))
        })?;
        write_atomic(&self.images_dir.join(INDEX_FILE), json.as_bytes())
    }
}

/// Write through a sibling temp file and rename, removing the temp file on
/// failure.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RangefinderError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = fs::write(&partial, bytes).and_then(|_| fs::rename(&partial, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&partial);
        return Err(RangefinderError::StorageError(format!(
            "Failed to write {}: {}",
            path.display(),
            e
        )));
    }
    Ok(())
}

impl MeasurementStore for FileMeasurementStore {
    fn save(
        &self,
        image: &[u8],
        measurement: &Measurement,
        mode: CameraMode,
    ) -> Result<SavedCapture, RangefinderError> {
        let id = uuid::Uuid::new_v4().to_string();
        let image_path = self.images_dir.join(format!("{}.jpg", id));

        let mut records = self.lock()?;
        write_atomic(&image_path, image)?;

        let record = new_record(id, image_path.clone(), measurement, mode);
        records.push(record.clone());
        if let Err(e) = self.persist(&records) {
            records.pop();
            let _ = fs::remove_file(&image_path);
            return Err(e);
        }

        log::info!("Saved capture {} ({})", record.id, record.distance_label);
        Ok(record)
    }

    fn list_all(&self) -> Result<Vec<SavedCapture>, RangefinderError> {
        Ok(self.lock()?.clone())
    }

    fn delete(&self, id: &str) -> Result<(), RangefinderError> {
        let mut records = self.lock()?;
        let Some(pos) = records.iter().position(|c| c.id == id) else {
            return Ok(());
        };
        let removed = records.remove(pos);
        match fs::remove_file(&removed.image_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {:?}: {}", removed.image_path, e),
        }
        self.persist(&records)
    }
}
