//! Capture & persist pipeline end to end
//!
//! Run with: cargo test --test capture_test

#[cfg(test)]
mod capture_tests {
    use image::codecs::jpeg::JpegDecoder;
    use image::metadata::Orientation;
    use image::ImageDecoder;
    use rangefinder::errors::ErrorKind;
    use rangefinder::permissions::StaticPermission;
    use rangefinder::platform::CaptureTag;
    use rangefinder::storage::MeasurementStore;
    use rangefinder::testing::{
        reference_units, synthetic_jpeg, with_exif_orientation, MemoryStore, SimulatedCamera,
    };
    use rangefinder::types::{AfState, CameraMode, DeviceRotation, FlashMode, SensorRect};
    use rangefinder::ui::{MessageLevel, UserMessage};
    use rangefinder::{
        FileMeasurementStore, Measurement, RangefinderConfig, RangefinderError, SavedCapture,
        SessionController, UiEvent, UiEventReceiver,
    };
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct Rig {
        controller: SessionController,
        events: UiEventReceiver,
        camera: Arc<SimulatedCamera>,
        store: Arc<MemoryStore>,
    }

    fn ready() -> Rig {
        let camera = Arc::new(SimulatedCamera::new(reference_units()));
        let store = Arc::new(MemoryStore::new());
        let (controller, mut events) = SessionController::new(
            camera.clone(),
            store.clone(),
            Arc::new(StaticPermission::granted()),
            RangefinderConfig::default(),
        );
        controller.resume().unwrap();
        controller.open("0").unwrap();
        controller.flush();
        events.drain();
        Rig {
            controller,
            events,
            camera,
            store,
        }
    }

    fn focus_at(rig: &mut Rig, diopters: f32) {
        rig.camera.emit_preview(Some(AfState::FocusedLocked), Some(diopters));
        rig.controller.flush();
        rig.events.drain();
    }

    fn saved(events: &[UiEvent]) -> Option<SavedCapture> {
        events.iter().find_map(|event| match event {
            UiEvent::CaptureSaved(saved) => Some(saved.clone()),
            _ => None,
        })
    }

    fn errors(events: &[UiEvent]) -> Vec<(ErrorKind, String)> {
        events
            .iter()
            .filter_map(|event| match event {
                UiEvent::Message(UserMessage {
                    level: MessageLevel::Error(kind),
                    text,
                }) => Some((*kind, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_capture_saves_labeled_record() {
        let mut rig = ready();
        focus_at(&mut rig, 0.5);
        rig.controller.capture().unwrap();
        rig.controller.flush();

        let events = rig.events.drain();
        assert_eq!(events[0], UiEvent::CaptureInProgress(true));
        assert_eq!(events[1], UiEvent::CaptureInProgress(false));
        let record = saved(&events).unwrap();
        assert_eq!(record.distance, Some(2.0));
        assert_eq!(record.distance_label, "DISTANCE: 2.00 m");
        assert_eq!(record.camera_mode, "WIDE");
        assert_eq!(
            events.last(),
            Some(&UiEvent::Message(UserMessage {
                level: MessageLevel::Info,
                text: "Measurement saved!".to_string(),
            }))
        );

        assert_eq!(rig.store.count().unwrap(), 1);
        assert!(rig.store.image(&record.id).is_some());
        assert!(!rig.controller.snapshot().capturing);
    }

    #[test]
    fn test_capture_at_infinity() {
        let mut rig = ready();
        focus_at(&mut rig, 0.0);
        rig.controller.capture().unwrap();
        rig.controller.flush();

        let record = saved(&rig.events.drain()).unwrap();
        assert_eq!(record.distance, None);
        assert_eq!(record.distance_label, "DISTANCE: ∞");
    }

    #[test]
    fn test_still_request_mirrors_viewfinder() {
        let mut rig = ready();
        rig.controller.select_mode(CameraMode::Zoom).unwrap();
        rig.controller.flush();
        rig.controller.select_zoom(2.0).unwrap();
        rig.controller.toggle_flash().unwrap();
        rig.controller.set_device_rotation(DeviceRotation::Rotation90);
        rig.controller.flush();
        rig.events.drain();

        rig.controller.capture().unwrap();
        rig.controller.flush();

        let captures = rig.camera.captures();
        let (tag, still) = captures.last().unwrap();
        assert_eq!(*tag, CaptureTag::Still);
        assert_eq!(still.crop_region, Some(SensorRect::new(1000, 750, 3000, 2250)));
        assert_eq!(still.flash_mode, FlashMode::Single);
        assert_eq!(still.jpeg_orientation, Some(0));
        assert_eq!(rig.camera.last_repeating().unwrap().flash_mode, FlashMode::Torch);
        assert_eq!(saved(&rig.events.drain()).unwrap().camera_mode, "ZOOM");
    }

    #[test]
    fn test_default_rotation_uses_sensor_orientation() {
        let rig = ready();
        rig.controller.capture().unwrap();
        rig.controller.flush();
        let captures = rig.camera.captures();
        assert_eq!(captures[0].1.jpeg_orientation, Some(90));
        assert_eq!(captures[0].1.flash_mode, FlashMode::Off);
    }

    #[test]
    fn test_second_capture_while_in_flight_is_reported() {
        let mut rig = ready();
        rig.camera.set_deferred(true);
        rig.controller.capture().unwrap();
        rig.controller.flush();
        assert!(rig.controller.snapshot().capturing);

        let err = rig.controller.capture().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionBusy);
        let events = rig.events.drain();
        assert_eq!(
            errors(&events),
            vec![(ErrorKind::SessionBusy, "Camera is busy".to_string())]
        );

        rig.camera.release_pending();
        rig.controller.flush();
        assert!(saved(&rig.events.drain()).is_some());
        assert_eq!(rig.camera.captures().len(), 1);
    }

    #[test]
    fn test_capture_without_session_is_not_ready() {
        let mut rig = ready();
        rig.controller.close();
        rig.events.drain();
        let err = rig.controller.capture().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(
            errors(&rig.events.drain()),
            vec![(ErrorKind::DeviceUnavailable, "Camera not ready".to_string())]
        );
    }

    #[test]
    fn test_detached_still_target_is_not_initialized() {
        let mut rig = ready();
        rig.controller.close();
        rig.camera.update_faults(|f| f.detach_still_target = true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        rig.events.drain();

        let err = rig.controller.capture().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CaptureFailed);
        assert_eq!(
            errors(&rig.events.drain()),
            vec![(ErrorKind::CaptureFailed, "Image capture not initialized".to_string())]
        );
        assert!(rig.camera.captures().is_empty());
    }

    fn capture_expecting_failure(rig: &mut Rig) -> Vec<(ErrorKind, String)> {
        rig.controller.capture().unwrap();
        rig.controller.flush();
        let events = rig.events.drain();
        assert!(saved(&events).is_none());
        assert_eq!(events.first(), Some(&UiEvent::CaptureInProgress(true)));
        assert!(events.contains(&UiEvent::CaptureInProgress(false)));
        assert!(!rig.controller.snapshot().capturing);
        errors(&events)
    }

    #[test]
    fn test_capture_failure_classes() {
        let mut rig = ready();

        rig.camera.update_faults(|f| f.reject_capture = true);
        assert_eq!(
            capture_expecting_failure(&mut rig),
            vec![(ErrorKind::CaptureFailed, "Failed to capture image".to_string())]
        );

        rig.camera.update_faults(|f| {
            f.reject_capture = false;
            f.still_fails = true;
        });
        assert_eq!(
            capture_expecting_failure(&mut rig),
            vec![(ErrorKind::CaptureFailed, "Failed to capture image".to_string())]
        );

        rig.camera.update_faults(|f| {
            f.still_fails = false;
            f.null_image = true;
        });
        assert_eq!(
            capture_expecting_failure(&mut rig),
            vec![(ErrorKind::CaptureFailed, "Camera returned no image".to_string())]
        );

        rig.camera.clear_faults();
        rig.camera.set_still_jpeg(b"definitely not a jpeg".to_vec());
        let failures = capture_expecting_failure(&mut rig);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, ErrorKind::EncodeFailed);

        rig.camera.set_still_jpeg(synthetic_jpeg(64, 48));
        rig.store.set_fail_saves(true);
        assert_eq!(
            capture_expecting_failure(&mut rig),
            vec![(ErrorKind::StorageError, "Error saving image: disk full".to_string())]
        );

        rig.store.set_fail_saves(false);
        rig.controller.capture().unwrap();
        rig.controller.flush();
        assert!(saved(&rig.events.drain()).is_some());
        assert_eq!(rig.store.count().unwrap(), 1);
        assert_eq!(rig.controller.snapshot().state, rangefinder::SessionState::SessionReady);
    }

    #[test]
    fn test_close_aborts_capture_in_flight() {
        let mut rig = ready();
        rig.camera.set_deferred(true);
        rig.controller.capture().unwrap();
        rig.controller.flush();
        rig.events.drain();

        rig.controller.close();
        let events = rig.events.drain();
        assert!(events.contains(&UiEvent::CaptureInProgress(false)));
        assert!(errors(&events).is_empty());

        rig.camera.release_pending();
        rig.controller.flush();
        assert!(saved(&rig.events.drain()).is_none());
        assert_eq!(rig.store.count().unwrap(), 0);
    }

    #[test]
    fn test_exif_rotated_still_is_saved_upright() {
        let mut rig = ready();
        rig.camera
            .set_still_jpeg(with_exif_orientation(&synthetic_jpeg(64, 32), 6));
        rig.controller.capture().unwrap();
        rig.controller.flush();

        let record = saved(&rig.events.drain()).unwrap();
        let bytes = rig.store.image(&record.id).unwrap();
        let mut decoder = JpegDecoder::new(Cursor::new(bytes.as_slice())).unwrap();
        assert_eq!(decoder.orientation().unwrap(), Orientation::NoTransforms);
        assert_eq!(decoder.dimensions(), (32, 64));
    }

    #[test]
    fn test_file_store_keeps_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let camera = Arc::new(SimulatedCamera::new(reference_units()));
        let store = Arc::new(FileMeasurementStore::open(dir.path()).unwrap());
        let (controller, mut events) = SessionController::new(
            camera.clone(),
            store.clone(),
            Arc::new(StaticPermission::granted()),
            RangefinderConfig::default(),
        );
        controller.resume().unwrap();
        controller.open("0").unwrap();
        controller.flush();

        camera.set_still_jpeg(b"garbage".to_vec());
        controller.capture().unwrap();
        controller.flush();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        camera.set_still_jpeg(synthetic_jpeg(160, 120));
        controller.capture().unwrap();
        controller.flush();
        let record = saved(&events.drain()).unwrap();
        assert!(record.image_path.exists());
        assert_eq!(store.count().unwrap(), 1);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![format!("{}.jpg", record.id), "index.json".to_string()]);
    }

    #[test]
    fn test_small_still_is_saved() {
        let mut rig = ready();
        rig.camera.set_still_jpeg(synthetic_jpeg(80, 120));
        focus_at(&mut rig, 0.5);
        rig.controller.capture().unwrap();
        rig.controller.flush();

        let events = rig.events.drain();
        let record = saved(&events).unwrap();
        assert_eq!(record.distance_label, "DISTANCE: 2.00 m");
        assert!(errors(&events).is_empty());
        assert!(!rig.controller.snapshot().capturing);
    }

    /// Store whose next save panics once.
    struct FragileStore {
        inner: MemoryStore,
        panic_next: AtomicBool,
    }

    impl MeasurementStore for FragileStore {
        fn save(
            &self,
            image: &[u8],
            measurement: &Measurement,
            mode: CameraMode,
        ) -> Result<SavedCapture, RangefinderError> {
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("store exploded");
            }
            self.inner.save(image, measurement, mode)
        }

        fn list_all(&self) -> Result<Vec<SavedCapture>, RangefinderError> {
            self.inner.list_all()
        }

        fn delete(&self, id: &str) -> Result<(), RangefinderError> {
            self.inner.delete(id)
        }
    }

    #[test]
    fn test_panicking_still_processing_leaves_session_usable() {
        let camera = Arc::new(SimulatedCamera::new(reference_units()));
        let store = Arc::new(FragileStore {
            inner: MemoryStore::new(),
            panic_next: AtomicBool::new(true),
        });
        let (controller, mut events) = SessionController::new(
            camera.clone(),
            store.clone(),
            Arc::new(StaticPermission::granted()),
            RangefinderConfig::default(),
        );
        controller.resume().unwrap();
        controller.open("0").unwrap();
        controller.flush();
        events.drain();

        controller.capture().unwrap();
        controller.flush();
        let events_after_failure = events.drain();
        assert!(events_after_failure.contains(&UiEvent::CaptureInProgress(false)));
        assert_eq!(
            errors(&events_after_failure),
            vec![(
                ErrorKind::EncodeFailed,
                "Error saving image: image processing failed".to_string()
            )]
        );
        assert!(!controller.snapshot().capturing);

        controller.tap_to_focus().unwrap();
        controller.capture().unwrap();
        controller.flush();
        assert!(saved(&events.drain()).is_some());
        assert_eq!(store.count().unwrap(), 1);

        controller.close();
        assert!(camera.resources().is_empty());
    }

    #[test]
    fn test_capture_tagged_with_open_unit_mode() {
        let mut rig = ready();
        rig.controller.switch_camera("2").unwrap();
        rig.controller.flush();
        let events = rig.events.drain();
        assert!(events.contains(&UiEvent::ModeChanged {
            mode: CameraMode::UltraWide,
            zoom_presets_visible: false,
        }));
        assert_eq!(rig.controller.snapshot().mode, CameraMode::UltraWide);

        rig.controller.capture().unwrap();
        rig.controller.flush();
        let record = saved(&rig.events.drain()).unwrap();
        assert_eq!(record.camera_mode, "ULTRAWIDE");

        rig.controller.close();
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().mode, CameraMode::Wide);
    }
}
