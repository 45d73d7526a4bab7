//! Session Controller lifecycle against the simulated camera
//!
//! Run with: cargo test --test session_test

#[cfg(test)]
mod session_tests {
    use rangefinder::errors::ErrorKind;
    use rangefinder::permissions::{PermissionStatus, StaticPermission};
    use rangefinder::platform::HardwareEvent;
    use rangefinder::session::ULTRAWIDE_FIXED_FOCUS_WARNING;
    use rangefinder::testing::{
        logical_main_unit, reference_units, ultra_wide_unit, MemoryStore, SimCall,
        SimulatedCamera,
    };
    use rangefinder::types::{AfMode, AfTrigger, CameraUnit, FlashMode, SensorRect};
    use rangefinder::ui::{MessageLevel, UserMessage};
    use rangefinder::{
        CameraMode, RangefinderConfig, SessionController, SessionState, UiEvent, UiEventReceiver,
    };
    use std::sync::Arc;

    struct Rig {
        controller: SessionController,
        events: UiEventReceiver,
        camera: Arc<SimulatedCamera>,
        permission: Arc<StaticPermission>,
    }

    fn rig_with(units: Vec<CameraUnit>) -> Rig {
        let camera = Arc::new(SimulatedCamera::new(units));
        let permission = Arc::new(StaticPermission::granted());
        let (controller, events) = SessionController::new(
            camera.clone(),
            Arc::new(MemoryStore::new()),
            permission.clone(),
            RangefinderConfig::default(),
        );
        Rig {
            controller,
            events,
            camera,
            permission,
        }
    }

    fn running_rig() -> Rig {
        let rig = rig_with(reference_units());
        rig.controller.resume().unwrap();
        rig
    }

    fn ready_rig() -> Rig {
        let mut rig = running_rig();
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::SessionReady);
        rig.events.drain();
        rig.camera.clear_calls();
        rig
    }

    fn messages(events: &[UiEvent]) -> Vec<UserMessage> {
        events
            .iter()
            .filter_map(|event| match event {
                UiEvent::Message(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn error_kinds(events: &[UiEvent]) -> Vec<ErrorKind> {
        messages(events)
            .into_iter()
            .filter_map(|message| match message.level {
                MessageLevel::Error(kind) => Some(kind),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_open_reaches_session_ready() {
        let mut rig = running_rig();
        rig.controller.open("0").unwrap();
        rig.controller.flush();

        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.state, SessionState::SessionReady);
        assert_eq!(snapshot.camera_id.as_deref(), Some("0"));
        assert_eq!(snapshot.resources.held(), 4);

        let resources = rig.camera.resources();
        assert_eq!(
            (resources.devices, resources.sessions, resources.sinks, resources.repeating),
            (1, 1, 1, 1)
        );

        let states: Vec<SessionState> = rig
            .events
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::SessionStateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Opening,
                SessionState::OpenNoSession,
                SessionState::SessionReady
            ]
        );
    }

    #[test]
    fn test_first_repeating_request_is_continuous_full_frame() {
        let rig = ready_rig();
        let repeating = rig.camera.last_repeating().unwrap();
        assert_eq!(repeating.af_mode, AfMode::ContinuousPicture);
        assert_eq!(repeating.af_trigger, AfTrigger::Idle);
        assert_eq!(repeating.crop_region, Some(SensorRect::new(0, 0, 4000, 3000)));
        assert_eq!(repeating.af_regions.len(), 1);
        assert_eq!(repeating.af_regions[0].width, 800);
        assert_eq!(repeating.flash_mode, FlashMode::Off);
    }

    #[test]
    fn test_close_releases_in_order() {
        let rig = ready_rig();
        rig.controller.close();

        let calls = rig.camera.calls();
        assert_eq!(calls.len(), 5);
        assert!(matches!(calls[0], SimCall::StopRepeating(_)));
        assert!(matches!(calls[1], SimCall::AbortCaptures(_)));
        assert!(matches!(calls[2], SimCall::CloseSession(_)));
        assert!(matches!(calls[3], SimCall::ReleaseStillSink(_)));
        assert!(matches!(calls[4], SimCall::CloseDevice(_)));
        assert!(rig.camera.resources().is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut rig = ready_rig();
        rig.controller.close();
        rig.camera.clear_calls();
        rig.events.drain();

        rig.controller.close();
        rig.controller.close();
        assert!(rig.camera.calls().is_empty());
        assert!(rig.events.drain().is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);
    }

    #[test]
    fn test_close_on_fresh_controller_is_noop() {
        let mut rig = rig_with(reference_units());
        rig.controller.close();
        rig.controller.pause();
        assert!(rig.events.drain().is_empty());
        assert!(rig.camera.calls().is_empty());
    }

    #[test]
    fn test_open_while_open_is_silent_busy() {
        let mut rig = ready_rig();
        let err = rig.controller.open("0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionBusy);
        assert!(messages(&rig.events.drain()).is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::SessionReady);
    }

    #[test]
    fn test_second_sequence_rejected_while_pending() {
        let mut rig = running_rig();
        rig.camera.set_deferred(true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::Opening);

        let busy = [
            rig.controller.open("0"),
            rig.controller.switch_camera("2"),
            rig.controller.select_mode(CameraMode::UltraWide),
        ];
        for result in busy {
            assert_eq!(result.unwrap_err().kind(), ErrorKind::SessionBusy);
        }
        assert!(messages(&rig.events.drain()).is_empty());
        assert_eq!(rig.controller.snapshot().mode, CameraMode::Wide);

        rig.controller.close();
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);

        // The late DeviceOpened belongs to a superseded open and is released.
        assert_eq!(rig.camera.release_pending(), 1);
        rig.controller.flush();
        assert!(rig.camera.resources().is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);
    }

    #[test]
    fn test_close_while_configuring_releases_late_session() {
        let rig = running_rig();
        rig.camera.set_deferred(true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        rig.camera.release_pending();
        rig.controller.flush();

        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.state, SessionState::OpenNoSession);
        assert!(snapshot.resources.device && snapshot.resources.still_sink);

        rig.controller.close();
        rig.camera.release_pending();
        rig.controller.flush();
        assert!(rig.camera.resources().is_empty());
        assert_eq!(rig.controller.snapshot().resources.held(), 0);
    }

    #[test]
    fn test_permission_denied_touches_no_hardware() {
        let mut rig = running_rig();
        rig.permission.set(PermissionStatus::Denied);
        let err = rig.controller.open("0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let events = rig.events.drain();
        assert_eq!(
            messages(&events),
            vec![UserMessage {
                level: MessageLevel::Error(ErrorKind::PermissionDenied),
                text: "No camera permission granted".to_string(),
            }]
        );
        assert!(rig.camera.calls().is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);

        rig.permission.set(PermissionStatus::Granted);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::SessionReady);
    }

    #[test]
    fn test_configure_failure_is_one_message_then_retry() {
        let mut rig = running_rig();
        rig.camera.update_faults(|f| f.configure_fails = true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();

        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.state, SessionState::Error);
        assert_eq!(snapshot.resources.held(), 0);
        assert!(rig.camera.resources().is_empty());

        let events = rig.events.drain();
        assert_eq!(error_kinds(&events), vec![ErrorKind::ConfigurationFailed]);
        assert_eq!(messages(&events)[0].text, "Couldn't configure camera view");

        rig.camera.clear_faults();
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::SessionReady);
    }

    #[test]
    fn test_open_error_and_device_error() {
        let mut rig = running_rig();
        rig.camera.update_faults(|f| f.open_error = true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::Error);
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::DeviceUnavailable]);

        rig.camera.update_faults(|f| {
            f.open_error = false;
            f.device_error = true;
        });
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::Error);
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::DeviceUnavailable]);
        assert!(rig.camera.resources().is_empty());
    }

    #[test]
    fn test_preview_rejection_fails_configuration() {
        let mut rig = running_rig();
        rig.camera.update_faults(|f| f.reject_repeating = true);
        rig.controller.open("0").unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::Error);
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::ConfigurationFailed]);
        assert!(rig.camera.resources().is_empty());
    }

    #[test]
    fn test_disconnect_tears_down() {
        let mut rig = ready_rig();
        assert!(rig.camera.emit(HardwareEvent::DeviceDisconnected));
        rig.controller.flush();

        assert_eq!(rig.controller.snapshot().state, SessionState::Error);
        assert!(rig.camera.resources().is_empty());
        let events = rig.events.drain();
        assert_eq!(messages(&events)[0].text, "Camera disconnected");
        assert_eq!(error_kinds(&events).len(), 1);
    }

    #[test]
    fn test_unknown_camera_is_unavailable() {
        let mut rig = running_rig();
        let err = rig.controller.open("42").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::DeviceUnavailable]);
    }

    #[test]
    fn test_operations_while_paused() {
        let mut rig = rig_with(reference_units());
        let err = rig.controller.open("0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(messages(&rig.events.drain())[0].text, "Camera paused");
        assert!(!rig.controller.is_running());
    }

    #[test]
    fn test_pause_releases_and_resume_reopens() {
        let rig = ready_rig();
        rig.controller.pause();
        assert!(!rig.controller.is_running());
        assert!(rig.camera.resources().is_empty());
        assert_eq!(rig.controller.snapshot().state, SessionState::Closed);

        rig.controller.resume().unwrap();
        rig.controller.open_current().unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().state, SessionState::SessionReady);
    }

    #[test]
    fn test_switch_camera_holds_one_set_of_resources() {
        let rig = ready_rig();
        rig.controller.switch_camera("2").unwrap();
        rig.controller.flush();

        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.state, SessionState::SessionReady);
        assert_eq!(snapshot.camera_id.as_deref(), Some("2"));
        let resources = rig.camera.resources();
        assert_eq!(
            (resources.devices, resources.sessions, resources.sinks),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_ultrawide_mode_warns_fixed_focus() {
        let mut rig = ready_rig();
        rig.controller.select_mode(CameraMode::UltraWide).unwrap();
        rig.controller.flush();

        let events = rig.events.drain();
        assert!(events.contains(&UiEvent::ModeChanged {
            mode: CameraMode::UltraWide,
            zoom_presets_visible: false,
        }));
        assert_eq!(
            messages(&events),
            vec![UserMessage {
                level: MessageLevel::Warning,
                text: ULTRAWIDE_FIXED_FOCUS_WARNING.to_string(),
            }]
        );
        assert_eq!(rig.controller.snapshot().camera_id.as_deref(), Some("2"));
        assert_eq!(rig.camera.last_repeating().unwrap().af_mode, AfMode::Off);
    }

    #[test]
    fn test_zoom_presets_crop_in_zoom_mode() {
        let mut rig = ready_rig();
        rig.controller.select_mode(CameraMode::Zoom).unwrap();
        rig.controller.flush();
        assert!(rig.events.drain().contains(&UiEvent::ModeChanged {
            mode: CameraMode::Zoom,
            zoom_presets_visible: true,
        }));

        rig.controller.select_zoom(2.0).unwrap();
        rig.controller.flush();
        assert_eq!(
            rig.camera.last_repeating().unwrap().crop_region,
            Some(SensorRect::new(1000, 750, 3000, 2250))
        );
        assert_eq!(rig.controller.snapshot().zoom_factor, 2.0);

        // Leaving ZOOM resets the factor; WIDE presets keep the full frame.
        rig.controller.select_mode(CameraMode::Wide).unwrap();
        rig.controller.flush();
        assert_eq!(rig.controller.snapshot().zoom_factor, 1.0);
        rig.controller.select_zoom(5.0).unwrap();
        rig.controller.flush();
        assert_eq!(
            rig.camera.last_repeating().unwrap().crop_region,
            Some(SensorRect::new(0, 0, 4000, 3000))
        );
    }

    #[test]
    fn test_rejected_crop_keeps_previous() {
        let mut rig = ready_rig();
        rig.controller.select_mode(CameraMode::Zoom).unwrap();
        rig.controller.flush();
        rig.events.drain();
        let before = rig.camera.last_repeating().unwrap();

        rig.camera.update_faults(|f| f.reject_repeating = true);
        rig.controller.select_zoom(3.0).unwrap();
        rig.controller.flush();

        assert_eq!(rig.camera.last_repeating().unwrap(), before);
        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.zoom_factor, 1.0);
        assert_eq!(snapshot.state, SessionState::SessionReady);
        assert!(messages(&rig.events.drain()).is_empty());
    }

    #[test]
    fn test_zoom_mode_needs_two_physical_lenses() {
        let mut single = logical_main_unit("0");
        single.is_logical_multi_lens = false;
        single.physical_lens_count = 1;
        let mut rig = rig_with(vec![single, ultra_wide_unit("2")]);
        let enumeration = rig.controller.resume().unwrap();
        assert!(!enumeration.zoom_available());

        let err = rig.controller.select_mode(CameraMode::Zoom).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::DeviceUnavailable]);
        assert_eq!(
            rig.controller.available_modes(),
            vec![CameraMode::UltraWide, CameraMode::Wide]
        );
    }

    #[test]
    fn test_torch_toggle_and_rejection() {
        let mut rig = ready_rig();
        rig.controller.toggle_flash().unwrap();
        rig.controller.flush();
        assert!(rig.events.drain().contains(&UiEvent::FlashChanged(true)));
        assert_eq!(rig.camera.last_repeating().unwrap().flash_mode, FlashMode::Torch);
        assert!(rig.controller.snapshot().flash_on);

        rig.camera.update_faults(|f| f.reject_repeating = true);
        rig.controller.toggle_flash().unwrap();
        rig.controller.flush();
        let events = rig.events.drain();
        assert!(!events.contains(&UiEvent::FlashChanged(false)));
        assert_eq!(messages(&events)[0].level, MessageLevel::Warning);
        assert!(rig.controller.snapshot().flash_on);

        rig.camera.clear_faults();
        rig.controller.close();
        assert!(rig.events.drain().contains(&UiEvent::FlashChanged(false)));
        assert!(!rig.controller.snapshot().flash_on);
    }

    #[test]
    fn test_flash_unavailable_on_ultrawide() {
        let mut rig = ready_rig();
        rig.controller.select_mode(CameraMode::UltraWide).unwrap();
        rig.controller.flush();
        rig.events.drain();

        let err = rig.controller.toggle_flash().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
        assert_eq!(
            messages(&rig.events.drain())[0].text,
            "Flash not available on this camera"
        );
    }

    #[test]
    fn test_empty_enumeration_is_reported_once() {
        let mut rig = rig_with(vec![rangefinder::testing::front_unit("1")]);
        let enumeration = rig.controller.resume().unwrap();
        assert!(enumeration.is_empty());
        assert_eq!(error_kinds(&rig.events.drain()), vec![ErrorKind::DeviceUnavailable]);
        assert_eq!(
            rig.controller.open_current().unwrap_err().kind(),
            ErrorKind::DeviceUnavailable
        );
    }
}
