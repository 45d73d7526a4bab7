use rangefinder::permissions::StaticPermission;
use rangefinder::testing::SimulatedCamera;
use rangefinder::types::{AfState, CameraMode};
use rangefinder::{FileMeasurementStore, RangefinderConfig, SessionController, UiEvent};
use std::env;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    rangefinder::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: rangefinder-sim <enumerate|measure> [args]");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "enumerate" => cmd_enumerate(&args),
        "measure" => cmd_measure(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn load_config(args: &[String]) -> Result<RangefinderConfig, Box<dyn std::error::Error>> {
    match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a path")?;
            Ok(RangefinderConfig::load_from_file(path)?)
        }
        None => Ok(RangefinderConfig::load_or_default()),
    }
}

fn cmd_enumerate(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let camera = SimulatedCamera::default();
    let enumeration = rangefinder::DeviceEnumerator::scan(&camera)?;
    if args.contains(&"--json".to_string()) {
        let summary = serde_json::json!({
            "main": enumeration.main_unit.as_ref().map(|u| &u.id),
            "ultra_wide": enumeration.ultra_wide_unit.as_ref().map(|u| &u.id),
            "zoom_available": enumeration.zoom_available(),
            "modes": enumeration.available_modes(),
        });
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        for mode in enumeration.available_modes() {
            println!("{}: camera {}", mode, enumeration.camera_for(mode).unwrap_or("-"));
        }
    }
    Ok(())
}

fn cmd_measure(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    // Parse args: measure <diopters> [--mode <mode>] [--zoom <factor>] [--out <dir>] [--config <path>] [--json]
    let mut diopters: Option<f32> = None;
    let mut mode = None;
    let mut zoom = None;
    let mut out = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                i += 1;
                mode = Some(args.get(i).ok_or("--mode needs a value")?.parse::<CameraMode>()?);
            }
            "--zoom" => {
                i += 1;
                zoom = Some(args.get(i).ok_or("--zoom needs a value")?.parse::<f32>()?);
            }
            "--out" => {
                i += 1;
                out = Some(args.get(i).ok_or("--out needs a directory")?.clone());
            }
            "--config" => i += 1,
            "--json" => json = true,
            value => diopters = Some(value.parse()?),
        }
        i += 1;
    }

    let config = load_config(args)?;
    let mode = mode.unwrap_or(config.camera.default_mode);
    let out = out.unwrap_or_else(|| config.storage.output_directory.clone());
    let store = FileMeasurementStore::open(&out)?;

    let camera = Arc::new(SimulatedCamera::default());
    let (controller, mut ui_events) = SessionController::new(
        camera.clone(),
        Arc::new(store),
        Arc::new(StaticPermission::granted()),
        config,
    );

    controller.resume()?;
    controller.select_mode(mode)?;
    controller.flush();
    if let Some(factor) = zoom {
        controller.select_zoom(factor)?;
        controller.flush();
    }

    camera.emit_preview(Some(AfState::FocusedLocked), diopters);
    controller.flush();
    controller.capture()?;
    controller.flush();

    let snapshot = controller.snapshot();
    let events = ui_events.drain();
    controller.pause();

    let saved = events.iter().find_map(|event| match event {
        UiEvent::CaptureSaved(saved) => Some(saved.clone()),
        _ => None,
    });

    if json {
        let summary = serde_json::json!({
            "snapshot": snapshot,
            "saved": saved,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} ({} mode, zoom {}x)", snapshot.measurement.label(), snapshot.mode, snapshot.zoom_factor);
        for event in &events {
            if let UiEvent::Message(message) = event {
                println!("  {:?}: {}", message.level, message.text);
            }
        }
        match saved {
            Some(saved) => println!("Saved {} at {}", saved.image_path.display(), saved.formatted_date()),
            None => {
                eprintln!("No capture saved");
                std::process::exit(2);
            }
        }
    }
    Ok(())
}
