//! Integration tests for the Mode/Status state machine.
//!
//! Each test drives a manager with frames from the simulated camera and
//! checks the status transitions, `Once` completion and callback delivery.

use rust_afl::device::{DeviceControl, GainActuator, HostGain};
use rust_afl::hardware::SimulatedCamera;
use rust_afl::{
    AflError, BrightnessComponent, ControllerType, Image, Library, Manager, Mode, Status,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn setup(camera: SimulatedCamera) -> (Library, Arc<SimulatedCamera>, Manager) {
    let library = Library::init();
    let camera = Arc::new(camera);
    let manager = Manager::new(&library, camera.clone()).unwrap();
    (library, camera, manager)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&count);
    (count, move || {
        hits.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_brightness_once_converges_and_finishes() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(64, 64, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    let (finished, callback) = counter();
    brightness.register_finished_callback(callback).unwrap();

    brightness.set_mode(Mode::Once).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Off);

    for _ in 0..30 {
        manager.process(&camera.capture()).unwrap();
    }

    assert_eq!(brightness.status().unwrap(), Status::Finished);
    assert_eq!(brightness.mode().unwrap(), Mode::Off);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    let average = brightness.last_auto_average().unwrap();
    assert!((average - 128.0).abs() <= 2.0, "average {average}");
    assert!(camera.exposure().unwrap() > 2_000.0);
}

#[test]
fn test_first_frame_moves_to_in_progress() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(32, 32, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Undefined);

    brightness.set_mode(Mode::Continuous).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Off);
    manager.process(&camera.capture()).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::InProgress);

    // Continuous never finishes on its own
    for _ in 0..30 {
        manager.process(&camera.capture()).unwrap();
    }
    assert_eq!(brightness.status().unwrap(), Status::InProgress);
    assert_eq!(brightness.mode().unwrap(), Mode::Continuous);
}

#[test]
fn test_mode_changes_while_in_progress() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(32, 32, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    brightness.set_mode(Mode::Continuous).unwrap();
    manager.process(&camera.capture()).unwrap();

    // Switching between active modes keeps the run going
    brightness.set_mode(Mode::Once).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::InProgress);

    brightness.set_mode(Mode::Off).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Canceled);

    let exposure = camera.exposure().unwrap();
    manager.process(&camera.capture()).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Canceled);
    assert_eq!(camera.exposure().unwrap(), exposure);

    // Off outside a run
    brightness.set_mode(Mode::Off).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Off);
}

#[test]
fn test_finished_controller_can_be_rearmed() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(32, 32, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    let (finished, callback) = counter();
    brightness.register_finished_callback(callback).unwrap();

    brightness.set_mode(Mode::Once).unwrap();
    for _ in 0..30 {
        manager.process(&camera.capture()).unwrap();
    }
    assert_eq!(brightness.status().unwrap(), Status::Finished);

    brightness.set_mode(Mode::Once).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Off);
    // Already at target: the next frame finishes immediately
    manager.process(&camera.capture()).unwrap();
    assert_eq!(brightness.status().unwrap(), Status::Finished);
    assert_eq!(finished.load(Ordering::SeqCst), 2);
}

#[test]
fn test_skip_frames_spaces_evaluations() {
    let (_library, _camera, manager) = setup(SimulatedCamera::new(16, 16, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    brightness.set_skip_frames(3).unwrap();
    brightness.set_mode(Mode::Continuous).unwrap();

    let mut seen = Vec::new();
    for i in 0..7u8 {
        let frame = Image::from_mono8(16, 16, vec![10 + i * 10; 256]);
        manager.process(&frame).unwrap();
        seen.push(brightness.last_auto_average().unwrap().round() as u8);
    }
    assert_eq!(seen, vec![10, 10, 10, 40, 40, 40, 70]);
}

#[test]
fn test_brightness_component_once() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(64, 64, false));
    let brightness = manager.create_controller(ControllerType::Brightness).unwrap();
    let (exposure_done, callback) = counter();
    brightness
        .register_component_callback(BrightnessComponent::Exposure, callback)
        .unwrap();
    let (global_done, callback) = counter();
    brightness.register_finished_callback(callback).unwrap();

    brightness
        .set_brightness_component_mode(BrightnessComponent::Exposure, Mode::Once)
        .unwrap();
    for _ in 0..30 {
        manager.process(&camera.capture()).unwrap();
    }

    assert_eq!(
        brightness
            .brightness_component_status(BrightnessComponent::Exposure)
            .unwrap(),
        Status::Finished
    );
    assert_eq!(
        brightness
            .brightness_component_mode(BrightnessComponent::Exposure)
            .unwrap(),
        Mode::Off
    );
    assert_eq!(exposure_done.load(Ordering::SeqCst), 1);
    assert_eq!(global_done.load(Ordering::SeqCst), 0);
    // Only the exposure actuator was driven
    assert_eq!(camera.gain().unwrap(), 1.0);
    assert_eq!(brightness.status().unwrap(), Status::Undefined);
}

#[test]
fn test_white_balance_once_with_host_gain() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(64, 64, true));
    let host_gain = Arc::new(HostGain::new());
    manager.set_host_gain(host_gain.clone());

    let white_balance = manager
        .create_controller(ControllerType::WhiteBalance)
        .unwrap();
    white_balance.set_mode(Mode::Once).unwrap();
    camera.set_exposure(8_000.0).unwrap();

    for _ in 0..30 {
        let mut frame = camera.capture();
        host_gain.apply(&mut frame);
        manager.process(&frame).unwrap();
    }

    assert_eq!(white_balance.status().unwrap(), Status::Finished);
    let [red, _, blue] = host_gain.color_gains();
    assert!(red < 1.0, "red gain {red}");
    assert!(blue > 1.0, "blue gain {blue}");

    let [r, g, b] = white_balance.last_auto_averages().unwrap();
    assert!((r - g).abs() <= 2.0 && (b - g).abs() <= 2.0);
}

#[test]
fn test_white_balance_rejects_mono_frames() {
    let (_library, camera, manager) = setup(SimulatedCamera::new(32, 32, false));
    manager.set_host_gain(Arc::new(HostGain::new()));
    let white_balance = manager
        .create_controller(ControllerType::WhiteBalance)
        .unwrap();
    white_balance.set_mode(Mode::Continuous).unwrap();

    assert!(matches!(
        manager.process(&camera.capture()),
        Err(AflError::InvalidImageFormat(_))
    ));
    assert_eq!(white_balance.status().unwrap(), Status::Error);

    // Setting a mode clears the error
    white_balance.set_mode(Mode::Continuous).unwrap();
    assert_eq!(white_balance.status().unwrap(), Status::Off);
}

#[test]
fn test_autofocus_once_finds_best_focus() {
    let camera = SimulatedCamera::new(96, 96, false)
        .with_best_focus(600)
        .with_initial(10_000.0, 1.0, 0);
    let (_library, camera, manager) = setup(camera);
    let autofocus = manager.create_controller(ControllerType::Autofocus).unwrap();

    let samples = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&samples);
    autofocus
        .register_data_processing_callback(move |position, sharpness| {
            sink.lock().unwrap().push((position, sharpness));
        })
        .unwrap();
    let (finished, callback) = counter();
    autofocus.register_finished_callback(callback).unwrap();

    autofocus.set_mode(Mode::Once).unwrap();
    for _ in 0..100 {
        manager.process(&camera.capture()).unwrap();
        if autofocus.status().unwrap() == Status::Finished {
            break;
        }
    }

    assert_eq!(autofocus.status().unwrap(), Status::Finished);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    let focus = camera.focus().unwrap();
    assert!((focus - 600).abs() <= 15, "focus settled at {focus}");

    let samples = samples.lock().unwrap();
    assert!(samples.len() > 5);
    assert!(samples.iter().all(|&(p, _)| (0..=1023).contains(&p)));
}

#[test]
fn test_autofocus_respects_limit() {
    let camera = SimulatedCamera::new(64, 64, false)
        .with_best_focus(900)
        .with_initial(10_000.0, 1.0, 0);
    let (_library, camera, manager) = setup(camera);
    let autofocus = manager.create_controller(ControllerType::Autofocus).unwrap();
    autofocus
        .set_limit(rust_afl::Limit { min: 100, max: 500 })
        .unwrap();
    autofocus
        .set_algorithm(rust_afl::Algorithm::FullScan)
        .unwrap();
    autofocus.set_mode(Mode::Once).unwrap();

    for _ in 0..100 {
        manager.process(&camera.capture()).unwrap();
        let focus = camera.focus().unwrap();
        assert!((100..=500).contains(&focus), "focus {focus} left the limit");
    }
    assert_eq!(autofocus.status().unwrap(), Status::Finished);
    // The sharpest reachable position is the upper bound
    assert!(camera.focus().unwrap() >= 480);
}

#[test]
fn test_autofocus_once_after_continuous_finishes() {
    let camera = SimulatedCamera::new(96, 96, false)
        .with_best_focus(600)
        .with_initial(10_000.0, 1.0, 0);
    let (_library, camera, manager) = setup(camera);
    let autofocus = manager.create_controller(ControllerType::Autofocus).unwrap();
    let (finished, callback) = counter();
    autofocus.register_finished_callback(callback).unwrap();

    autofocus.set_mode(Mode::Continuous).unwrap();
    for _ in 0..100 {
        manager.process(&camera.capture()).unwrap();
    }
    assert_eq!(autofocus.status().unwrap(), Status::InProgress);
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    // Switching an active controller keeps it in progress until the run ends
    autofocus.set_mode(Mode::Once).unwrap();
    assert_eq!(autofocus.status().unwrap(), Status::InProgress);
    for _ in 0..100 {
        manager.process(&camera.capture()).unwrap();
        if autofocus.status().unwrap() == Status::Finished {
            break;
        }
    }

    assert_eq!(autofocus.status().unwrap(), Status::Finished);
    assert_eq!(autofocus.mode().unwrap(), Mode::Off);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    let focus = camera.focus().unwrap();
    assert!((focus - 600).abs() <= 15, "focus settled at {focus}");
}

#[test]
fn test_continuous_autofocus_follows_scene() {
    let camera = SimulatedCamera::new(96, 96, false)
        .with_best_focus(600)
        .with_initial(10_000.0, 1.0, 0);
    let (_library, camera, manager) = setup(camera);
    let autofocus = manager.create_controller(ControllerType::Autofocus).unwrap();
    let (finished, callback) = counter();
    autofocus.register_finished_callback(callback).unwrap();

    autofocus.set_mode(Mode::Continuous).unwrap();
    for _ in 0..60 {
        manager.process(&camera.capture()).unwrap();
    }
    let focus = camera.focus().unwrap();
    assert!((focus - 600).abs() <= 15, "focus settled at {focus}");

    // A held position keeps the controller in progress without finishing
    for _ in 0..20 {
        manager.process(&camera.capture()).unwrap();
    }
    assert_eq!(camera.focus().unwrap(), focus);
    assert_eq!(autofocus.status().unwrap(), Status::InProgress);
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    // The scene moves: sharpness collapses past the hysteresis band
    camera.set_best_focus(300);
    for _ in 0..100 {
        manager.process(&camera.capture()).unwrap();
    }
    let focus = camera.focus().unwrap();
    assert!((focus - 300).abs() <= 20, "focus settled at {focus}");
    assert_eq!(autofocus.status().unwrap(), Status::InProgress);
    assert_eq!(autofocus.mode().unwrap(), Mode::Continuous);
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}
