//! Integration tests for controller tunables.
//!
//! Covers range validation, capability gating per controller type, weighted
//! ROI list handling and the factory defaults reported by every controller.

use rust_afl::limits::{MAX_WEIGHTED_ROIS, WEIGHTED_ROI_MIN_SIZE};
use rust_afl::{
    AflError, Algorithm, Controller, ControllerType, Feature, Library, Limit, Rect,
    RoiCombination, RoiPreset, RoiWeight, SharpnessAlgorithm, WeightedRoi,
};

fn controller(kind: ControllerType) -> (Library, Controller) {
    let library = Library::init();
    let controller = Controller::create(&library, kind).unwrap();
    (library, controller)
}

fn weighted(x: u32, y: u32, size: u32, weight: RoiWeight) -> WeightedRoi {
    WeightedRoi::new(Rect::new(x, y, size, size), weight)
}

#[test]
fn test_brightness_defaults_and_ranges() {
    let (_library, brightness) = controller(ControllerType::Brightness);

    assert_eq!(brightness.skip_frames().unwrap(), 1);
    assert_eq!(brightness.auto_target().unwrap(), 128);
    assert_eq!(brightness.auto_tolerance().unwrap(), 2);
    assert_eq!(brightness.auto_percentile().unwrap(), 100.0);

    let target = brightness.auto_target_range().unwrap();
    assert_eq!((target.min, target.max, target.inc), (0, 255, 1));
    let skip = brightness.skip_frames_range().unwrap();
    assert_eq!((skip.min, skip.max), (1, 100));
}

#[test]
fn test_range_bounds_are_inclusive() {
    let (library, brightness) = controller(ControllerType::Brightness);

    brightness.set_auto_target(255).unwrap();
    brightness.set_auto_target(0).unwrap();
    brightness.set_auto_tolerance(32).unwrap();
    brightness.set_auto_percentile(0.0).unwrap();
    brightness.set_skip_frames(100).unwrap();

    assert!(matches!(
        brightness.set_auto_target(256),
        Err(AflError::InvalidParameter(_))
    ));
    assert!(matches!(
        brightness.set_auto_tolerance(33),
        Err(AflError::InvalidParameter(_))
    ));
    assert!(matches!(
        brightness.set_auto_percentile(100.1),
        Err(AflError::InvalidParameter(_))
    ));
    assert!(matches!(
        brightness.set_skip_frames(0),
        Err(AflError::InvalidParameter(_))
    ));
    assert!(matches!(
        library.last_error(),
        Some(AflError::InvalidParameter(_))
    ));

    // Rejected writes leave the previous value in place
    assert_eq!(brightness.auto_target().unwrap(), 0);
    assert_eq!(brightness.skip_frames().unwrap(), 100);
}

#[test]
fn test_capability_table() {
    let library = Library::init();
    let brightness = Controller::create(&library, ControllerType::Brightness).unwrap();
    let white_balance = Controller::create(&library, ControllerType::WhiteBalance).unwrap();
    let autofocus = Controller::create(&library, ControllerType::Autofocus).unwrap();

    for c in [&brightness, &white_balance, &autofocus] {
        assert!(c.is_skip_frames_supported().unwrap());
        assert!(c.is_mode_supported().unwrap());
    }

    assert!(brightness.is_roi_supported().unwrap());
    assert!(brightness.is_roi_preset_supported().unwrap());
    assert!(brightness.is_brightness_component_mode_supported().unwrap());
    assert!(brightness.is_auto_percentile_supported().unwrap());
    assert!(!brightness.is_weighted_roi_supported().unwrap());
    assert!(!brightness.is_limit_supported().unwrap());

    assert!(white_balance.is_roi_supported().unwrap());
    assert!(!white_balance.is_auto_target_supported().unwrap());
    assert!(!white_balance.is_auto_tolerance_supported().unwrap());
    assert!(!white_balance.is_algorithm_supported().unwrap());

    assert!(autofocus.is_weighted_roi_supported().unwrap());
    assert!(autofocus.is_algorithm_supported().unwrap());
    assert!(autofocus.is_sharpness_algorithm_supported().unwrap());
    assert!(autofocus.is_hysteresis_supported().unwrap());
    assert!(autofocus.is_supported(Feature::DataProcessing).unwrap());
    assert!(!autofocus.is_roi_supported().unwrap());
    assert!(!autofocus.is_roi_preset_supported().unwrap());

    assert_eq!(
        autofocus.capabilities().unwrap(),
        rust_afl::Capabilities::for_type(ControllerType::Autofocus)
    );
}

#[test]
fn test_unsupported_features_are_rejected() {
    let library = Library::init();
    let white_balance = Controller::create(&library, ControllerType::WhiteBalance).unwrap();
    let autofocus = Controller::create(&library, ControllerType::Autofocus).unwrap();
    let brightness = Controller::create(&library, ControllerType::Brightness).unwrap();

    assert!(matches!(
        white_balance.set_auto_target(100),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        white_balance.auto_target_range(),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        autofocus.set_roi(Rect::new(0, 0, 10, 10)),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        autofocus.last_auto_average(),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        brightness.set_limit(Limit { min: 0, max: 10 }),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        brightness.register_data_processing_callback(|_, _| {}),
        Err(AflError::NotSupported(_))
    ));
    assert!(matches!(
        autofocus.register_component_callback(rust_afl::BrightnessComponent::Gain, || {}),
        Err(AflError::NotSupported(_))
    ));
}

#[test]
fn test_roi_and_preset() {
    let (_library, brightness) = controller(ControllerType::Brightness);

    assert_eq!(brightness.roi().unwrap(), Rect::default());
    assert_eq!(brightness.roi_preset().unwrap(), None);

    brightness.set_roi_preset(RoiPreset::Center).unwrap();
    assert_eq!(brightness.roi_preset().unwrap(), Some(RoiPreset::Center));

    // An explicit ROI replaces the preset
    let roi = Rect::new(10, 20, 100, 50);
    brightness.set_roi(roi).unwrap();
    assert_eq!(brightness.roi().unwrap(), roi);
    assert_eq!(brightness.roi_preset().unwrap(), None);

    assert!(matches!(
        brightness.set_roi(Rect::new(10, 10, 0, 5)),
        Err(AflError::InvalidParameter(_))
    ));
    brightness.set_roi(Rect::default()).unwrap();
}

#[test]
fn test_weighted_roi_list() {
    let (_library, autofocus) = controller(ControllerType::Autofocus);

    assert_eq!(
        autofocus.weighted_roi_min_size().unwrap(),
        WEIGHTED_ROI_MIN_SIZE
    );
    assert!(autofocus.weighted_rois().unwrap().is_empty());

    let rois = [
        weighted(0, 0, 64, RoiWeight::Strong),
        weighted(100, 100, 32, RoiWeight::Weak),
    ];
    autofocus.set_weighted_rois(&rois).unwrap();
    assert_eq!(autofocus.weighted_rois().unwrap(), rois.to_vec());

    // Two-stage query
    let mut short = [WeightedRoi::default(); 1];
    assert_eq!(
        autofocus.weighted_rois_into(&mut short),
        Err(AflError::BufferTooSmall {
            required: 2,
            provided: 1
        })
    );
    let mut buffer = [WeightedRoi::default(); 4];
    assert_eq!(autofocus.weighted_rois_into(&mut buffer).unwrap(), 2);
    assert_eq!(buffer[1], rois[1]);

    // A single ROI replaces the list
    autofocus
        .set_weighted_roi(weighted(5, 5, 40, RoiWeight::Medium))
        .unwrap();
    assert_eq!(autofocus.weighted_rois().unwrap().len(), 1);

    assert!(matches!(
        autofocus.set_weighted_roi(weighted(0, 0, 31, RoiWeight::Medium)),
        Err(AflError::InvalidParameter(_))
    ));
    let too_many = vec![weighted(0, 0, 32, RoiWeight::Weak); MAX_WEIGHTED_ROIS + 1];
    assert!(matches!(
        autofocus.set_weighted_rois(&too_many),
        Err(AflError::InvalidParameter(_))
    ));
    assert_eq!(autofocus.weighted_rois().unwrap().len(), 1);

    assert_eq!(
        autofocus.roi_combination().unwrap(),
        RoiCombination::Additive
    );
    autofocus
        .set_roi_combination(RoiCombination::Maximum)
        .unwrap();
    assert_eq!(autofocus.roi_combination().unwrap(), RoiCombination::Maximum);
}

#[test]
fn test_focus_tunables() {
    let (_library, autofocus) = controller(ControllerType::Autofocus);

    assert_eq!(autofocus.algorithm().unwrap(), Algorithm::Auto);
    assert_eq!(autofocus.algorithm_list().unwrap(), Algorithm::ALL.to_vec());
    autofocus.set_algorithm(Algorithm::GlobalSearch).unwrap();
    assert_eq!(autofocus.algorithm().unwrap(), Algorithm::GlobalSearch);

    assert_eq!(
        autofocus.sharpness_algorithm_list().unwrap(),
        SharpnessAlgorithm::ALL.to_vec()
    );
    autofocus
        .set_sharpness_algorithm(SharpnessAlgorithm::Sobel)
        .unwrap();
    assert_eq!(
        autofocus.sharpness_algorithm().unwrap(),
        SharpnessAlgorithm::Sobel
    );

    assert_eq!(autofocus.limit().unwrap(), Limit { min: 0, max: 1023 });
    assert_eq!(autofocus.default_limit().unwrap(), Limit { min: 0, max: 1023 });
    autofocus.set_limit(Limit { min: 200, max: 800 }).unwrap();
    assert!(matches!(
        autofocus.set_limit(Limit { min: 800, max: 200 }),
        Err(AflError::InvalidParameter(_))
    ));
    assert!(matches!(
        autofocus.set_limit(Limit { min: 0, max: 40_000 }),
        Err(AflError::InvalidParameter(_))
    ));
    assert_eq!(autofocus.limit().unwrap(), Limit { min: 200, max: 800 });
    assert_eq!(autofocus.default_limit().unwrap(), Limit { min: 0, max: 1023 });

    assert_eq!(autofocus.hysteresis().unwrap(), 10);
    autofocus.set_hysteresis(100).unwrap();
    assert!(matches!(
        autofocus.set_hysteresis(101),
        Err(AflError::InvalidParameter(_))
    ));
    assert_eq!(autofocus.default_hysteresis().unwrap(), 10);
}

#[test]
fn test_callbacks_register_and_unregister() {
    let (_library, brightness) = controller(ControllerType::Brightness);

    brightness.register_finished_callback(|| {}).unwrap();
    brightness.unregister_finished_callback().unwrap();
    // Unregistering twice is harmless
    brightness.unregister_finished_callback().unwrap();

    for component in rust_afl::BrightnessComponent::ALL {
        brightness.register_component_callback(component, || {}).unwrap();
        brightness.unregister_component_callback(component).unwrap();
    }
}
