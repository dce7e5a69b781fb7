//! CLI Entry Point for rust_afl
//!
//! Provides a command-line interface for:
//! - Running the auto-feature controllers against the simulated camera
//! - Printing controller capabilities and tunable ranges as JSON
//! - Printing the library version
//!
//! # Usage
//!
//! Run a simulation with the default configuration:
//! ```bash
//! rust_afl simulate --frames 300
//! ```
//!
//! Use a specific configuration file:
//! ```bash
//! rust_afl simulate --config config/afl.toml
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rust_afl::config::AflConfig;
use rust_afl::device::{DeviceControl, HostGain};
use rust_afl::hardware::SimulatedCamera;
use rust_afl::{
    telemetry, AflError, BrightnessComponent, Controller, ControllerType, Library, Manager,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "rust_afl")]
#[command(about = "Auto-feature orchestration engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the configured controllers with frames from the simulated camera
    Simulate {
        /// Configuration file (defaults to config/afl.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of frames to capture, overriding the configuration
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Print capabilities and tunable ranges of every controller type as JSON
    Capabilities,

    /// Print the library version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { config, frames } => {
            let mut config = match config {
                Some(path) => AflConfig::load_from(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => AflConfig::load()?,
            };
            if let Some(frames) = frames {
                config.simulation.frames = frames;
            }
            telemetry::init_from_config(&config).map_err(|e| anyhow!(e))?;
            simulate(&config)
        }
        Commands::Capabilities => print_capabilities(),
        Commands::Version => {
            println!("rust_afl {}", Library::init().version());
            Ok(())
        }
    }
}

/// Counters reported by the acquisition thread.
#[derive(Debug, Default)]
struct AcquisitionStats {
    captured: u64,
    processed: u64,
    dropped: u64,
    failed: u64,
}

fn simulate(config: &AflConfig) -> Result<()> {
    info!(application = %config.application.name, "starting simulation");

    let library = Library::init();
    let camera = Arc::new(SimulatedCamera::from_config(&config.simulation));
    let host_gain = Arc::new(HostGain::new());
    let manager = Arc::new(Manager::new(&library, camera.clone())?);
    manager.set_host_gain(host_gain.clone());

    for preset in &config.controllers {
        let controller = manager.create_controller(preset.kind)?;
        preset
            .apply(&controller)
            .with_context(|| format!("applying {} preset", preset.kind))?;
        register_logging_callbacks(&controller)?;
    }

    let frames = config.simulation.frames;
    let interval = Duration::from_millis(config.simulation.frame_interval_ms);
    let acquisition = {
        let manager = Arc::clone(&manager);
        let camera = Arc::clone(&camera);
        let host_gain = Arc::clone(&host_gain);
        thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                let mut stats = AcquisitionStats::default();
                for _ in 0..frames {
                    let mut frame = camera.capture();
                    host_gain.apply(&mut frame);
                    stats.captured += 1;

                    if manager.status() {
                        stats.dropped += 1;
                    } else {
                        match manager.process(&frame) {
                            Ok(()) => stats.processed += 1,
                            Err(AflError::Busy(_)) => stats.dropped += 1,
                            Err(e) => {
                                stats.failed += 1;
                                warn!(error = %e, "frame processing failed");
                            }
                        }
                    }
                    if !interval.is_zero() {
                        thread::sleep(interval);
                    }
                }
                stats
            })?
    };
    let stats = acquisition
        .join()
        .map_err(|_| anyhow!("acquisition thread panicked"))?;

    info!(
        captured = stats.captured,
        processed = stats.processed,
        dropped = stats.dropped,
        failed = stats.failed,
        "acquisition finished"
    );

    println!(
        "frames: {} captured, {} processed, {} dropped, {} failed",
        stats.captured, stats.processed, stats.dropped, stats.failed
    );
    for controller in manager.controller_list()? {
        println!(
            "{:<14} mode={:?} status={:?}",
            controller.kind().to_string(),
            controller.mode()?,
            controller.status()?
        );
    }
    println!(
        "device: exposure={:.0}us gain={:.2} focus={} (best {})",
        camera.exposure()?,
        camera.gain()?,
        camera.focus()?,
        camera.best_focus()
    );
    Ok(())
}

fn register_logging_callbacks(controller: &Controller) -> Result<()> {
    let kind = controller.kind();
    controller.register_finished_callback(move || {
        info!(controller = %kind, "controller finished");
    })?;

    if controller.is_brightness_component_mode_supported()? {
        for component in BrightnessComponent::ALL {
            controller.register_component_callback(component, move || {
                info!(controller = %kind, %component, "component finished");
            })?;
        }
    }

    if controller.is_supported(rust_afl::Feature::DataProcessing)? {
        controller.register_data_processing_callback(move |position, sharpness| {
            debug!(controller = %kind, position, sharpness, "focus sample");
        })?;
    }
    Ok(())
}

fn print_capabilities() -> Result<()> {
    let library = Library::init();
    let mut entries = Vec::new();
    for kind in ControllerType::ALL {
        let controller = Controller::create(&library, kind)?;
        let mut entry = serde_json::json!({
            "kind": kind,
            "capabilities": controller.capabilities()?,
            "skip_frames_range": controller.skip_frames_range()?,
        });
        if controller.is_auto_target_supported()? {
            entry["auto_target_range"] = serde_json::to_value(controller.auto_target_range()?)?;
            entry["auto_tolerance_range"] =
                serde_json::to_value(controller.auto_tolerance_range()?)?;
            entry["auto_percentile_range"] =
                serde_json::to_value(controller.auto_percentile_range()?)?;
        }
        if controller.is_algorithm_supported()? {
            entry["algorithms"] = serde_json::to_value(controller.algorithm_list()?)?;
            entry["sharpness_algorithms"] =
                serde_json::to_value(controller.sharpness_algorithm_list()?)?;
            entry["limit_range"] = serde_json::to_value(controller.limit_range()?)?;
            entry["default_limit"] = serde_json::to_value(controller.default_limit()?)?;
            entry["hysteresis_range"] = serde_json::to_value(controller.hysteresis_range()?)?;
            entry["weighted_roi_min_size"] =
                serde_json::to_value(controller.weighted_roi_min_size()?)?;
        }
        entries.push(entry);
        controller.destroy()?;
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
