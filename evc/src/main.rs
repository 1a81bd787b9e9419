//! # EVC Controller Binary
//!
//! Runs the wireless charging bay: a vision worker publishing detections
//! and the coil alignment controller, as two threads sharing one
//! `SharedState`.
//!
//! # Usage
//!
//! ```bash
//! # Simulated bay, scripted detections
//! evc --config config/evc.toml --simulate
//!
//! # Raspberry Pi, detections piped from an external detector
//! detector | evc --config /etc/evc/evc.toml --driver sysfs
//!
//! # Verbose JSON logs
//! evc -s -v --json
//! ```

use clap::Parser;
use evc_common::config::{ConfigLoader, EvcConfig, LogLevel};
use evc_common::consts::DEFAULT_CONFIG_PATH;
use evc_common::shared_state::SharedState;
use evc_common::shutdown::ShutdownToken;
use evc_common::time::{Clock, SystemClock};
use evc_control_unit::cycle::{Hardware, MainControlLoop};
use evc_control_unit::predictor::build_predictor;
use evc_control_unit::telemetry::ChargeTelemetryClient;
use evc_hal::DriverRegistry;
use evc_vision::{LabelMap, VisionStats, VisionWorker, build_source};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// How long to wait for the vision worker after the controller stopped.
const VISION_JOIN_GRACE: Duration = Duration::from_millis(500);

/// EVC - wireless EV charging coil alignment controller
#[derive(Parser, Debug)]
#[command(name = "evc")]
#[command(version)]
#[command(about = "Wireless EV charging coil alignment controller")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Hardware driver to use (overrides [hal] driver)
    #[arg(short, long)]
    driver: Option<String>,

    /// Force the simulation driver
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = run() {
        error!("EVC failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = EvcConfig::load(&args.config);
    setup_tracing(&args, loaded.as_ref().ok().map(|c| c.shared.log_level));
    let mut config = loaded.map_err(|e| format!("{}: {}", args.config.display(), e))?;

    if args.simulate {
        info!("Simulation mode enabled");
        config.hal.driver = "simulation".to_string();
    } else if let Some(driver) = &args.driver {
        config.hal.driver = driver.clone();
    }
    config.validate()?;

    info!(
        "EVC v{} starting ({}, driver {})",
        env!("CARGO_PKG_VERSION"),
        config.shared.service_name,
        config.hal.driver
    );

    let predictor = build_predictor(&config.predictor)?;
    let telemetry = ChargeTelemetryClient::new(&config.telemetry)?;
    info!("Telemetry endpoint: {}", telemetry.url());

    // SIGINT, SIGTERM and SIGHUP all trip the token; hardware cleanup runs
    // when the controller observes it.
    let token = ShutdownToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        handler_token.trip();
    })?;

    let registry = DriverRegistry::with_builtin_drivers();
    let mut driver = registry.create_driver(&config.hal.driver)?;
    driver.init(&config)?;
    info!("Driver {} v{} initialized", driver.name(), driver.version());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let hw = Hardware::acquire(driver, &config, clock.clone(), token.clone())?;

    let shared = Arc::new(SharedState::new());
    let mut controller = MainControlLoop::new(
        &config,
        shared.clone(),
        hw,
        predictor,
        Box::new(telemetry),
        clock.clone(),
        token.clone(),
    );
    let mut vision = VisionWorker::new(
        build_source(&config.vision, clock.clone()),
        LabelMap::from_config(&config.vision),
        shared,
        clock,
        token.clone(),
        config.vision.frame_interval(),
    );

    let vision_handle = thread::Builder::new()
        .name("vision".to_string())
        .spawn(move || vision.run())?;

    let controller_token = token.clone();
    let controller_handle = thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || {
            let result = controller.run();
            // Stop the vision worker whatever ended the controller.
            controller_token.trip();
            result
        })?;

    let result = controller_handle
        .join()
        .map_err(|_| "controller thread panicked")?;
    token.trip();
    join_vision(vision_handle);

    result?;
    info!("EVC shutdown complete");
    Ok(())
}

/// Join the vision worker, unless it is stuck in a blocking read.
fn join_vision(handle: JoinHandle<VisionStats>) {
    let deadline = Instant::now() + VISION_JOIN_GRACE;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }

    if !handle.is_finished() {
        warn!("Vision worker still blocked on its source; not waiting for it");
        return;
    }
    match handle.join() {
        Ok(stats) => info!(
            "Vision worker joined ({} frames, {} skipped)",
            stats.frames, stats.skipped
        ),
        Err(_) => error!("Vision worker panicked"),
    }
}

fn log_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Setup tracing subscriber based on CLI arguments and `[shared] log_level`.
fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        configured.map_or(Level::INFO, log_level)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .init();
    }
}
