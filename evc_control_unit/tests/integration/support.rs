//! Test bay: simulation driver, virtual clock and recording doubles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use evc_common::config::EvcConfig;
use evc_common::hal::driver::{EchoInput, GpioDriver, HalError, OutputPin, TextDisplay};
use evc_common::hal::types::Level;
use evc_common::shared_state::SharedState;
use evc_common::shutdown::ShutdownToken;
use evc_common::time::{Clock, ManualClock, epoch_seconds};
use evc_control_unit::cycle::{Hardware, MainControlLoop};
use evc_control_unit::predictor::{FnPredictor, StepPlan};
use evc_control_unit::state::machine::ControlState;
use evc_control_unit::telemetry::{ChargeStatus, TelemetryError, TelemetrySource};
use evc_hal::drivers::simulation::{PinEvent, SimBus, SimulationDriver};

pub const PLAN: StepPlan = StepPlan {
    steps_front: 120,
    steps_rear: 140,
};

pub fn healthy_status() -> ChargeStatus {
    ChargeStatus {
        battery_percent: Some(67.5),
        remaining_minutes: Some(45),
    }
}

/// Telemetry replaying queued results, then a healthy status forever.
#[derive(Clone, Default)]
pub struct ScriptedTelemetry {
    queue: Arc<Mutex<VecDeque<Result<ChargeStatus, TelemetryError>>>>,
    calls: Arc<Mutex<u32>>,
}

impl ScriptedTelemetry {
    pub fn push(&self, result: Result<ChargeStatus, TelemetryError>) {
        self.queue.lock().push_back(result);
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

impl TelemetrySource for ScriptedTelemetry {
    fn fetch(&mut self) -> Result<ChargeStatus, TelemetryError> {
        *self.calls.lock() += 1;
        self.queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(healthy_status()))
    }
}

/// Simulation driver with injected pin behaviour:
/// - `trip_pin` trips the shutdown token when driven high
/// - `fail_pin` rejects every write once `fault` is set
pub struct FaultyDriver {
    inner: SimulationDriver,
    trip_pin: Option<u32>,
    fail_pin: Option<u32>,
    token: ShutdownToken,
    fault: Arc<AtomicBool>,
}

struct FaultyPin {
    inner: Box<dyn OutputPin>,
    trip: Option<ShutdownToken>,
    fail: Option<Arc<AtomicBool>>,
}

impl OutputPin for FaultyPin {
    fn pin(&self) -> u32 {
        self.inner.pin()
    }

    fn write(&mut self, level: Level) -> Result<(), HalError> {
        if let Some(fault) = &self.fail {
            if fault.load(Ordering::SeqCst) {
                return Err(HalError::Io {
                    pin: self.inner.pin(),
                    reason: "line stuck".to_string(),
                });
            }
        }
        if let Some(token) = &self.trip {
            if level.is_high() {
                token.trip();
            }
        }
        self.inner.write(level)
    }
}

impl GpioDriver for FaultyDriver {
    fn name(&self) -> &'static str {
        "faulty-simulation"
    }

    fn version(&self) -> &'static str {
        self.inner.version()
    }

    fn init(&mut self, config: &EvcConfig) -> Result<(), HalError> {
        self.inner.init(config)
    }

    fn output(&mut self, pin: u32, initial: Level) -> Result<Box<dyn OutputPin>, HalError> {
        let out = self.inner.output(pin, initial)?;
        let trip = (self.trip_pin == Some(pin)).then(|| self.token.clone());
        let fail = (self.fail_pin == Some(pin)).then(|| self.fault.clone());
        if trip.is_none() && fail.is_none() {
            return Ok(out);
        }
        Ok(Box::new(FaultyPin {
            inner: out,
            trip,
            fail,
        }))
    }

    fn echo_input(&mut self, pin: u32) -> Result<Box<dyn EchoInput>, HalError> {
        self.inner.echo_input(pin)
    }

    fn display(&mut self) -> Result<Box<dyn TextDisplay>, HalError> {
        self.inner.display()
    }

    fn shutdown(&mut self) -> Result<(), HalError> {
        self.inner.shutdown()
    }
}

/// How a test bay deviates from the plain simulation.
#[derive(Clone, Copy, Default)]
pub struct BayOptions {
    pub trip_pin: Option<u32>,
    pub fail_pin: Option<u32>,
    pub plan: Option<StepPlan>,
}

/// Controller wired to a simulated bay.
pub struct Bay {
    pub config: EvcConfig,
    pub controller: MainControlLoop,
    pub bus: Arc<SimBus>,
    pub shared: Arc<SharedState>,
    pub clock: ManualClock,
    pub token: ShutdownToken,
    pub telemetry: ScriptedTelemetry,
    pub predictions: Arc<Mutex<Vec<(f64, f64)>>>,
    /// Arms `BayOptions::fail_pin`.
    pub fault: Arc<AtomicBool>,
}

impl Bay {
    pub fn new() -> Self {
        Self::build(BayOptions::default())
    }

    /// Bay whose driver trips the shutdown token when `pin` is driven high.
    pub fn tripping_on(pin: u32) -> Self {
        Self::build(BayOptions {
            trip_pin: Some(pin),
            ..BayOptions::default()
        })
    }

    /// Bay whose `pin` starts failing writes once `fault` is set.
    pub fn failing_on(pin: u32) -> Self {
        Self::build(BayOptions {
            fail_pin: Some(pin),
            ..BayOptions::default()
        })
    }

    /// Bay whose predictor always answers `plan`.
    pub fn with_plan(plan: StepPlan) -> Self {
        Self::build(BayOptions {
            plan: Some(plan),
            ..BayOptions::default()
        })
    }

    pub fn build(options: BayOptions) -> Self {
        let config = EvcConfig::with_service_name("bay-test");
        let clock = ManualClock::new();
        let token = ShutdownToken::new();
        let shared = Arc::new(SharedState::new());
        let fault = Arc::new(AtomicBool::new(false));

        let mut sim = SimulationDriver::new();
        sim.init(&config).unwrap();
        let bus = sim.bus().unwrap();
        bus.set_distances(20.0, 25.0);

        let driver: Box<dyn GpioDriver> = if options.trip_pin.is_some() || options.fail_pin.is_some() {
            Box::new(FaultyDriver {
                inner: sim,
                trip_pin: options.trip_pin,
                fail_pin: options.fail_pin,
                token: token.clone(),
                fault: fault.clone(),
            })
        } else {
            Box::new(sim)
        };
        let clock_arc: Arc<dyn Clock> = Arc::new(clock.clone());
        let hw = Hardware::acquire(driver, &config, clock_arc.clone(), token.clone()).unwrap();

        let plan = options.plan.unwrap_or(PLAN);
        let predictions = Arc::new(Mutex::new(Vec::new()));
        let seen = predictions.clone();
        let predictor = FnPredictor(move |front: f64, rear: f64| {
            seen.lock().push((front, rear));
            plan
        });

        let telemetry = ScriptedTelemetry::default();
        let controller = MainControlLoop::new(
            &config,
            shared.clone(),
            hw,
            Box::new(predictor),
            Box::new(telemetry.clone()),
            clock_arc,
            token.clone(),
        );

        Self {
            config,
            controller,
            bus,
            shared,
            clock,
            token,
            telemetry,
            predictions,
            fault,
        }
    }

/// Vision frame with car and EV plate.
    pub fn show_ev(&self) {
        self.shared.publish_frame(true, true, false, epoch_seconds());
    }

    /// Vision frame without the EV plate.
    pub fn show_plain_car(&self) {
        self.shared.publish_frame(true, false, true, epoch_seconds());
    }

    pub fn step(&mut self) -> ControlState {
        self.controller.step().unwrap()
    }

    /// Step until `target` is reached; panics after `max_steps`.
    pub fn step_until(&mut self, target: ControlState, max_steps: usize) {
        for _ in 0..max_steps {
            if self.step() == target {
                return;
            }
        }
        panic!(
            "state {} not reached within {} steps (stuck in {})",
            target,
            max_steps,
            self.controller.state()
        );
    }

    /// Drive a fresh bay into Charging with the EV held in view.
    pub fn park(&mut self) {
        self.show_ev();
        self.step_until(ControlState::Charging, 500);
    }

    pub fn lcd(&self) -> Vec<String> {
        self.bus.display_rows()
    }

    /// Step pulses (rising edges) recorded on `pin` since `from` in the event log.
    pub fn pulses_since(&self, from: usize, pin: u32) -> usize {
        step_events(&self.bus.events()[from..], pin)
    }
}

pub fn step_events(events: &[PinEvent], pin: u32) -> usize {
    events
        .iter()
        .filter(|e| e.pin == pin && e.level == Level::High)
        .count()
}
