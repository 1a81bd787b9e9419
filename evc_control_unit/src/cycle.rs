//! Main control loop.
//!
//! One [`MainControlLoop::step`] call performs the work of the current
//! state and, if its exit condition holds, the transition:
//!
//! | State      | Work                                                    |
//! |------------|---------------------------------------------------------|
//! | Idle       | read snapshot; start debounce on car + EV               |
//! | Confirming | read snapshot; clear or elapse debounce                 |
//! | Parking    | measure, predict, move front then rear, close relay     |
//! | Charging   | telemetry, display, poll wait, departure check          |
//! | Leaving    | reverse rear then front, reset shared state and timer   |
//!
//! Everything runs on the calling thread. Each wait observes the shutdown
//! token; [`MainControlLoop::run`] always releases the hardware on exit.

use evc_common::config::{EvcConfig, StepperPins, ThresholdConfig, TimingConfig};
use evc_common::hal::driver::GpioDriver;
use evc_common::hal::types::Level;
use evc_common::shared_state::SharedState;
use evc_common::shutdown::ShutdownToken;
use evc_common::time::Clock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::actuator::{ActuatorController, Direction, MotorId, StepperMotor};
use crate::display::{
    DisplayController, MSG_CHARGING, MSG_LEAVING, MSG_PARKING, MSG_READY, charge_status_lines,
};
use crate::error::ControlError;
use crate::predictor::{StepPlan, StepPredictor};
use crate::sensor::{DistanceMeasurement, DistanceSensor, SensorTiming};
use crate::state::debounce::{DebounceStatus, DebounceTimer};
use crate::state::machine::{
    ControlEvent, ControlState, ControlStateMachine, Session, TransitionResult,
};
use crate::telemetry::{TelemetrySource, fetch_or_unavailable};

// ─── Hardware ───────────────────────────────────────────────────────

/// Every capability the controller claims from a driver.
///
/// Released exactly once, by [`Hardware::release`] or on drop: relay open,
/// motors de-energized, display cleared, driver shut down.
pub struct Hardware {
    driver: Box<dyn GpioDriver>,
    pub front_sensor: DistanceSensor,
    pub rear_sensor: DistanceSensor,
    pub actuators: ActuatorController,
    pub display: DisplayController,
    released: bool,
}

impl Hardware {
    /// Claim all pins from an initialized `driver`.
    ///
    /// The relay is claimed first and driven open. On any claim failure the
    /// driver is shut down before the error is returned.
    pub fn acquire(
        mut driver: Box<dyn GpioDriver>,
        config: &EvcConfig,
        clock: Arc<dyn Clock>,
        token: ShutdownToken,
    ) -> Result<Self, ControlError> {
        match Self::claim(driver.as_mut(), config, clock, token) {
            Ok(parts) => {
                info!("Hardware acquired via {} driver", driver.name());
                Ok(Self {
                    driver,
                    front_sensor: parts.front_sensor,
                    rear_sensor: parts.rear_sensor,
                    actuators: parts.actuators,
                    display: parts.display,
                    released: false,
                })
            }
            Err(e) => {
                if let Err(shutdown_err) = driver.shutdown() {
                    warn!("Driver shutdown after failed claim: {}", shutdown_err);
                }
                Err(e)
            }
        }
    }

    fn claim(
        driver: &mut dyn GpioDriver,
        config: &EvcConfig,
        clock: Arc<dyn Clock>,
        token: ShutdownToken,
    ) -> Result<Claimed, ControlError> {
        let pins = &config.pins;
        let relay = driver.output(pins.relay, Level::Low)?;

        let mut motor = |p: StepperPins| -> Result<StepperMotor, ControlError> {
            Ok(StepperMotor {
                enable: driver.output(p.enable, Level::Low)?,
                direction: driver.output(p.direction, Level::Low)?,
                step: driver.output(p.step, Level::Low)?,
            })
        };
        let front_motor = motor(pins.front_motor)?;
        let rear_motor = motor(pins.rear_motor)?;

        let timing = SensorTiming {
            trigger_pulse: config.timing.trigger_pulse(),
            echo_timeout: config.timing.echo_timeout(),
            cm_per_second: config.thresholds.cm_per_second,
        };
        let front_sensor = DistanceSensor::new(
            "front",
            driver.output(pins.front_sensor.trigger, Level::Low)?,
            driver.echo_input(pins.front_sensor.echo)?,
            timing,
            clock.clone(),
        );
        let rear_sensor = DistanceSensor::new(
            "rear",
            driver.output(pins.rear_sensor.trigger, Level::Low)?,
            driver.echo_input(pins.rear_sensor.echo)?,
            timing,
            clock.clone(),
        );

        let display = DisplayController::new(driver.display()?, config.display.columns);
        let actuators = ActuatorController::new(
            front_motor,
            rear_motor,
            relay,
            config.timing.step_half_period(),
            clock,
            token,
        );
        Ok(Claimed {
            front_sensor,
            rear_sensor,
            actuators,
            display,
        })
    }

    /// Read both sensors, front first.
    pub fn measure(&mut self) -> Result<DistanceMeasurement, ControlError> {
        Ok(DistanceMeasurement {
            front: self.front_sensor.measure()?,
            rear: self.rear_sensor.measure()?,
        })
    }

    /// Put every output in its safe state and release the driver. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        info!("Releasing hardware");
        self.actuators.shutdown();
        self.display.clear();
        if let Err(e) = self.driver.shutdown() {
            error!("Driver shutdown failed: {}", e);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

struct Claimed {
    front_sensor: DistanceSensor,
    rear_sensor: DistanceSensor,
    actuators: ActuatorController,
    display: DisplayController,
}

impl Drop for Hardware {
    fn drop(&mut self) {
        self.release();
    }
}

// ─── Control loop ───────────────────────────────────────────────────

/// The controller state machine bound to its collaborators.
pub struct MainControlLoop {
    timing: TimingConfig,
    thresholds: ThresholdConfig,
    shared: Arc<SharedState>,
    hw: Hardware,
    predictor: Box<dyn StepPredictor>,
    telemetry: Box<dyn TelemetrySource>,
    clock: Arc<dyn Clock>,
    token: ShutdownToken,
    machine: ControlStateMachine,
    debounce: DebounceTimer,
    session: Option<Session>,
    sessions_started: u64,
}

impl MainControlLoop {
    pub fn new(
        config: &EvcConfig,
        shared: Arc<SharedState>,
        hw: Hardware,
        predictor: Box<dyn StepPredictor>,
        telemetry: Box<dyn TelemetrySource>,
        clock: Arc<dyn Clock>,
        token: ShutdownToken,
    ) -> Self {
        Self {
            timing: config.timing.clone(),
            thresholds: config.thresholds.clone(),
            shared,
            hw,
            predictor,
            telemetry,
            clock,
            token,
            machine: ControlStateMachine::new(),
            debounce: DebounceTimer::new(config.timing.debounce()),
            session: None,
            sessions_started: 0,
        }
    }

    #[inline]
    pub fn state(&self) -> ControlState {
        self.machine.state()
    }

    pub fn debounce(&self) -> &DebounceTimer {
        &self.debounce
    }

    /// Active session, between Parking entry and Leaving completion.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started
    }

    pub fn hardware(&self) -> &Hardware {
        &self.hw
    }

    /// Run until shutdown is requested or a hardware fault occurs.
    ///
    /// Hardware is released on every exit path. A shutdown request is an
    /// orderly stop and returns `Ok`.
    pub fn run(&mut self) -> Result<(), ControlError> {
        let result = self.startup().and_then(|()| {
            while !self.token.is_tripped() {
                self.step()?;
            }
            Ok(())
        });

        if let Some(session) = &self.session {
            warn!(
                "Session {} aborted in state {} (relay {})",
                session.id,
                self.state(),
                if self.hw.actuators.relay_on() { "closed" } else { "open" }
            );
        }
        self.hw.release();

        match result {
            Err(e) if e.is_interrupt() => {
                info!("Controller stopped by shutdown request");
                Ok(())
            }
            Err(e) => {
                error!("Controller stopped: {}", e);
                Err(e)
            }
            Ok(()) => {
                info!("Controller stopped");
                Ok(())
            }
        }
    }

    /// Relay open, "System Ready" on screen, startup dwell.
    pub fn startup(&mut self) -> Result<(), ControlError> {
        info!("Controller starting in {}", self.state());
        self.hw.actuators.set_relay(false)?;
        self.hw.display.write(MSG_READY, None);
        self.pause(self.timing.startup_dwell())
    }

    /// Perform the current state's work once; returns the resulting state.
    pub fn step(&mut self) -> Result<ControlState, ControlError> {
        if self.token.is_tripped() {
            return Err(ControlError::Interrupted);
        }
        match self.state() {
            ControlState::Idle => self.idle()?,
            ControlState::Confirming => self.confirming()?,
            ControlState::Parking => self.parking()?,
            ControlState::Charging => self.charging()?,
            ControlState::Leaving => self.leaving()?,
        }
        Ok(self.state())
    }

    fn idle(&mut self) -> Result<(), ControlError> {
        let snapshot = self.shared.snapshot();
        if snapshot.vehicle_confirmed() {
            self.debounce.observe(true, self.clock.now());
            self.transition(ControlEvent::VehicleSeen);
            return Ok(());
        }
        self.pause(self.timing.idle_poll())
    }

    fn confirming(&mut self) -> Result<(), ControlError> {
        let confirmed = self.shared.snapshot().vehicle_confirmed();
        match self.debounce.observe(confirmed, self.clock.now()) {
            DebounceStatus::Cleared => {
                debug!("Detection dropped before debounce elapsed");
                self.transition(ControlEvent::VehicleLost);
                Ok(())
            }
            DebounceStatus::Elapsed => {
                self.sessions_started += 1;
                let session = Session::new(self.sessions_started);
                info!(session = session.id, "Vehicle confirmed, starting session");
                self.session = Some(session);
                self.transition(ControlEvent::DebounceElapsed);
                Ok(())
            }
            DebounceStatus::Started | DebounceStatus::Accumulating => {
                self.pause(self.timing.idle_poll())
            }
        }
    }

    fn parking(&mut self) -> Result<(), ControlError> {
        self.hw.display.write(MSG_PARKING, None);
        self.pause(self.timing.parking_dwell())?;

        let m = self.hw.measure()?;
        let sentinel = self.thresholds.invalid_distance_cm;
        let plan = self
            .predictor
            .predict(m.front.or_sentinel(sentinel), m.rear.or_sentinel(sentinel));
        info!(
            session = self.session_id(),
            "Distances front {} rear {} -> steps front {} rear {}",
            m.front,
            m.rear,
            plan.steps_front,
            plan.steps_rear
        );
        if let Some(session) = self.session.as_mut() {
            session.plan = Some(plan);
        }

        self.hw
            .actuators
            .move_motor(MotorId::Front, Direction::Forward, plan.steps_front)?;
        self.hw
            .actuators
            .move_motor(MotorId::Rear, Direction::Forward, plan.steps_rear)?;
        self.hw.actuators.set_relay(true)?;

        self.hw.display.write(MSG_CHARGING, None);
        self.pause(self.timing.charging_dwell())?;
        self.transition(ControlEvent::Aligned);
        Ok(())
    }

    fn charging(&mut self) -> Result<(), ControlError> {
        let status = fetch_or_unavailable(self.telemetry.as_mut());
        let (line0, line1) = charge_status_lines(&status);
        self.hw.display.write(&line0, line1.as_deref());

        self.pause(self.timing.charge_poll())?;

        let m = self.hw.measure()?;
        debug!("Charging poll: front {} rear {}", m.front, m.rear);
        if m.vehicle_departed(self.thresholds.departure_cm) {
            info!(
                session = self.session_id(),
                "Vehicle departed (front {} rear {})", m.front, m.rear
            );
            self.hw.actuators.set_relay(false)?;
            self.hw.display.write(MSG_LEAVING, None);
            self.transition(ControlEvent::VehicleDeparted);
        }
        Ok(())
    }

    fn leaving(&mut self) -> Result<(), ControlError> {
        self.pause(self.timing.leaving_dwell())?;

        let plan = self
            .session
            .and_then(|s| s.plan)
            .unwrap_or_else(|| {
                warn!("No step plan recorded for this session; nothing to retract");
                StepPlan::default()
            });
        self.hw
            .actuators
            .move_motor(MotorId::Rear, Direction::Reverse, plan.steps_rear)?;
        self.hw
            .actuators
            .move_motor(MotorId::Front, Direction::Reverse, plan.steps_front)?;

        self.shared.reset();
        self.debounce.clear();
        if let Some(session) = self.session.take() {
            info!(session = session.id, "Coils retracted, session complete");
        }

        self.hw.display.write(MSG_READY, None);
        self.pause(self.timing.ready_dwell())?;
        self.transition(ControlEvent::Retracted);
        Ok(())
    }

    fn transition(&mut self, event: ControlEvent) {
        let from = self.machine.state();
        match self.machine.handle_event(event) {
            TransitionResult::Ok(to) => info!("State {} -> {} ({:?})", from, to, event),
            TransitionResult::Rejected(reason) => {
                error!("Rejected {:?} in {}: {}", event, from, reason)
            }
        }
    }

    fn pause(&self, duration: Duration) -> Result<(), ControlError> {
        if self.token.sleep(self.clock.as_ref(), duration) {
            Ok(())
        } else {
            Err(ControlError::Interrupted)
        }
    }

    fn session_id(&self) -> u64 {
        self.session.map_or(0, |s| s.id)
    }
}
