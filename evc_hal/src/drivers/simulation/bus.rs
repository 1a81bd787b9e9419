//! Simulated charging bay: pin levels, ultrasonic echoes and the LCD.
//!
//! The `SimBus` is shared between the simulation driver and every pin it
//! hands out. Writing `High` to a sensor's trigger pin arms that sensor's
//! echo line; the next rising/falling edge waits resolve from the distance
//! currently in front of the sensor.

use evc_common::config::DistanceStep;
use evc_common::hal::types::Level;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Delay between trigger and the echo line rising.
const ECHO_LATENCY: Duration = Duration::from_micros(200);

/// Pin events kept for inspection.
const EVENT_CAPACITY: usize = 16_384;

/// One recorded output write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    /// Pin number.
    pub pin: u32,
    /// Level written.
    pub level: Level,
}

/// Which physical sensor an echo pin belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorPosition {
    /// Sensor facing the front of the vehicle.
    Front,
    /// Sensor facing the rear of the vehicle.
    Rear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoPhase {
    /// Line low, no measurement pending.
    Idle,
    /// Triggered, line about to rise.
    Armed,
    /// Line high, falling edge pending.
    High,
}

#[derive(Debug)]
struct SimSensor {
    position: SensorPosition,
    trigger: u32,
    echo: u32,
    phase: EchoPhase,
}

#[derive(Debug, Default)]
struct BusState {
    levels: HashMap<u32, Level>,
    rising_edges: HashMap<u32, u64>,
    events: VecDeque<PinEvent>,
    sensors: Vec<SimSensor>,
    script: Vec<DistanceStep>,
    fixed: Option<(f64, f64)>,
    cm_per_second: f64,
    lcd: Vec<String>,
    claimed: HashSet<u32>,
    shut_down: bool,
}

/// Shared world model of the simulation driver.
#[derive(Debug)]
pub struct SimBus {
    origin: Instant,
    state: Mutex<BusState>,
}

impl SimBus {
    /// Create a bus with no sensors and a blank LCD of `rows` rows.
    pub fn new(rows: usize, cm_per_second: f64) -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(BusState {
                lcd: vec![String::new(); rows],
                cm_per_second,
                ..BusState::default()
            }),
        }
    }

    /// Attach a sensor made of a trigger and an echo pin.
    pub fn add_sensor(&self, position: SensorPosition, trigger: u32, echo: u32) {
        self.state.lock().sensors.push(SimSensor {
            position,
            trigger,
            echo,
            phase: EchoPhase::Idle,
        });
    }

    /// Replace the distance timeline (offsets relative to bus creation).
    pub fn set_distance_script(&self, script: Vec<DistanceStep>) {
        let mut state = self.state.lock();
        state.script = script;
        state.fixed = None;
    }

    /// Pin the distances seen by both sensors, overriding any timeline.
    ///
    /// A non-finite distance produces no echo.
    pub fn set_distances(&self, front_cm: f64, rear_cm: f64) {
        self.state.lock().fixed = Some((front_cm, rear_cm));
    }

    /// Distances currently in front of the sensors.
    pub fn distances(&self) -> (f64, f64) {
        let state = self.state.lock();
        current_distances(&state, self.origin.elapsed())
    }

    /// Last level written to `pin`.
    pub fn level(&self, pin: u32) -> Option<Level> {
        self.state.lock().levels.get(&pin).copied()
    }

    /// Number of low→high transitions written to `pin`.
    pub fn rising_edges(&self, pin: u32) -> u64 {
        self.state
            .lock()
            .rising_edges
            .get(&pin)
            .copied()
            .unwrap_or(0)
    }

    /// Recorded output writes, oldest first.
    pub fn events(&self) -> Vec<PinEvent> {
        self.state.lock().events.iter().copied().collect()
    }

    /// Current LCD contents, one string per row.
    pub fn display_rows(&self) -> Vec<String> {
        self.state.lock().lcd.clone()
    }

    /// True once the driver released its resources.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    pub(crate) fn claim(&self, pin: u32) -> bool {
        self.state.lock().claimed.insert(pin)
    }

    pub(crate) fn release_all(&self) {
        let mut state = self.state.lock();
        state.claimed.clear();
        state.shut_down = true;
    }

    pub(crate) fn write_pin(&self, pin: u32, level: Level) -> bool {
        let mut state = self.state.lock();
        if state.shut_down {
            return false;
        }

        let previous = state.levels.insert(pin, level);
        if level == Level::High && previous != Some(Level::High) {
            *state.rising_edges.entry(pin).or_insert(0) += 1;
            for sensor in state.sensors.iter_mut().filter(|s| s.trigger == pin) {
                sensor.phase = EchoPhase::Armed;
            }
        }

        if state.events.len() == EVENT_CAPACITY {
            state.events.pop_front();
        }
        state.events.push_back(PinEvent { pin, level });
        true
    }

    pub(crate) fn wait_echo(&self, pin: u32, level: Level, timeout: Duration) -> Option<Duration> {
        let elapsed = self.origin.elapsed();
        let mut state = self.state.lock();
        let (front, rear) = current_distances(&state, elapsed);
        let cm_per_second = state.cm_per_second;
        let Some(sensor) = state.sensors.iter_mut().find(|s| s.echo == pin) else {
            // Unconnected input floats low.
            return (level == Level::Low).then_some(Duration::ZERO);
        };

        match (level, sensor.phase) {
            (Level::High, EchoPhase::Armed) => {
                sensor.phase = EchoPhase::High;
                (ECHO_LATENCY <= timeout).then_some(ECHO_LATENCY)
            }
            (Level::High, EchoPhase::High) => Some(Duration::ZERO),
            (Level::High, EchoPhase::Idle) => None,
            (Level::Low, EchoPhase::High) => {
                sensor.phase = EchoPhase::Idle;
                let distance = match sensor.position {
                    SensorPosition::Front => front,
                    SensorPosition::Rear => rear,
                };
                echo_width(distance, cm_per_second).filter(|width| *width <= timeout)
            }
            (Level::Low, _) => Some(Duration::ZERO),
        }
    }

    pub(crate) fn write_lcd_row(&self, row: usize, text: &str) -> bool {
        let mut state = self.state.lock();
        match state.lcd.get_mut(row) {
            Some(slot) => {
                *slot = text.to_string();
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_lcd(&self) {
        for row in self.state.lock().lcd.iter_mut() {
            row.clear();
        }
    }
}

fn current_distances(state: &BusState, elapsed: Duration) -> (f64, f64) {
    if let Some(fixed) = state.fixed {
        return fixed;
    }
    let at = elapsed.as_secs_f64();
    state
        .script
        .iter()
        .take_while(|step| step.at_s <= at)
        .last()
        .map(|step| (step.front_cm, step.rear_cm))
        .unwrap_or((f64::INFINITY, f64::INFINITY))
}

/// Echo high time for a target at `distance_cm`; `None` if nothing reflects.
fn echo_width(distance_cm: f64, cm_per_second: f64) -> Option<Duration> {
    if !distance_cm.is_finite() || distance_cm < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(distance_cm / cm_per_second).ok()
}
