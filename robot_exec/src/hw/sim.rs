//! # Simulated hardware
//!
//! A board model for running the agent without hardware. The robot drives along a line towards
//! (forward) or away from (backward) an obstacle, closing a fixed distance every time the motors
//! are enabled. Every pin write is recorded so that actuation sequences can be inspected.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{collections::HashMap, time::Duration};
use log::trace;
use serde::Deserialize;

use super::{Hardware, Pin, PinMap, PinMode, PinState};
use crate::sensors;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Furthest distance the simulated sensor can report.
///
/// Units: centimeters
const MAX_RANGE_CM: f64 = 99.0;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated board.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimParams {
    /// Initial distance between the robot and the obstacle.
    ///
    /// Units: centimeters
    pub start_distance_cm: f64,

    /// Distance covered each time the motors are enabled.
    ///
    /// Units: centimeters
    pub closing_cm_per_actuation: f64,

    /// Length of the speed sensor's high pulse while the motors are running.
    ///
    /// Units: microseconds
    pub pulse_width_us: u64,
}

/// Simulated board.
#[derive(Debug)]
pub struct SimHardware {
    params: SimParams,
    pins: PinMap,

    distance_cm: f64,

    modes: HashMap<Pin, PinMode>,
    levels: HashMap<Pin, PinState>,
    writes: Vec<(Pin, PinState)>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            start_distance_cm: 60.0,
            closing_cm_per_actuation: 1.0,
            pulse_width_us: 5000,
        }
    }
}

impl SimHardware {
    pub fn new(params: SimParams, pins: PinMap) -> Self {
        Self {
            params,
            pins,
            distance_cm: params.start_distance_cm.max(0.0).min(MAX_RANGE_CM),
            modes: HashMap::new(),
            levels: HashMap::new(),
            writes: Vec::new(),
        }
    }

    /// Current distance to the obstacle.
    pub fn distance_cm(&self) -> f64 {
        self.distance_cm
    }

    /// Move the obstacle.
    pub fn set_distance_cm(&mut self, distance_cm: f64) {
        self.distance_cm = distance_cm.max(0.0).min(MAX_RANGE_CM);
    }

    /// All pin writes since creation or the last call to `clear_writes`.
    pub fn writes(&self) -> &[(Pin, PinState)] {
        &self.writes
    }

    pub fn clear_writes(&mut self) {
        self.writes.clear();
    }

    /// Mode the pin was configured with, if any.
    pub fn mode(&self, pin: Pin) -> Option<PinMode> {
        self.modes.get(&pin).copied()
    }

    /// Level of an output pin, low until first written.
    pub fn level(&self, pin: Pin) -> PinState {
        self.levels.get(&pin).copied().unwrap_or(PinState::Low)
    }

    /// True if both motor enable lines are asserted.
    pub fn motors_enabled(&self) -> bool {
        self.level(self.pins.enable_1) == PinState::High
            && self.level(self.pins.enable_2) == PinState::High
    }
}

impl Hardware for SimHardware {
    fn pin_mode(&mut self, pin: Pin, mode: PinMode) {
        self.modes.insert(pin, mode);
    }

    fn digital_write(&mut self, pin: Pin, state: PinState) {
        self.levels.insert(pin, state);
        self.writes.push((pin, state));

        // Enabling the second motor completes an actuation, so move the robot
        if pin == self.pins.enable_2 && state == PinState::High && self.motors_enabled() {
            let step = match self.level(self.pins.dir_1) {
                PinState::Low => -self.params.closing_cm_per_actuation,
                PinState::High => self.params.closing_cm_per_actuation,
            };
            self.set_distance_cm(self.distance_cm + step);

            trace!("Sim robot moved, distance now {:.1} cm", self.distance_cm);
        }
    }

    fn analog_read(&mut self, pin: Pin) -> u16 {
        if pin == self.pins.distance {
            sensors::raw_from_distance(self.distance_cm)
        } else {
            0
        }
    }

    fn pulse_in(&mut self, pin: Pin, state: PinState, _timeout: Duration) -> u64 {
        if pin == self.pins.speed && state == PinState::High && self.motors_enabled() {
            self.params.pulse_width_us
        } else {
            0
        }
    }
}
