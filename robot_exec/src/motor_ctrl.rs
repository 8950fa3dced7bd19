//! # Motor control
//!
//! Drives the two-channel motor shield. Each motor has an enable line, which powers it, and a
//! direction line, which selects its rotation direction.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use serde::Serialize;

use comms_if::tc::Direction;
use crate::hw::{Hardware, PinMap, PinMode, PinState};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A demand sent to the motors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Actuation {
    Forward,
    Backward,
    /// Both enable lines de-asserted.
    Neutral,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl From<Direction> for Actuation {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => Actuation::Forward,
            Direction::Backward => Actuation::Backward,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Configure the motor and sensor pins.
pub fn setup<H: Hardware + ?Sized>(hw: &mut H, pins: &PinMap) {
    hw.pin_mode(pins.dir_1, PinMode::Output);
    hw.pin_mode(pins.dir_2, PinMode::Output);

    hw.pin_mode(pins.enable_1, PinMode::Output);
    hw.pin_mode(pins.enable_2, PinMode::Output);

    hw.pin_mode(pins.speed, PinMode::Input);
}

/// Write the given demand to the motor pins.
///
/// Direction lines are always set before the motors are enabled.
pub fn actuate<H: Hardware + ?Sized>(hw: &mut H, pins: &PinMap, actuation: Actuation) {
    trace!("Actuating {:?}", actuation);

    let dir_state = match actuation {
        Actuation::Forward => PinState::Low,
        Actuation::Backward => PinState::High,
        Actuation::Neutral => {
            hw.digital_write(pins.enable_1, PinState::Low);
            hw.digital_write(pins.enable_2, PinState::Low);
            return
        }
    };

    hw.digital_write(pins.dir_1, dir_state);
    hw.digital_write(pins.dir_2, dir_state);

    hw.digital_write(pins.enable_1, PinState::High);
    hw.digital_write(pins.enable_2, PinState::High);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hw::sim::{SimHardware, SimParams};

    #[test]
    fn test_actuate_sequences() {
        let pins = PinMap::default();
        let mut hw = SimHardware::new(SimParams::default(), pins);

        setup(&mut hw, &pins);
        assert_eq!(hw.mode(pins.enable_1), Some(PinMode::Output));
        assert_eq!(hw.mode(pins.speed), Some(PinMode::Input));

        actuate(&mut hw, &pins, Actuation::Backward);
        assert_eq!(
            hw.writes(),
            &[
                (pins.dir_1, PinState::High),
                (pins.dir_2, PinState::High),
                (pins.enable_1, PinState::High),
                (pins.enable_2, PinState::High),
            ]
        );

        hw.clear_writes();
        actuate(&mut hw, &pins, Actuation::Neutral);
        assert_eq!(
            hw.writes(),
            &[(pins.enable_1, PinState::Low), (pins.enable_2, PinState::Low)]
        );
        assert!(!hw.motors_enabled());
    }
}
