//! # Hardware interface
//!
//! The robot's board is accessed through the Arduino-like pin primitives of the [`Hardware`]
//! trait. The board support itself lives outside this crate, [`sim::SimHardware`] is provided
//! so the agent can be run and tested without a board.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{convert::TryFrom, fmt, str::FromStr, time::Duration};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Pin level access to the robot's board.
pub trait Hardware: Send {
    /// Configure a pin as an input or an output.
    fn pin_mode(&mut self, pin: Pin, mode: PinMode);

    /// Drive an output pin to the given level.
    fn digital_write(&mut self, pin: Pin, state: PinState);

    /// Read an analog input. The ADC is 12 bits wide, so values are in `0..4096`.
    fn analog_read(&mut self, pin: Pin) -> u16;

    /// Measure the length of a pulse of the given level on a pin.
    ///
    /// Returns the pulse length in microseconds, or 0 if no pulse completed before the timeout.
    fn pulse_in(&mut self, pin: Pin, state: PinState, timeout: Duration) -> u64;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Board pins used by the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMap {
    /// Enable line of motor 1 (E1).
    pub enable_1: Pin,

    /// Direction line of motor 1 (M1).
    pub dir_1: Pin,

    /// Enable line of motor 2 (E2).
    pub enable_2: Pin,

    /// Direction line of motor 2 (M2).
    pub dir_2: Pin,

    /// Analog input of the distance sensor.
    pub distance: Pin,

    /// Digital input of the wheel speed sensor.
    pub speed: Pin,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A board pin. Written as `GPIO<n>` or `A<n>` in parameter files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pin {
    Gpio(u8),
    Analog(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Low,
    High,
}

#[derive(Debug, thiserror::Error)]
pub enum PinParseError {
    #[error("\"{0}\" is not a pin, expected GPIO<n> or A<n>")]
    InvalidPin(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PinMap {
    /// Pin out of the motor shield the robot was built with.
    fn default() -> Self {
        Self {
            enable_1: Pin::Gpio(4),
            dir_1: Pin::Gpio(5),
            enable_2: Pin::Gpio(7),
            dir_2: Pin::Gpio(6),
            distance: Pin::Analog(2),
            speed: Pin::Gpio(12),
        }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pin::Gpio(n) => write!(f, "GPIO{}", n),
            Pin::Analog(n) => write!(f, "A{}", n),
        }
    }
}

impl FromStr for Pin {
    type Err = PinParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();

        let parsed = if let Some(n) = upper.strip_prefix("GPIO") {
            n.parse().ok().map(Pin::Gpio)
        } else if let Some(n) = upper.strip_prefix('A') {
            n.parse().ok().map(Pin::Analog)
        } else {
            None
        };

        parsed.ok_or_else(|| PinParseError::InvalidPin(s.to_string()))
    }
}

impl TryFrom<String> for Pin {
    type Error = PinParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Pin> for String {
    fn from(pin: Pin) -> String {
        pin.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pin_parse() {
        assert_eq!("GPIO4".parse::<Pin>().unwrap(), Pin::Gpio(4));
        assert_eq!("gpio12".parse::<Pin>().unwrap(), Pin::Gpio(12));
        assert_eq!("A2".parse::<Pin>().unwrap(), Pin::Analog(2));
        assert!("B3".parse::<Pin>().is_err());
        assert!("GPIO".parse::<Pin>().is_err());
        assert!("A300".parse::<Pin>().is_err());

        assert_eq!(Pin::Gpio(7).to_string(), "GPIO7");
    }

    #[test]
    fn test_pin_map_from_params() {
        let map: PinMap = util::params::from_str(
            r#"
            enable_1 = "GPIO4"
            dir_1 = "GPIO5"
            enable_2 = "GPIO7"
            dir_2 = "GPIO6"
            distance = "A2"
            speed = "GPIO12"
            "#
        ).unwrap();

        assert_eq!(map, PinMap::default());
    }
}
