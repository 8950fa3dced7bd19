//! # Sensors
//!
//! Conversion of the raw distance and wheel speed sensor readings into the units published in
//! telemetry.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;

use crate::hw::{Hardware, Pin, PinState};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of ADC counts over the full input range.
pub const ADC_FULL_SCALE: f64 = 4096.0;

/// ADC reference voltage.
///
/// Units: volts
pub const ADC_REF_V: f64 = 3.0;

/// Maximum wait for a speed sensor pulse.
pub const SPEED_PULSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Wheel diameter.
///
/// Units: centimeters
const WHEEL_DIAMETER_CM: f64 = 6.5;

/// Number of encoder pulses per wheel revolution.
const PULSES_PER_REV: f64 = 4.0;

// Distance sensor calibration, inverse distance is linear in output voltage
const INV_DIST_GAIN: f64 = 0.08;
const INV_DIST_OFFSET: f64 = 0.01;
const DIST_OFFSET_CM: f64 = 0.42;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Read the distance to the nearest obstacle.
pub fn read_distance<H: Hardware + ?Sized>(hw: &mut H, pin: Pin) -> i64 {
    distance_from_raw(hw.analog_read(pin))
}

/// Read the wheel speed. A timed out pulse read is a valid zero speed.
pub fn read_speed<H: Hardware + ?Sized>(hw: &mut H, pin: Pin) -> f64 {
    speed_from_pulse(hw.pulse_in(pin, PinState::High, SPEED_PULSE_TIMEOUT))
}

/// Convert a raw ADC reading of the distance sensor into a distance, rounded down.
///
/// Units: centimeters
pub fn distance_from_raw(raw: u16) -> i64 {
    let v = (raw as f64) * ADC_REF_V / ADC_FULL_SCALE;
    let inv_dist = INV_DIST_GAIN * v + INV_DIST_OFFSET;

    (1.0 / inv_dist - DIST_OFFSET_CM).floor() as i64
}

/// Inverse of [`distance_from_raw`], giving the ADC reading at which the sensor reports
/// `dist_cm`. Used to simulate the sensor.
pub fn raw_from_distance(dist_cm: f64) -> u16 {
    let inv_dist = 1.0 / (dist_cm + DIST_OFFSET_CM);
    let v = (inv_dist - INV_DIST_OFFSET) / INV_DIST_GAIN;
    let raw = v * ADC_FULL_SCALE / ADC_REF_V;

    // Round towards the reading that still reports at least `dist_cm`
    (raw - 1e-6).floor().max(0.0).min(ADC_FULL_SCALE - 1.0) as u16
}

/// Convert the length of a high pulse of the speed sensor into a wheel speed, rounded to one
/// decimal place.
pub fn speed_from_pulse(high_pulse_us: u64) -> f64 {
    // Square wave, so a full period is twice the high pulse
    let period_us = high_pulse_us.saturating_mul(2);

    if period_us == 0 {
        return 0.0
    }

    let pulse_per_sec = 1_000_000.0 / period_us as f64;
    let speed = pulse_per_sec * std::f64::consts::PI * WHEEL_DIAMETER_CM / PULSES_PER_REV;

    (speed * 10.0).round() / 10.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distance_from_raw() {
        // No reflection gives the far end of the sensor range
        assert_eq!(distance_from_raw(0), 99);
        assert_eq!(distance_from_raw(4095), 3);
        assert_eq!(distance_from_raw(936), 15);
    }

    #[test]
    fn test_raw_from_distance_inverts() {
        for d in 4..=99 {
            assert_eq!(distance_from_raw(raw_from_distance(d as f64)), d);
        }

        // Out of range distances saturate
        assert_eq!(raw_from_distance(500.0), 0);
        assert_eq!(raw_from_distance(0.0), 4095);
    }

    #[test]
    fn test_speed_from_pulse() {
        assert_eq!(speed_from_pulse(0), 0.0);
        assert_eq!(speed_from_pulse(5000), 510.5);
        assert!(speed_from_pulse(u64::MAX) >= 0.0);
    }
}
