//! # Robot Executable Parameters
//!
//! This module provide parameters for the robot executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::hw::sim::SimParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RobotExecParams {

    /// Label identifying the device in published telemetry
    pub device_label: String,

    /// Period between two telemetry packets
    ///
    /// Units: seconds
    pub telemetry_period_s: f64,

    /// If true the executable exits once the loop stops for an obstacle
    pub exit_on_obstacle: bool,

    /// Period of the main loop, bounding how long a completion or network event can wait
    ///
    /// Units: seconds
    pub main_cycle_period_s: f64,

    /// Simulated hardware set up
    #[serde(default)]
    pub sim: SimParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ParamsError {
    #[error("{0} must be a positive number of seconds, found {1}")]
    InvalidPeriod(&'static str, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RobotExecParams {
    /// Check the periods are usable as thread timeouts.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let periods = [
            ("telemetry_period_s", self.telemetry_period_s),
            ("main_cycle_period_s", self.main_cycle_period_s),
        ];

        for &(name, secs) in periods.iter() {
            if util::time::period_from_secs(secs).is_none() {
                return Err(ParamsError::InvalidPeriod(name, secs))
            }
        }

        Ok(())
    }
}
