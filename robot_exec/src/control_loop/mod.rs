//! Control loop module
//!
//! The control loop drives the robot in the commanded direction until either a stop command is
//! received or an obstacle is closer than the safety threshold. Each run of the loop is
//! identified by a generation number, a new move command always starts a new generation and
//! invalidates the previous one.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod runner;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

// Internal
use comms_if::tc::Direction;
pub use params::*;
pub use runner::*;
pub use state::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A sensor sample taken during a tick of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySample {
    /// Distance to the nearest obstacle. May be out of the sensor's valid range.
    ///
    /// Units: centimeters
    pub distance: i64,

    /// Wheel speed, never negative.
    pub speed: f64,
}

/// Signal emitted when a run of the loop ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopCompletion {
    /// Generation of the run that ended.
    pub generation: u64,

    pub cause: CompletionCause,

    /// Number of ticks executed by the run, including the one that ended it.
    pub num_ticks: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Commands accepted by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCmd {
    /// Start a new run in the given direction, replacing any current run.
    Move(Direction),

    /// End the current run.
    Stop,
}

/// Motion state of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionState {
    Idle,
    MovingForward,
    MovingBackward,
    /// Transient state while the motors are being brought to neutral.
    Stopping,
}

/// Reason a run of the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletionCause {
    /// A stop command was received.
    StopCommand,

    /// An obstacle came within the safety threshold.
    ObstacleDetected,

    /// A new move command replaced the run.
    Superseded,
}

/// Possible errors that can occur during ControlLoop operation.
#[derive(Debug, thiserror::Error)]
pub enum ControlLoopError {
    #[error("Invalid control loop parameters: {0}")]
    InvalidParams(String),

    #[error("The control loop runner has exited")]
    RunnerExited,

    #[error("Could not start the control loop thread: {0}")]
    SpawnError(std::io::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MotionState {
    fn default() -> Self {
        MotionState::Idle
    }
}

impl MotionState {
    /// Return the direction of travel, if moving.
    pub fn direction(&self) -> Option<Direction> {
        match self {
            MotionState::MovingForward => Some(Direction::Forward),
            MotionState::MovingBackward => Some(Direction::Backward),
            MotionState::Idle | MotionState::Stopping => None,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.direction().is_some()
    }
}

impl From<Direction> for MotionState {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => MotionState::MovingForward,
            Direction::Backward => MotionState::MovingBackward,
        }
    }
}
