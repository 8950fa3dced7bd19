//! Implementations for the ControlLoop state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace};
use serde::Serialize;
use std::{convert::Infallible, time::Duration};

// Internal
use super::{
    Params, LoopCmd, MotionState, TelemetrySample, 
    LoopCompletion, CompletionCause, ControlLoopError
};
use crate::{
    hw::Hardware,
    motor_ctrl::{self, Actuation},
    sensors
};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Control loop module state.
///
/// The loop owns the hardware, so that commands and ticks, which are both processed by
/// [`State::proc`], can never actuate the motors concurrently.
pub struct ControlLoop<H: Hardware> {
    hw: H,

    params: Params,

    motion: MotionState,

    /// Generation of the current (or last) run.
    generation: u64,

    /// Number of ticks executed by the current run.
    num_ticks: u64,
}

/// Input data to the control loop.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// Command to apply before any tick, or `None` if there is no new command.
    pub cmd: Option<LoopCmd>,

    /// True if the tick period has elapsed and the loop should tick.
    pub tick_due: bool,
}

/// Output of one processing step.
#[derive(Debug, Default, Clone)]
pub struct OutputData {
    /// Demands written to the motors, in order.
    pub actuations: Vec<Actuation>,

    /// Sample taken by a tick, if one ran.
    pub sample: Option<TelemetrySample>,

    /// Runs that ended during this step.
    pub completions: Vec<LoopCompletion>,
}

/// Status report for control loop processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    pub motion: MotionState,
    pub generation: u64,
    pub num_ticks: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<H: Hardware> State for ControlLoop<H> {
    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = Infallible;

    /// Apply any new command, then run a tick if one is due.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> 
    {
        let mut output = OutputData::default();

        if let Some(cmd) = input_data.cmd {
            self.handle_cmd(cmd, &mut output);
        }

        if input_data.tick_due && self.motion.is_moving() {
            self.tick(&mut output);
        }

        Ok((output, self.report()))
    }
}

impl<H: Hardware> ControlLoop<H> {
    /// Create the loop, configuring the board's pins.
    pub fn new(mut hw: H, params: Params) -> Result<Self, ControlLoopError> {
        if util::time::period_from_secs(params.tick_period_s).is_none() {
            return Err(ControlLoopError::InvalidParams(format!(
                "tick_period_s must be positive, found {}",
                params.tick_period_s
            )))
        }

        motor_ctrl::setup(&mut hw, &params.pins);

        Ok(Self {
            hw,
            params,
            motion: MotionState::Idle,
            generation: 0,
            num_ticks: 0,
        })
    }

    /// Delay between two ticks.
    pub fn tick_period(&self) -> Duration {
        util::time::secs_to_duration(self.params.tick_period_s)
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }

    pub fn hw(&self) -> &H {
        &self.hw
    }

    pub fn hw_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            motion: self.motion,
            generation: self.generation,
            num_ticks: self.num_ticks,
        }
    }

    /// Bring the motors to neutral whatever the current state.
    ///
    /// Returns the completion of the current run if there was one.
    pub fn make_safe(&mut self) -> Option<LoopCompletion> {
        if self.motion.is_moving() {
            let mut output = OutputData::default();
            self.terminate(CompletionCause::StopCommand, &mut output);
            output.completions.pop()
        }
        else {
            motor_ctrl::actuate(&mut self.hw, &self.params.pins, Actuation::Neutral);
            None
        }
    }

    fn handle_cmd(&mut self, cmd: LoopCmd, output: &mut OutputData) {
        match cmd {
            LoopCmd::Move(direction) => {
                if self.motion.is_moving() {
                    debug!(
                        "Run {} superseded after {} ticks", 
                        self.generation, 
                        self.num_ticks
                    );
                    output.completions.push(LoopCompletion {
                        generation: self.generation,
                        cause: CompletionCause::Superseded,
                        num_ticks: self.num_ticks,
                    });
                }

                self.generation += 1;
                self.num_ticks = 0;
                self.motion = MotionState::from(direction);

                info!("Starting run {} moving {}", self.generation, direction);
            },
            LoopCmd::Stop => {
                if self.motion.is_moving() {
                    info!("Stop requested");
                    self.terminate(CompletionCause::StopCommand, output);
                }
                else {
                    debug!("Stop requested while idle, nothing to do");
                }
            }
        }
    }

    /// Check the safety threshold, then actuate and sample.
    fn tick(&mut self, output: &mut OutputData) {
        let direction = match self.motion.direction() {
            Some(d) => d,
            None => return
        };

        self.num_ticks += 1;

        let distance = sensors::read_distance(&mut self.hw, self.params.pins.distance);

        if distance <= self.params.safety_threshold {
            info!(
                "Obstacle at {} (threshold {}), stopping",
                distance,
                self.params.safety_threshold
            );
            self.terminate(CompletionCause::ObstacleDetected, output);
            return
        }

        let actuation = Actuation::from(direction);
        motor_ctrl::actuate(&mut self.hw, &self.params.pins, actuation);
        output.actuations.push(actuation);

        let sample = TelemetrySample {
            distance: sensors::read_distance(&mut self.hw, self.params.pins.distance),
            speed: sensors::read_speed(&mut self.hw, self.params.pins.speed),
        };

        debug!("Distance is: {}, Speed is: {}", sample.distance, sample.speed);
        trace!("Run {} tick {}", self.generation, self.num_ticks);

        output.sample = Some(sample);
    }

    fn terminate(&mut self, cause: CompletionCause, output: &mut OutputData) {
        self.motion = MotionState::Stopping;

        motor_ctrl::actuate(&mut self.hw, &self.params.pins, Actuation::Neutral);
        output.actuations.push(Actuation::Neutral);

        self.motion = MotionState::Idle;

        info!(
            "Run {} done after {} ticks ({:?})", 
            self.generation, 
            self.num_ticks, 
            cause
        );

        output.completions.push(LoopCompletion {
            generation: self.generation,
            cause,
            num_ticks: self.num_ticks,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::Direction;
    use crate::hw::{PinState, sim::{SimHardware, SimParams}};

    fn sim_loop(start_distance_cm: f64, closing_cm_per_actuation: f64) -> ControlLoop<SimHardware> {
        let params = Params::default();
        let hw = SimHardware::new(
            SimParams {
                start_distance_cm,
                closing_cm_per_actuation,
                pulse_width_us: 5000,
            },
            params.pins
        );

        ControlLoop::new(hw, params).unwrap()
    }

    fn step(ctrl: &mut ControlLoop<SimHardware>, cmd: Option<LoopCmd>, tick_due: bool) -> OutputData {
        match ctrl.proc(&InputData { cmd, tick_due }) {
            Ok((o, _)) => o,
            Err(e) => match e {}
        }
    }

    #[test]
    fn test_stop_after_three_ticks() {
        let mut ctrl = sim_loop(50.0, 0.0);
        let mut actuations = Vec::new();
        let mut samples = Vec::new();

        let o = step(&mut ctrl, Some(LoopCmd::Move(Direction::Forward)), false);
        assert!(o.actuations.is_empty());
        assert_eq!(ctrl.motion(), MotionState::MovingForward);

        for _ in 0..3 {
            let o = step(&mut ctrl, None, true);
            actuations.extend(o.actuations);
            samples.extend(o.sample);
        }

        let o = step(&mut ctrl, Some(LoopCmd::Stop), false);
        actuations.extend(o.actuations.iter().copied());
        assert_eq!(
            o.completions,
            vec![LoopCompletion {
                generation: 1,
                cause: CompletionCause::StopCommand,
                num_ticks: 3
            }]
        );

        // Motors are neutral straight away, before any further tick
        let pins = Params::default().pins;
        assert_eq!(ctrl.hw().level(pins.enable_1), PinState::Low);
        assert_eq!(ctrl.hw().level(pins.enable_2), PinState::Low);
        assert_eq!(ctrl.motion(), MotionState::Idle);

        // Ticks after the stop do nothing
        let o = step(&mut ctrl, None, true);
        assert!(o.actuations.is_empty());
        assert!(o.sample.is_none());

        assert_eq!(
            actuations,
            vec![Actuation::Forward, Actuation::Forward, Actuation::Forward, Actuation::Neutral]
        );
        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.speed >= 0.0 && s.distance == 50));
    }

    #[test]
    fn test_obstacle_on_tick_five() {
        // 55 cm away closing 10 cm per tick, the 5th tick sees 15 cm
        let mut ctrl = sim_loop(55.0, 10.0);

        step(&mut ctrl, Some(LoopCmd::Move(Direction::Forward)), false);

        for i in 1..=4 {
            let o = step(&mut ctrl, None, true);
            assert_eq!(o.actuations, vec![Actuation::Forward], "tick {}", i);
            assert!(o.completions.is_empty());
        }

        let o = step(&mut ctrl, None, true);
        assert_eq!(o.actuations, vec![Actuation::Neutral]);
        assert!(o.sample.is_none());
        assert_eq!(
            o.completions,
            vec![LoopCompletion {
                generation: 1,
                cause: CompletionCause::ObstacleDetected,
                num_ticks: 5
            }]
        );
        assert!(!ctrl.hw().motors_enabled());

        let o = step(&mut ctrl, None, true);
        assert!(o.actuations.is_empty());
        assert_eq!(ctrl.report().num_ticks, 5);
    }

    #[test]
    fn test_move_supersedes_running_loop() {
        let mut ctrl = sim_loop(50.0, 1.0);

        step(&mut ctrl, Some(LoopCmd::Move(Direction::Forward)), false);
        step(&mut ctrl, None, true);
        step(&mut ctrl, None, true);

        let o = step(&mut ctrl, Some(LoopCmd::Move(Direction::Backward)), false);
        assert!(o.actuations.is_empty());
        assert_eq!(
            o.completions,
            vec![LoopCompletion {
                generation: 1,
                cause: CompletionCause::Superseded,
                num_ticks: 2
            }]
        );
        assert_eq!(ctrl.report().generation, 2);
        assert_eq!(ctrl.motion(), MotionState::MovingBackward);

        ctrl.hw_mut().clear_writes();
        let o = step(&mut ctrl, None, true);
        assert_eq!(o.actuations, vec![Actuation::Backward]);

        // Only the new direction was written
        let pins = Params::default().pins;
        assert!(ctrl.hw().writes().iter().all(|&(p, s)| {
            (p != pins.dir_1 && p != pins.dir_2) || s == PinState::High
        }));
        assert_eq!(o.sample.map(|s| s.distance), Some(49));
    }

    #[test]
    fn test_move_and_tick_in_one_step() {
        let mut ctrl = sim_loop(50.0, 0.0);

        let o = step(&mut ctrl, Some(LoopCmd::Move(Direction::Backward)), true);
        assert_eq!(o.actuations, vec![Actuation::Backward]);
        assert!(o.sample.is_some());
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let mut ctrl = sim_loop(50.0, 0.0);
        ctrl.hw_mut().clear_writes();

        for _ in 0..2 {
            let o = step(&mut ctrl, Some(LoopCmd::Stop), true);
            assert!(o.actuations.is_empty());
            assert!(o.completions.is_empty());
        }

        assert!(ctrl.hw().writes().is_empty());
        assert_eq!(ctrl.report().generation, 0);
    }

    #[test]
    fn test_obstacle_already_too_close() {
        let mut ctrl = sim_loop(10.0, 1.0);

        step(&mut ctrl, Some(LoopCmd::Move(Direction::Forward)), false);
        let o = step(&mut ctrl, None, true);

        assert_eq!(o.actuations, vec![Actuation::Neutral]);
        assert_eq!(o.completions[0].cause, CompletionCause::ObstacleDetected);
        assert_eq!(ctrl.hw().distance_cm(), 10.0);
    }

    #[test]
    fn test_make_safe() {
        let mut ctrl = sim_loop(50.0, 0.0);

        assert!(ctrl.make_safe().is_none());

        step(&mut ctrl, Some(LoopCmd::Move(Direction::Forward)), true);
        assert!(ctrl.hw().motors_enabled());

        let c = ctrl.make_safe().unwrap();
        assert_eq!(c.cause, CompletionCause::StopCommand);
        assert!(!ctrl.hw().motors_enabled());
    }

    #[test]
    fn test_invalid_tick_period() {
        let params = Params { tick_period_s: 0.0, ..Params::default() };
        let hw = SimHardware::new(SimParams::default(), params.pins);

        match ControlLoop::new(hw, params) {
            Err(ControlLoopError::InvalidParams(_)) => (),
            _ => panic!("Expected invalid params")
        }
    }
}
