//! # Control loop runner
//!
//! Runs a [`ControlLoop`] on a dedicated thread. Commands are received over a channel and ticks
//! are scheduled with the channel's receive timeout, so a command arriving between two ticks is
//! handled as soon as it arrives while an in-flight tick always completes first.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Instant,
};
use log::{debug, warn};

use super::{ControlLoop, ControlLoopError, InputData, LoopCmd, LoopCompletion};
use crate::{data_store::SharedDataStore, hw::Hardware};
use util::module::State;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Handle to a control loop running on its own thread.
///
/// Dropping the handle, or calling [`ControlLoopHandle::shutdown`], stops the thread with the
/// motors in neutral.
pub struct ControlLoopHandle {
    cmd_sender: Option<Sender<LoopCmd>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlLoopHandle {
    /// Start the control loop thread.
    ///
    /// Samples and status are written into `ds`, and every run completion is sent on
    /// `completion_sender`.
    pub fn spawn<H>(
        ctrl: ControlLoop<H>,
        ds: SharedDataStore,
        completion_sender: Sender<LoopCompletion>,
    ) -> Result<Self, ControlLoopError>
    where
        H: Hardware + 'static
    {
        let (cmd_sender, cmd_receiver) = mpsc::channel();

        let join_handle = thread::Builder::new()
            .name("control_loop".into())
            .spawn(move || run(ctrl, cmd_receiver, ds, completion_sender))
            .map_err(ControlLoopError::SpawnError)?;

        Ok(Self {
            cmd_sender: Some(cmd_sender),
            join_handle: Some(join_handle),
        })
    }

    /// Send a command to the loop.
    pub fn send(&self, cmd: LoopCmd) -> Result<(), ControlLoopError> {
        match self.cmd_sender {
            Some(ref s) => s.send(cmd).map_err(|_| ControlLoopError::RunnerExited),
            None => Err(ControlLoopError::RunnerExited)
        }
    }

    /// Stop the loop thread and wait for it to neutralise the motors.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        // Closing the channel is the signal for the thread to exit
        self.cmd_sender.take();

        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                warn!("Control loop thread panicked");
            }
        }
    }
}

impl Drop for ControlLoopHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn run<H: Hardware>(
    mut ctrl: ControlLoop<H>,
    cmd_receiver: Receiver<LoopCmd>,
    ds: SharedDataStore,
    completion_sender: Sender<LoopCompletion>,
) {
    let tick_period = ctrl.tick_period();
    let mut next_tick: Option<Instant> = None;

    loop {
        // Wait for a command, or until the next tick is due
        let input = match next_tick {
            Some(t) => {
                match cmd_receiver.recv_timeout(t.saturating_duration_since(Instant::now())) {
                    Ok(cmd) => InputData { cmd: Some(cmd), tick_due: false },
                    Err(RecvTimeoutError::Timeout) => InputData { cmd: None, tick_due: true },
                    Err(RecvTimeoutError::Disconnected) => break
                }
            },
            None => match cmd_receiver.recv() {
                Ok(cmd) => InputData { cmd: Some(cmd), tick_due: false },
                Err(_) => break
            }
        };

        let (output, report) = match ctrl.proc(&input) {
            Ok(r) => r,
            Err(e) => match e {}
        };

        // A new run, or a tick of a continuing run, schedules the next tick
        if report.motion.is_moving() {
            if input.tick_due || matches!(input.cmd, Some(LoopCmd::Move(_))) {
                next_tick = Some(Instant::now() + tick_period);
            }
        }
        else {
            next_tick = None;
        }

        match ds.lock() {
            Ok(mut ds) => {
                if let Some(sample) = output.sample {
                    ds.record_sample(sample);
                }
                ds.update_status(&report);
            },
            Err(_) => warn!("Couldn't get lock on the data store, sample dropped")
        }

        for completion in output.completions {
            if completion_sender.send(completion).is_err() {
                debug!("No receiver for completion of run {}", completion.generation);
            }
        }
    }

    debug!("Control loop command channel closed, making safe");

    let completion = ctrl.make_safe();

    if let Ok(mut ds) = ds.lock() {
        ds.update_status(&ctrl.report());
    }

    if let Some(c) = completion {
        completion_sender.send(c).ok();
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
