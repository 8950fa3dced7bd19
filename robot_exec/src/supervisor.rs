//! # Supervisor
//!
//! Decides whether the executable keeps running when a run of the control loop completes or the
//! network session changes state. The control loop and network layers only report what
//! happened, the process is never terminated from inside them.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};

use comms_if::net::{NetEvent, NetParams};
use crate::{
    control_loop::{CompletionCause, LoopCompletion},
    params::RobotExecParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supervisor {
    /// Exit once a run stops in front of an obstacle.
    exit_on_obstacle: bool,

    /// The session reconnects by itself, so a lost connection isn't final.
    reconnect: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// What the executable should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,

    /// Stop cleanly with a success status.
    Exit,

    /// Stop with a failure status for the given reason.
    Fatal(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Supervisor {
    pub fn new(exec_params: &RobotExecParams, net_params: &NetParams) -> Self {
        Self {
            exit_on_obstacle: exec_params.exit_on_obstacle,
            reconnect: net_params.reconnect.is_some(),
        }
    }

    pub fn on_completion(&self, completion: &LoopCompletion) -> Verdict {
        match completion.cause {
            CompletionCause::ObstacleDetected if self.exit_on_obstacle => {
                info!("Obstacle reached at the end of run {}", completion.generation);
                Verdict::Exit
            },
            _ => Verdict::Continue
        }
    }

    pub fn on_net_event(&self, event: &NetEvent) -> Verdict {
        match event {
            NetEvent::ConnectionLost(e) if self.reconnect => {
                warn!("Connection lost ({}), reconnecting", e);
                Verdict::Continue
            },
            NetEvent::ConnectionLost(e) => Verdict::Fatal(format!(
                "Connection to the messaging service lost: {}", 
                e
            )),
            NetEvent::Connected | NetEvent::Message { .. } => Verdict::Continue
        }
    }

    /// The session's event channel closed, so no further events or commands will arrive.
    pub fn on_net_closed(&self) -> Verdict {
        Verdict::Fatal("The network session has stopped".into())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
