//! # Data store
//!
//! Holds the latest telemetry sample and loop status, shared between the control loop thread
//! (the only writer of samples) and the telemetry publisher.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::{Arc, Mutex};
use serde::Serialize;

use crate::control_loop::{MotionState, StatusReport, TelemetrySample};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Data store shared between threads.
pub type SharedDataStore = Arc<Mutex<DataStore>>;

#[derive(Debug, Default, Clone, Serialize)]
pub struct DataStore {
    /// Most recent sample. Overwritten by every tick, never cleared.
    pub latest_sample: Option<TelemetrySample>,

    /// Number of samples recorded since startup.
    pub num_samples: u64,

    pub motion: MotionState,

    pub generation: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Create an empty store ready to be shared.
    pub fn new_shared() -> SharedDataStore {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn record_sample(&mut self, sample: TelemetrySample) {
        self.latest_sample = Some(sample);
        self.num_samples += 1;
    }

    pub fn update_status(&mut self, report: &StatusReport) {
        self.motion = report.motion;
        self.generation = report.generation;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_latest_sample_overwritten() {
        let mut ds = DataStore::default();
        assert!(ds.latest_sample.is_none());

        ds.record_sample(TelemetrySample { distance: 40, speed: 510.5 });
        ds.record_sample(TelemetrySample { distance: 39, speed: 0.0 });

        assert_eq!(ds.latest_sample, Some(TelemetrySample { distance: 39, speed: 0.0 }));
        assert_eq!(ds.num_samples, 2);
    }
}
