//! Process-wide drift monitor shared by every request.

use crate::drift::adwin::Adwin;
use crate::drift::ddm::{Ddm, DdmState};
use crate::drift::DriftConfig;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Per-update drift signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriftReport {
    /// Either detector fired on this update
    pub drift_detected: bool,
    pub adwin: bool,
    pub ddm: bool,
    pub warning: bool,
}

/// Read-only view of the detector counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftSnapshot {
    pub updates: u64,
    pub detections: u64,
    pub adwin_width: usize,
    pub adwin_mean: f64,
    pub ddm_error_rate: f64,
}

struct DriftState {
    adwin: Adwin,
    ddm: Ddm,
    updates: u64,
    detections: u64,
}

/// Owns the detector state; updates are serialized behind a mutex.
pub struct DriftMonitor {
    state: Mutex<DriftState>,
}

impl DriftMonitor {
    pub fn new(config: &DriftConfig) -> Self {
        Self {
            state: Mutex::new(DriftState {
                adwin: Adwin::new(
                    config.adwin_delta,
                    config.adwin_clock,
                    config.adwin_min_sub_window,
                    config.adwin_max_window,
                ),
                ddm: Ddm::new(
                    config.ddm_min_instances,
                    config.ddm_warning_level,
                    config.ddm_drift_level,
                ),
                updates: 0,
                detections: 0,
            }),
        }
    }

    /// Feed a hybrid score and report whether drift fired on this update.
    ///
    /// Never fails: a non-finite score or a poisoned lock yields no drift.
    pub fn update(&self, score: f64) -> DriftReport {
        if !score.is_finite() {
            return DriftReport::default();
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.updates += 1;

        let adwin = state.adwin.update(score);
        let ddm_state = state.ddm.update(score);
        let ddm = ddm_state == DdmState::Drift;

        let report = DriftReport {
            drift_detected: adwin || ddm,
            adwin,
            ddm,
            warning: ddm_state == DdmState::Warning,
        };

        if report.drift_detected {
            state.detections += 1;
            warn!(
                adwin,
                ddm,
                updates = state.updates,
                window = state.adwin.width(),
                window_mean = state.adwin.mean(),
                "Concept drift detected in risk score stream"
            );
        }

        report
    }

    pub fn snapshot(&self) -> DriftSnapshot {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        DriftSnapshot {
            updates: state.updates,
            detections: state.detections,
            adwin_width: state.adwin.width(),
            adwin_mean: state.adwin.mean(),
            ddm_error_rate: state.ddm.error_rate(),
        }
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new(&DriftConfig::default())
    }
}
