//! Streaming concept-drift detection on the hybrid score.
//!
//! No ground-truth label exists online, so the hybrid score itself stands in
//! for the error rate fed to both detectors.

pub mod adwin;
pub mod ddm;
pub mod monitor;

pub use adwin::Adwin;
pub use ddm::{Ddm, DdmState};
pub use monitor::{DriftMonitor, DriftReport, DriftSnapshot};

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Detector parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// ADWIN confidence
    pub adwin_delta: f64,
    /// ADWIN checks for a cut every `adwin_clock` updates
    pub adwin_clock: u32,
    pub adwin_min_sub_window: usize,
    pub adwin_max_window: usize,
    /// DDM observations before it starts signalling
    pub ddm_min_instances: u64,
    pub ddm_warning_level: f64,
    pub ddm_drift_level: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            adwin_delta: 0.002,
            adwin_clock: 32,
            adwin_min_sub_window: 5,
            adwin_max_window: 1000,
            ddm_min_instances: 30,
            ddm_warning_level: 2.0,
            ddm_drift_level: 3.0,
        }
    }
}

impl DriftConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidThresholds(msg));
        if !(self.adwin_delta > 0.0 && self.adwin_delta < 1.0) {
            return invalid(format!("adwin_delta must be in (0, 1), got {}", self.adwin_delta));
        }
        if self.adwin_max_window < 2 * self.adwin_min_sub_window.max(1) {
            return invalid("adwin_max_window must hold two sub-windows".to_string());
        }
        if !(self.ddm_warning_level > 0.0 && self.ddm_warning_level < self.ddm_drift_level) {
            return invalid(format!(
                "ddm levels must satisfy 0 < warning ({}) < drift ({})",
                self.ddm_warning_level, self.ddm_drift_level
            ));
        }
        Ok(())
    }
}
