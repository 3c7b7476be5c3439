//! Drift Detection Method (DDM) over an error-rate stream.

/// Outcome of one DDM update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdmState {
    InControl,
    Warning,
    Drift,
}

/// DDM detector state.
#[derive(Debug, Clone)]
pub struct Ddm {
    min_instances: u64,
    warning_level: f64,
    drift_level: f64,
    n: u64,
    p: f64,
    s: f64,
    p_min: f64,
    s_min: f64,
    detections: u64,
}

impl Ddm {
    pub fn new(min_instances: u64, warning_level: f64, drift_level: f64) -> Self {
        let mut ddm = Self {
            min_instances: min_instances.max(1),
            warning_level,
            drift_level,
            n: 0,
            p: 0.0,
            s: 0.0,
            p_min: f64::MAX,
            s_min: f64::MAX,
            detections: 0,
        };
        ddm.restart();
        ddm
    }

    fn restart(&mut self) {
        self.n = 0;
        self.p = 0.0;
        self.s = 0.0;
        self.p_min = f64::MAX;
        self.s_min = f64::MAX;
    }

    /// Feed one error-rate observation in [0, 1].
    pub fn update(&mut self, error: f64) -> DdmState {
        if !error.is_finite() {
            return DdmState::InControl;
        }
        let error = error.clamp(0.0, 1.0);

        self.n += 1;
        let n = self.n as f64;
        self.p += (error - self.p) / n;
        self.s = (self.p * (1.0 - self.p) / n).max(0.0).sqrt();

        if self.n < self.min_instances {
            return DdmState::InControl;
        }

        let level = self.p + self.s;
        if level <= self.p_min + self.s_min {
            self.p_min = self.p;
            self.s_min = self.s;
        }

        if level > self.p_min + self.drift_level * self.s_min {
            self.detections += 1;
            self.restart();
            DdmState::Drift
        } else if level > self.p_min + self.warning_level * self.s_min {
            DdmState::Warning
        } else {
            DdmState::InControl
        }
    }

    pub fn error_rate(&self) -> f64 {
        self.p
    }

    pub fn observations(&self) -> u64 {
        self.n
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }
}
