//! Adaptive windowing (ADWIN) change detector over a bounded window.

use std::collections::VecDeque;

/// ADWIN detector state.
///
/// Keeps the most recent values, and every `clock` updates looks for a split
/// point where the older and newer sub-windows have means further apart than
/// the Hoeffding-style bound allows. On a cut the older side is dropped.
#[derive(Debug, Clone)]
pub struct Adwin {
    delta: f64,
    clock: u32,
    min_sub_window: usize,
    max_window: usize,
    window: VecDeque<f64>,
    sum: f64,
    sum_sq: f64,
    ticks: u32,
    detections: u64,
}

impl Adwin {
    pub fn new(delta: f64, clock: u32, min_sub_window: usize, max_window: usize) -> Self {
        Self {
            delta,
            clock: clock.max(1),
            min_sub_window: min_sub_window.max(1),
            max_window: max_window.max(2),
            window: VecDeque::with_capacity(max_window.max(2)),
            sum: 0.0,
            sum_sq: 0.0,
            ticks: 0,
            detections: 0,
        }
    }

    /// Add a value; returns true when this update cut the window.
    pub fn update(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }

        self.window.push_back(value);
        self.sum += value;
        self.sum_sq += value * value;
        if self.window.len() > self.max_window {
            self.pop_oldest();
        }

        self.ticks += 1;
        if self.ticks < self.clock {
            return false;
        }
        self.ticks = 0;

        let mut detected = false;
        while let Some(cut) = self.find_cut() {
            for _ in 0..cut {
                self.pop_oldest();
            }
            detected = true;
        }
        if detected {
            self.detections += 1;
        }
        detected
    }

    fn pop_oldest(&mut self) {
        if let Some(old) = self.window.pop_front() {
            self.sum -= old;
            self.sum_sq -= old * old;
        }
    }

    /// Number of oldest items to drop, if the window has a change point.
    fn find_cut(&self) -> Option<usize> {
        let n = self.window.len();
        if n < 2 * self.min_sub_window {
            return None;
        }

        let n_f = n as f64;
        let mean = self.sum / n_f;
        let variance = (self.sum_sq / n_f - mean * mean).max(0.0);
        let ln_n = n_f.ln();
        if ln_n <= 0.0 {
            return None;
        }
        let delta_prime = self.delta / ln_n;
        let log_term = (2.0 / delta_prime).ln();
        if !log_term.is_finite() {
            return None;
        }

        let mut n0 = 0usize;
        let mut sum0 = 0.0;
        for &v in self.window.iter().take(n - self.min_sub_window) {
            n0 += 1;
            sum0 += v;
            if n0 < self.min_sub_window {
                continue;
            }
            let n1 = n - n0;
            let mean0 = sum0 / n0 as f64;
            let mean1 = (self.sum - sum0) / n1 as f64;
            let m = 1.0 / (1.0 / n0 as f64 + 1.0 / n1 as f64);
            let epsilon =
                (2.0 / m * variance * log_term).sqrt() + 2.0 / (3.0 * m) * log_term;
            if (mean0 - mean1).abs() > epsilon {
                return Some(n0);
            }
        }
        None
    }

    pub fn width(&self) -> usize {
        self.window.len()
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn detections(&self) -> u64 {
        self.detections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_stream_no_drift() {
        let mut adwin = Adwin::new(0.002, 1, 5, 1000);
        let detected = (0..500)
            .map(|i| adwin.update(0.1 + 0.01 * ((i % 5) as f64)))
            .any(|d| d);
        assert!(!detected);
        assert_eq!(adwin.width(), 500);
    }

    #[test]
    fn test_abrupt_shift_detected() {
        let mut adwin = Adwin::new(0.002, 1, 5, 1000);
        for _ in 0..300 {
            adwin.update(0.05);
        }
        let detected = (0..200).map(|_| adwin.update(0.95)).any(|d| d);
        assert!(detected);
        assert!(adwin.detections() >= 1);
        // the old regime was cut away
        assert!(adwin.mean() > 0.5);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut adwin = Adwin::new(0.002, 32, 5, 64);
        for _ in 0..1000 {
            adwin.update(0.3);
        }
        assert!(adwin.width() <= 64);
    }

    #[test]
    fn test_non_finite_ignored() {
        let mut adwin = Adwin::new(0.002, 1, 5, 100);
        assert!(!adwin.update(f64::NAN));
        assert!(!adwin.update(f64::INFINITY));
        assert_eq!(adwin.width(), 0);
        assert_eq!(adwin.mean(), 0.0);
    }
}
