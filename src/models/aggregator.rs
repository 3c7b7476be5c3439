//! Weighted ensemble aggregation.

use crate::error::ConfigError;
use std::collections::BTreeMap;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Combined risk score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridScore {
    /// Plain weighted sum of module scores
    pub weighted: f64,
    /// Deterministic variance term added after the sum
    pub perturbation: f64,
    /// Final score, always inside [0, 1]
    pub score: f64,
}

/// Combines module probabilities with fixed weights that sum to one.
#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    weights: BTreeMap<String, f64>,
    variance_scale: f64,
}

impl EnsembleAggregator {
    /// Validate and store the weights.
    pub fn new<I, S>(weights: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights: BTreeMap<String, f64> =
            weights.into_iter().map(|(k, v)| (k.into(), v)).collect();

        if weights.is_empty() {
            return Err(ConfigError::InvalidWeights("no weights configured".to_string()));
        }
        for (name, &w) in &weights {
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidWeights(format!(
                    "weight for {name} must be a finite non-negative number, got {w}"
                )));
            }
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights sum to {total}, expected 1.0"
            )));
        }

        Ok(Self {
            weights,
            variance_scale: 0.0,
        })
    }

    /// Enable the post-hoc variance term. Zero disables it.
    pub fn with_variance_scale(mut self, scale: f64) -> Result<Self, ConfigError> {
        if !scale.is_finite() || !(0.0..=0.5).contains(&scale) {
            return Err(ConfigError::InvalidWeights(format!(
                "variance scale must be within [0, 0.5], got {scale}"
            )));
        }
        self.variance_scale = scale;
        Ok(self)
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn weight(&self, module: &str) -> Option<f64> {
        self.weights.get(module).copied()
    }

    /// Weighted sum over the configured modules. A module with no score
    /// contributes nothing.
    pub fn weighted_sum(&self, module_scores: &BTreeMap<String, f64>) -> f64 {
        self.weights
            .iter()
            .filter_map(|(name, w)| module_scores.get(name).map(|s| w * s))
            .sum()
    }

    /// Weighted sum, plus the variance term keyed by `seed`, clamped to [0, 1].
    pub fn aggregate(&self, module_scores: &BTreeMap<String, f64>, seed: u64) -> HybridScore {
        let weighted = self.weighted_sum(module_scores);
        let perturbation = self.perturbation(seed);
        let mut score = weighted + perturbation;
        if score.is_nan() {
            score = 1.0;
        }
        HybridScore {
            weighted,
            perturbation,
            score: score.clamp(0.0, 1.0),
        }
    }

    fn perturbation(&self, seed: u64) -> f64 {
        if self.variance_scale == 0.0 {
            return 0.0;
        }
        // top 53 bits -> uniform [0, 1)
        let unit = (splitmix64(seed) >> 11) as f64 / (1u64 << 53) as f64;
        (2.0 * unit - 1.0) * self.variance_scale
    }
}

/// Seed for the variance term: card digits and the amount in cents.
pub fn perturbation_seed(card_digits: &str, amount: f64) -> u64 {
    let cents = (amount * 100.0).round() as u64;
    card_digits
        .bytes()
        .fold(cents, |acc, b| splitmix64(acc ^ u64::from(b)))
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}
