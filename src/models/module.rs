//! Scoring module capability and the native logistic estimator.

use crate::error::ConfigError;
use crate::features::builder::FeatureVector;
use crate::features::layout::{FeatureLayout, Slot};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What kind of estimator a module is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleRole {
    /// Class-imbalance-aware classifier trained on labeled fraud
    Supervised,
    /// Label-free anomaly detector
    Unsupervised,
    /// Behavioral-sequence estimator
    Behavioral,
    /// Relational / graph estimator
    Relational,
}

impl fmt::Display for ModuleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleRole::Supervised => "supervised",
            ModuleRole::Unsupervised => "unsupervised",
            ModuleRole::Behavioral => "behavioral",
            ModuleRole::Relational => "relational",
        };
        f.write_str(s)
    }
}

/// A pre-trained estimator producing a fraud probability.
///
/// Implementations must return quickly; they run inline on the request path.
pub trait ScoringModule: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> ModuleRole;

    /// Vector length this module was trained on.
    fn expected_len(&self) -> usize;

    /// Probability in [0, 1] that the transaction is fraudulent.
    fn score(&self, features: &FeatureVector) -> Result<f64>;
}

/// Linear-logistic estimator over selected positions.
#[derive(Debug, Clone)]
pub struct LogisticScorer {
    name: String,
    role: ModuleRole,
    intercept: f64,
    coefficients: Vec<(usize, f64)>,
    expected_len: usize,
}

impl LogisticScorer {
    pub fn new(name: &str, role: ModuleRole, intercept: f64, expected_len: usize) -> Self {
        Self {
            name: name.to_string(),
            role,
            intercept,
            coefficients: Vec::new(),
            expected_len,
        }
    }

    pub fn with_coefficient(mut self, index: usize, weight: f64) -> Self {
        self.coefficients.push((index, weight));
        self
    }

    pub fn with_slot(self, layout: &FeatureLayout, slot: Slot, weight: f64) -> Self {
        self.with_coefficient(layout.index(slot), weight)
    }

    /// Build from named coefficients. Names are slot names or `feature_<i>`.
    pub fn from_named(
        name: &str,
        role: ModuleRole,
        intercept: f64,
        coefficients: &BTreeMap<String, f64>,
        layout: &FeatureLayout,
    ) -> Result<Self, ConfigError> {
        let mut scorer = Self::new(name, role, intercept, layout.length);
        for (feature, &weight) in coefficients {
            let index = resolve_feature(feature, layout).ok_or_else(|| {
                ConfigError::FeatureShape(format!(
                    "module {name}: unknown feature {feature:?}"
                ))
            })?;
            scorer = scorer.with_coefficient(index, weight);
        }
        Ok(scorer)
    }
}

fn resolve_feature(feature: &str, layout: &FeatureLayout) -> Option<usize> {
    if let Some(slot) = Slot::from_name(feature) {
        return Some(layout.index(slot));
    }
    feature
        .strip_prefix("feature_")
        .and_then(|i| i.parse::<usize>().ok())
        .filter(|&i| i < layout.length)
}

impl ScoringModule for LogisticScorer {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> ModuleRole {
        self.role
    }

    fn expected_len(&self) -> usize {
        self.expected_len
    }

    fn score(&self, features: &FeatureVector) -> Result<f64> {
        let mut z = self.intercept;
        for &(index, weight) in &self.coefficients {
            let Some(x) = features.get(index) else {
                bail!("feature index {index} out of range");
            };
            z += weight * f64::from(x);
        }
        if z.is_nan() {
            bail!("logit is NaN");
        }
        Ok(sigmoid(z))
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: &[f32]) -> FeatureVector {
        FeatureVector::from_values(values.to_vec(), "test")
    }

    #[test]
    fn test_logistic_score() {
        let scorer = LogisticScorer::new("m", ModuleRole::Behavioral, 0.0, 3).with_coefficient(1, 2.0);
        assert!((scorer.score(&vector(&[0.0, 0.0, 0.0])).unwrap() - 0.5).abs() < 1e-12);

        let high = scorer.score(&vector(&[0.0, 10.0, 0.0])).unwrap();
        assert!(high > 0.99 && high <= 1.0);
    }

    #[test]
    fn test_extreme_logits_stay_in_range() {
        let scorer = LogisticScorer::new("m", ModuleRole::Relational, 0.0, 1).with_coefficient(0, 1.0);
        assert_eq!(scorer.score(&vector(&[1e30])).unwrap(), 1.0);
        assert_eq!(scorer.score(&vector(&[-1e30])).unwrap(), 0.0);
    }

    #[test]
    fn test_out_of_range_index_errors() {
        let scorer = LogisticScorer::new("m", ModuleRole::Supervised, 0.0, 1).with_coefficient(5, 1.0);
        assert!(scorer.score(&vector(&[1.0])).is_err());
    }

    #[test]
    fn test_named_coefficients() {
        let layout = FeatureLayout::default();
        let mut coefficients = BTreeMap::new();
        coefficients.insert("velocity_proxy".to_string(), 0.5);
        coefficients.insert("feature_100".to_string(), 0.1);
        let scorer =
            LogisticScorer::from_named("m", ModuleRole::Behavioral, -1.0, &coefficients, &layout)
                .unwrap();
        assert_eq!(scorer.expected_len(), 432);

        coefficients.insert("feature_9999".to_string(), 0.1);
        assert!(
            LogisticScorer::from_named("m", ModuleRole::Behavioral, -1.0, &coefficients, &layout)
                .is_err()
        );
    }
}
