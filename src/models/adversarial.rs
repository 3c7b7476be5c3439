//! Adversarial-input screening ahead of the ensemble.

use crate::features::builder::FeatureVector;
use serde::{Deserialize, Serialize};

/// Decides whether a vector looks crafted to evade or break the models.
pub trait AdversarialCheck: Send + Sync {
    fn is_adversarial(&self, features: &FeatureVector) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdversarialConfig {
    /// Largest magnitude any single feature may take
    pub max_abs_feature: f32,
}

impl Default for AdversarialConfig {
    fn default() -> Self {
        Self {
            max_abs_feature: 1.0e7,
        }
    }
}

/// Flags non-finite values and magnitudes no legitimate input produces.
#[derive(Debug, Clone)]
pub struct BoundsCheck {
    max_abs: f32,
}

impl BoundsCheck {
    pub fn new(config: &AdversarialConfig) -> Self {
        Self {
            max_abs: config.max_abs_feature,
        }
    }
}

impl AdversarialCheck for BoundsCheck {
    fn is_adversarial(&self, features: &FeatureVector) -> bool {
        features
            .as_slice()
            .iter()
            .any(|v| !v.is_finite() || v.abs() > self.max_abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check() -> BoundsCheck {
        BoundsCheck::new(&AdversarialConfig {
            max_abs_feature: 1000.0,
        })
    }

    #[test]
    fn test_normal_vector_passes() {
        let v = FeatureVector::from_values(vec![1.0, -999.0, 0.0], "4000");
        assert!(!check().is_adversarial(&v));
    }

    #[test]
    fn test_out_of_bounds_flagged() {
        let v = FeatureVector::from_values(vec![1.0, 1000.5], "4000");
        assert!(check().is_adversarial(&v));
    }

    #[test]
    fn test_non_finite_flagged() {
        let v = FeatureVector::from_values(vec![f32::NAN], "4000");
        assert!(check().is_adversarial(&v));
        let v = FeatureVector::from_values(vec![f32::INFINITY], "4000");
        assert!(check().is_adversarial(&v));
    }
}
