//! Tiered decision policy with human-in-the-loop routing.

use crate::error::ConfigError;
use crate::types::decision::{DecisionStatus, RiskBand};
use serde::{Deserialize, Serialize};

/// Lower bounds of each band. Scores below `low` are negligible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            low: 0.10,
            medium: 0.40,
            high: 0.65,
            critical: 0.85,
        }
    }
}

impl DecisionThresholds {
    /// Bands must be strictly increasing inside (0, 1].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0.0 < self.low
            && self.low < self.medium
            && self.medium < self.high
            && self.high < self.critical
            && self.critical <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidThresholds(format!(
                "expected 0 < low < medium < high < critical <= 1, got {} / {} / {} / {}",
                self.low, self.medium, self.high, self.critical
            )))
        }
    }

    /// Band for a score. Non-finite scores land in the critical band.
    pub fn band(&self, score: f64) -> RiskBand {
        if score.is_nan() || score >= self.critical {
            RiskBand::Critical
        } else if score >= self.high {
            RiskBand::High
        } else if score >= self.medium {
            RiskBand::Medium
        } else if score >= self.low {
            RiskBand::Low
        } else {
            RiskBand::Negligible
        }
    }
}

/// Outcome of the policy for one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub status: DecisionStatus,
    pub band: RiskBand,
    pub requires_human_review: bool,
}

impl Verdict {
    /// Short text for the payer.
    pub fn reason(&self) -> &'static str {
        match self.band {
            RiskBand::Negligible => "Transaction successful.",
            RiskBand::Low => "Transaction successful; account under monitoring.",
            RiskBand::Medium => "Transaction held for manual review.",
            RiskBand::High => "Transaction declined pending analyst review.",
            RiskBand::Critical => "High risk of fraud detected.",
            RiskBand::Adversarial => "Transaction blocked: input failed integrity checks.",
        }
    }
}

/// Maps a hybrid score and the adversarial flag to a decision.
#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    thresholds: DecisionThresholds,
}

impl DecisionPolicy {
    pub fn new(thresholds: DecisionThresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    /// Highest risk first: adversarial, then critical down to negligible.
    pub fn decide(&self, score: f64, adversarial: bool) -> Verdict {
        if adversarial {
            return Verdict {
                status: DecisionStatus::Blocked,
                band: RiskBand::Adversarial,
                requires_human_review: false,
            };
        }

        let band = self.thresholds.band(score);
        let (status, requires_human_review) = match band {
            RiskBand::Critical => (DecisionStatus::Declined, false),
            RiskBand::High => (DecisionStatus::Declined, true),
            RiskBand::Medium => (DecisionStatus::Flagged, true),
            RiskBand::Low | RiskBand::Negligible => (DecisionStatus::Approved, false),
            RiskBand::Adversarial => (DecisionStatus::Blocked, false),
        };

        Verdict {
            status,
            band,
            requires_human_review,
        }
    }
}
