//! Error taxonomy for the decision pipeline.

use thiserror::Error;

/// Card identifier validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    /// Characters other than digits, spaces or hyphens
    #[error("card number contains non-digit characters")]
    InvalidFormat,
    #[error("card number must have 13 to 19 digits, got {digits}")]
    InvalidLength { digits: usize },
    #[error("card number failed the Luhn checksum")]
    InvalidChecksum,
}

impl CardError {
    pub fn kind(&self) -> &'static str {
        match self {
            CardError::InvalidFormat => "invalid_format",
            CardError::InvalidLength { .. } => "invalid_length",
            CardError::InvalidChecksum => "invalid_checksum",
        }
    }
}

/// Request-level rejections. These terminate processing before any
/// feature construction and are returned to the payer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Card(#[from] CardError),
    #[error("amount must be a finite non-negative number, got {0}")]
    InvalidAmount(f64),
    #[error("cvv must be 3 or 4 digits")]
    InvalidCvv,
    #[error("expiry must be formatted MM/YY")]
    InvalidExpiry,
}

impl RequestError {
    pub fn kind(&self) -> &'static str {
        match self {
            RequestError::Card(e) => e.kind(),
            RequestError::InvalidAmount(_) => "invalid_amount",
            RequestError::InvalidCvv => "invalid_cvv",
            RequestError::InvalidExpiry => "invalid_expiry",
        }
    }
}

/// Startup configuration errors. Any of these keeps the service from serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ensemble weights are invalid: {0}")]
    InvalidWeights(String),
    #[error("decision thresholds are invalid: {0}")]
    InvalidThresholds(String),
    #[error("feature shape mismatch: {0}")]
    FeatureShape(String),
    #[error("no baseline profile available: {0}")]
    MissingBaseline(String),
    #[error("failed to load baselines from {path}: {reason}")]
    BaselineLoad { path: String, reason: String },
}

/// Failures while processing a single transaction.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("request rejected: {0}")]
    Rejected(#[from] RequestError),
    #[error("no baseline profile matches card prefix {prefix}")]
    MissingBaseline { prefix: String },
    #[error("feature vector has {actual} values, {module} expects {expected}")]
    FeatureShape {
        module: String,
        expected: usize,
        actual: usize,
    },
    #[error("scoring module {module} failed: {reason}")]
    Scoring { module: String, reason: String },
}

impl PipelineError {
    /// Internal errors surface as a server-side failure, never as a decision.
    pub fn is_internal(&self) -> bool {
        !matches!(self, PipelineError::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err: RequestError = CardError::InvalidLength { digits: 12 }.into();
        assert_eq!(err.kind(), "invalid_length");
        assert_eq!(RequestError::from(CardError::InvalidChecksum).kind(), "invalid_checksum");
        assert_eq!(RequestError::InvalidCvv.kind(), "invalid_cvv");
    }

    #[test]
    fn test_internal_classification() {
        assert!(!PipelineError::Rejected(RequestError::InvalidCvv).is_internal());
        assert!(PipelineError::MissingBaseline {
            prefix: "9999".to_string()
        }
        .is_internal());
    }
}
