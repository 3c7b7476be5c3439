//! Scoring modules and ensemble inference

pub mod adversarial;
pub mod aggregator;
pub mod inference;
pub mod module;
pub mod onnx;

pub use adversarial::{AdversarialCheck, AdversarialConfig, BoundsCheck};
pub use aggregator::{EnsembleAggregator, HybridScore};
pub use inference::{InferenceEngine, PredictionResult};
pub use module::{LogisticScorer, ModuleRole, ScoringModule};
pub use onnx::{OnnxOutput, OnnxScorer};
