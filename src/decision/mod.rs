//! Decision policy and explainability

pub mod explain;
pub mod policy;

pub use explain::{Attribution, Attributor, DeviationAttributor, ExplanationAnnotator, UNKNOWN_FEATURE};
pub use policy::{DecisionPolicy, DecisionThresholds, Verdict};
