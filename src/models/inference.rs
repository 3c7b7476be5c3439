//! Multi-module inference engine

use crate::config::{AppConfig, ModuleKind};
use crate::error::{ConfigError, PipelineError};
use crate::features::builder::FeatureVector;
use crate::models::aggregator::{EnsembleAggregator, HybridScore};
use crate::models::module::{LogisticScorer, ScoringModule};
use crate::models::onnx::{self, OnnxScorer};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of running every module on one vector
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub hybrid: HybridScore,
    /// Individual module scores
    pub module_scores: BTreeMap<String, f64>,
    /// Time spent in each module
    pub module_latency: Vec<(String, Duration)>,
}

/// Runs the scoring modules and combines their outputs
pub struct InferenceEngine {
    modules: Vec<Arc<dyn ScoringModule>>,
    aggregator: EnsembleAggregator,
    latency_budget: Duration,
}

impl InferenceEngine {
    /// Create the engine from configuration, loading ONNX models from disk
    pub fn new(config: &AppConfig) -> Result<Self> {
        let layout = &config.features.layout;
        let mut modules: Vec<Arc<dyn ScoringModule>> = Vec::with_capacity(config.models.modules.len());
        let mut runtime_ready = false;

        for module in &config.models.modules {
            let scorer: Arc<dyn ScoringModule> = match module.kind {
                ModuleKind::Onnx => {
                    let file = module
                        .file
                        .as_deref()
                        .with_context(|| format!("onnx module {} has no file", module.name))?;
                    if !runtime_ready {
                        onnx::init_runtime()?;
                        runtime_ready = true;
                    }
                    let path = Path::new(&config.models.models_dir).join(file);
                    Arc::new(OnnxScorer::load(
                        &path,
                        &module.name,
                        module.role,
                        module.output,
                        layout.length,
                        config.models.onnx_threads,
                    )?)
                }
                ModuleKind::Logistic => Arc::new(LogisticScorer::from_named(
                    &module.name,
                    module.role,
                    module.intercept,
                    &module.coefficients,
                    layout,
                )?),
            };
            info!(module = %module.name, role = %module.role, kind = ?module.kind, "Scoring module ready");
            modules.push(scorer);
        }

        let aggregator = EnsembleAggregator::new(config.models.weights.clone())?
            .with_variance_scale(config.models.variance_scale)?;

        let engine = Self::with_modules(
            modules,
            aggregator,
            layout.length,
            Duration::from_millis(config.pipeline.module_latency_budget_ms),
        )?;

        info!(
            modules = ?engine.module_names(),
            weights = ?engine.aggregator.weights(),
            "Inference engine initialized"
        );
        Ok(engine)
    }

    /// Assemble an engine from ready modules.
    ///
    /// Fails when a module expects a different vector length, or when the
    /// weights do not name exactly the given modules.
    pub fn with_modules(
        modules: Vec<Arc<dyn ScoringModule>>,
        aggregator: EnsembleAggregator,
        feature_len: usize,
        latency_budget: Duration,
    ) -> Result<Self, ConfigError> {
        let mut names: Vec<&str> = Vec::with_capacity(modules.len());
        for module in &modules {
            if module.expected_len() != feature_len {
                return Err(ConfigError::FeatureShape(format!(
                    "module {} expects {} features, builder produces {}",
                    module.name(),
                    module.expected_len(),
                    feature_len
                )));
            }
            if names.contains(&module.name()) {
                return Err(ConfigError::InvalidWeights(format!(
                    "duplicate module {}",
                    module.name()
                )));
            }
            names.push(module.name());
        }

        let mut weighted: Vec<&str> = aggregator.weights().keys().map(String::as_str).collect();
        names.sort_unstable();
        weighted.sort_unstable();
        if names != weighted {
            return Err(ConfigError::InvalidWeights(format!(
                "weights cover {weighted:?} but modules are {names:?}"
            )));
        }

        Ok(Self {
            modules,
            aggregator,
            latency_budget,
        })
    }

    /// Get the number of loaded modules
    pub fn model_count(&self) -> usize {
        self.modules.len()
    }

    /// Get loaded module names
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    pub fn aggregator(&self) -> &EnsembleAggregator {
        &self.aggregator
    }

    /// Score the vector with every module and combine.
    pub fn predict(&self, features: &FeatureVector, seed: u64) -> Result<PredictionResult, PipelineError> {
        let mut module_scores = BTreeMap::new();
        let mut module_latency = Vec::with_capacity(self.modules.len());

        for module in &self.modules {
            let name = module.name();
            if features.len() != module.expected_len() {
                return Err(PipelineError::FeatureShape {
                    module: name.to_string(),
                    expected: module.expected_len(),
                    actual: features.len(),
                });
            }

            let started = Instant::now();
            let result = module.score(features);
            let elapsed = started.elapsed();

            if elapsed > self.latency_budget {
                warn!(
                    module = %name,
                    elapsed_us = elapsed.as_micros() as u64,
                    budget_us = self.latency_budget.as_micros() as u64,
                    "Scoring module exceeded latency budget"
                );
            }

            let score = result.map_err(|e| PipelineError::Scoring {
                module: name.to_string(),
                reason: e.to_string(),
            })?;
            if score.is_nan() {
                return Err(PipelineError::Scoring {
                    module: name.to_string(),
                    reason: "score is NaN".to_string(),
                });
            }

            module_scores.insert(name.to_string(), score.clamp(0.0, 1.0));
            module_latency.push((name.to_string(), elapsed));
        }

        let hybrid = self.aggregator.aggregate(&module_scores, seed);

        debug!(
            hybrid = hybrid.score,
            weighted = hybrid.weighted,
            module_scores = ?module_scores,
            "Ensemble inference complete"
        );

        Ok(PredictionResult {
            hybrid,
            module_scores,
            module_latency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::module::ModuleRole;

    struct Fixed {
        name: &'static str,
        score: f64,
    }

    impl ScoringModule for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn role(&self) -> ModuleRole {
            ModuleRole::Behavioral
        }
        fn expected_len(&self) -> usize {
            4
        }
        fn score(&self, _features: &FeatureVector) -> anyhow::Result<f64> {
            if self.score < 0.0 {
                anyhow::bail!("model unavailable");
            }
            Ok(self.score)
        }
    }

    fn fixed(name: &'static str, score: f64) -> Arc<dyn ScoringModule> {
        Arc::new(Fixed { name, score })
    }

    fn engine(scores: [f64; 4]) -> InferenceEngine {
        let modules = vec![
            fixed("supervised", scores[0]),
            fixed("unsupervised", scores[1]),
            fixed("behavioral", scores[2]),
            fixed("relational", scores[3]),
        ];
        let aggregator = EnsembleAggregator::new([
            ("supervised", 0.4),
            ("unsupervised", 0.3),
            ("behavioral", 0.15),
            ("relational", 0.15),
        ])
        .unwrap();
        InferenceEngine::with_modules(modules, aggregator, 4, Duration::from_secs(1)).unwrap()
    }

    fn vector() -> FeatureVector {
        FeatureVector::from_values(vec![0.0; 4], "4000")
    }

    #[test]
    fn test_ensemble_prediction() {
        let result = engine([0.85, 0.90, 0.15, 0.10]).predict(&vector(), 0).unwrap();
        assert!((result.hybrid.weighted - 0.6025).abs() < 1e-9);
        assert_eq!(result.module_scores.len(), 4);
        assert_eq!(result.module_latency.len(), 4);
    }

    #[test]
    fn test_module_failure_is_surfaced() {
        let err = engine([0.1, -1.0, 0.1, 0.1]).predict(&vector(), 0).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring { ref module, .. } if module == "unsupervised"));
    }

    #[test]
    fn test_nan_score_is_rejected() {
        let err = engine([0.1, f64::NAN, 0.1, 0.1]).predict(&vector(), 0).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring { .. }));
    }

    #[test]
    fn test_vector_length_mismatch() {
        let short = FeatureVector::from_values(vec![0.0; 3], "4000");
        let err = engine([0.1; 4]).predict(&short, 0).unwrap_err();
        assert!(matches!(err, PipelineError::FeatureShape { expected: 4, actual: 3, .. }));
    }

    #[test]
    fn test_startup_shape_check() {
        let aggregator = EnsembleAggregator::new([("supervised", 1.0)]).unwrap();
        let err = InferenceEngine::with_modules(
            vec![fixed("supervised", 0.1)],
            aggregator,
            432,
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::FeatureShape(_)));
    }

    #[test]
    fn test_startup_weight_coverage_check() {
        let aggregator = EnsembleAggregator::new([("supervised", 0.5), ("other", 0.5)]).unwrap();
        let err = InferenceEngine::with_modules(
            vec![fixed("supervised", 0.1), fixed("unsupervised", 0.1)],
            aggregator,
            4,
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::InvalidWeights(_)));
    }
}
