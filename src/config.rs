//! Configuration management for the risk engine

use crate::decision::policy::DecisionThresholds;
use crate::drift::DriftConfig;
use crate::error::ConfigError;
use crate::features::builder::InjectionConfig;
use crate::features::layout::FeatureLayout;
use crate::models::adversarial::AdversarialConfig;
use crate::models::aggregator::EnsembleAggregator;
use crate::models::module::ModuleRole;
use crate::models::onnx::OnnxOutput;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub features: FeaturesConfig,
    pub decision: DecisionThresholds,
    pub drift: DriftConfig,
    pub adversarial: AdversarialConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming payment requests (request/reply)
    pub request_subject: String,
    /// Subject every decision is published on for audit consumers
    pub decision_subject: String,
}

/// Implementation backing a scoring module
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Onnx,
    Logistic,
}

/// One scoring module of the ensemble
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub role: ModuleRole,
    pub kind: ModuleKind,
    /// ONNX file, relative to `models_dir`
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub output: OnnxOutput,
    /// Logistic intercept
    #[serde(default)]
    pub intercept: f64,
    /// Logistic coefficients keyed by feature name
    #[serde(default)]
    pub coefficients: BTreeMap<String, f64>,
}

/// ML models configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directory containing ONNX model files
    pub models_dir: String,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Post-hoc variance term added to the hybrid score (0 disables)
    #[serde(default)]
    pub variance_scale: f64,
    pub modules: Vec<ModuleConfig>,
    /// Ensemble weights, must sum to 1
    pub weights: HashMap<String, f64>,
}

fn default_onnx_threads() -> usize {
    1
}

/// Feature construction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    /// JSON file with the baseline profiles
    pub baseline_file: String,
    #[serde(default)]
    pub layout: FeatureLayout,
    #[serde(default)]
    pub injection: InjectionConfig,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum requests processed concurrently
    pub workers: usize,
    /// Per-module latency above which a warning is logged
    pub module_latency_budget_ms: u64,
    /// Seconds between metrics summaries
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, with `RISK__*` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("RISK").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Startup checks. A failing configuration must not serve traffic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.features.layout.validate()?;
        self.features.injection.validate()?;
        self.decision.validate()?;
        self.drift.validate()?;

        let mut names = HashSet::new();
        for module in &self.models.modules {
            if !names.insert(module.name.as_str()) {
                return Err(ConfigError::InvalidWeights(format!(
                    "module {} is configured twice",
                    module.name
                )));
            }
            if module.kind == ModuleKind::Onnx && module.file.is_none() {
                return Err(ConfigError::FeatureShape(format!(
                    "onnx module {} has no file",
                    module.name
                )));
            }
        }

        let weighted: HashSet<&str> = self.models.weights.keys().map(String::as_str).collect();
        if weighted != names {
            return Err(ConfigError::InvalidWeights(format!(
                "weights cover {:?} but modules are {:?}",
                sorted(&weighted),
                sorted(&names)
            )));
        }

        EnsembleAggregator::new(self.models.weights.clone())?
            .with_variance_scale(self.models.variance_scale)?;
        Ok(())
    }
}

fn sorted<'a>(set: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut v: Vec<&str> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

impl Default for AppConfig {
    fn default() -> Self {
        let modules = vec![
            ModuleConfig {
                name: "xgboost".to_string(),
                role: ModuleRole::Supervised,
                kind: ModuleKind::Onnx,
                file: Some("xgboost.onnx".to_string()),
                output: OnnxOutput::Probability,
                intercept: 0.0,
                coefficients: BTreeMap::new(),
            },
            ModuleConfig {
                name: "isolation_forest".to_string(),
                role: ModuleRole::Unsupervised,
                kind: ModuleKind::Onnx,
                file: Some("isolation_forest.onnx".to_string()),
                output: OnnxOutput::Anomaly,
                intercept: 0.0,
                coefficients: BTreeMap::new(),
            },
            ModuleConfig {
                name: "behavioral_sequence".to_string(),
                role: ModuleRole::Behavioral,
                kind: ModuleKind::Logistic,
                file: None,
                output: OnnxOutput::Probability,
                intercept: -4.0,
                coefficients: BTreeMap::from([
                    ("velocity_proxy".to_string(), 0.01),
                    ("geolocation_shift".to_string(), 0.002),
                ]),
            },
            ModuleConfig {
                name: "relational_graph".to_string(),
                role: ModuleRole::Relational,
                kind: ModuleKind::Logistic,
                file: None,
                output: OnnxOutput::Probability,
                intercept: -3.0,
                coefficients: BTreeMap::from([
                    ("transaction_amount".to_string(), 0.001),
                    ("device_risk".to_string(), 0.5),
                ]),
            },
        ];

        let mut weights = HashMap::new();
        weights.insert("xgboost".to_string(), 0.40);
        weights.insert("isolation_forest".to_string(), 0.30);
        weights.insert("behavioral_sequence".to_string(), 0.15);
        weights.insert("relational_graph".to_string(), 0.15);

        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "payments.requests".to_string(),
                decision_subject: "payments.decisions".to_string(),
            },
            models: ModelsConfig {
                models_dir: "models".to_string(),
                onnx_threads: 1,
                variance_scale: 0.0,
                modules,
                weights,
            },
            features: FeaturesConfig {
                baseline_file: "config/baselines.json".to_string(),
                layout: FeatureLayout::default(),
                injection: InjectionConfig::default(),
            },
            decision: DecisionThresholds::default(),
            drift: DriftConfig::default(),
            adversarial: AdversarialConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                module_latency_budget_ms: 50,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.models.modules.len(), 4);
        assert_eq!(config.models.weights.len(), 4);
        assert_eq!(config.features.layout.length, 432);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weights_not_summing_to_one_fail_startup() {
        let mut config = AppConfig::default();
        config.models.weights.insert("xgboost".to_string(), 0.5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn test_weight_for_unknown_module_fails() {
        let mut config = AppConfig::default();
        config.models.weights.remove("relational_graph");
        config.models.weights.insert("graph".to_string(), 0.15);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn test_onnx_module_without_file_fails() {
        let mut config = AppConfig::default();
        config.models.modules[0].file = None;
        assert!(matches!(config.validate(), Err(ConfigError::FeatureShape(_))));
    }

    #[test]
    fn test_injection_scale_checked_at_startup() {
        let mut config = AppConfig::default();
        config.features.injection.cvv_scale = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::FeatureShape(_))));

        let mut config = AppConfig::default();
        config.features.injection.spike_multiplier = f32::INFINITY;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://from-file:4222"
request_subject = "req"
decision_subject = "dec"
"#
        )
        .unwrap();

        std::env::set_var("RISK__NATS__URL", "nats://from-env:4222");
        let loaded = AppConfig::load_from_path(file.path());
        std::env::remove_var("RISK__NATS__URL");

        let config = loaded.unwrap();
        assert_eq!(config.nats.url, "nats://from-env:4222");
        assert_eq!(config.nats.request_subject, "req");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[nats]
url = "nats://example:4222"
request_subject = "req"
decision_subject = "dec"

[models]
models_dir = "m"
modules = [
  {{ name = "sup", role = "supervised", kind = "logistic", intercept = -2.0, coefficients = {{ velocity_proxy = 0.5 }} }},
  {{ name = "anom", role = "unsupervised", kind = "onnx", file = "iso.onnx", output = "anomaly" }},
]

[models.weights]
sup = 0.6
anom = 0.4

[features]
baseline_file = "b.json"

[decision]
low = 0.2
medium = 0.4
high = 0.6
critical = 0.8
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.request_subject, "req");
        assert_eq!(config.models.modules.len(), 2);
        assert_eq!(config.models.modules[1].output, OnnxOutput::Anomaly);
        assert_eq!(config.models.modules[0].coefficients["velocity_proxy"], 0.5);
        assert_eq!(config.decision.low, 0.2);
        // untouched sections keep their defaults
        assert_eq!(config.pipeline.workers, 4);
        assert!(config.validate().is_ok());
    }
}
