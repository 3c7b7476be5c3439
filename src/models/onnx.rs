//! Pre-trained ONNX estimators behind the [`ScoringModule`] capability.

use crate::features::builder::FeatureVector;
use crate::models::module::{sigmoid, ModuleRole, ScoringModule};
use anyhow::{anyhow, Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// How to read the model output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnnxOutput {
    /// Class-1 probability of a classifier
    #[default]
    Probability,
    /// Raw anomaly score (negative = more anomalous), squashed into [0, 1]
    Anomaly,
}

impl OnnxOutput {
    /// Substring identifying the output tensor this reading expects.
    fn output_hint(self) -> &'static str {
        match self {
            OnnxOutput::Probability => "prob",
            OnnxOutput::Anomaly => "score",
        }
    }
}

/// Steepness of the squash applied to anomaly scores.
const ANOMALY_GAIN: f64 = 10.0;

/// Initialize the ONNX Runtime environment. Call once before loading models.
pub fn init_runtime() -> Result<()> {
    ort::init().commit()?;
    info!("ONNX Runtime initialized");
    Ok(())
}

struct OnnxSession {
    session: Session,
    input: String,
    output: String,
}

/// Scoring module backed by an ONNX Runtime session.
pub struct OnnxScorer {
    role: ModuleRole,
    output: OnnxOutput,
    expected_len: usize,
    name: String,
    // Session::run needs exclusive access.
    model: Mutex<OnnxSession>,
}

impl OnnxScorer {
    /// Open `path` as a scoring module. The input is the model's first
    /// input; the output is the first one matching `output`, else the last
    /// non-label output.
    pub fn load<P: AsRef<Path>>(
        path: P,
        name: &str,
        role: ModuleRole,
        output: OnnxOutput,
        expected_len: usize,
        threads: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads.max(1))?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {name} from {}", path.display()))?;

        let input = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .with_context(|| format!("model {name} declares no inputs"))?;

        let hint = output.output_hint();
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains(hint))
            .or_else(|| session.outputs.iter().rev().find(|o| !o.name.contains("label")))
            .map(|o| o.name.clone())
            .with_context(|| format!("model {name} declares no usable output"))?;

        info!(
            model = %name,
            path = %path.display(),
            role = %role,
            input = %input,
            output = %output_name,
            threads,
            "ONNX scoring module loaded"
        );

        Ok(Self {
            role,
            output,
            expected_len,
            name: name.to_string(),
            model: Mutex::new(OnnxSession {
                session,
                input,
                output: output_name,
            }),
        })
    }

    fn run(&self, features: &[f32]) -> Result<f64> {
        let mut guard = self
            .model
            .lock()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        let model = &mut *guard;

        // shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor =
            Tensor::from_array((shape, features.to_vec())).context("Failed to create input tensor")?;

        let outputs = model
            .session
            .run(ort::inputs![model.input.as_str() => input_tensor])?;

        if let Some(output) = outputs.get(model.output.as_str()) {
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                return Ok(positive_class_value(&dims, data));
            }
        }

        for (name, output) in outputs.iter() {
            if name.contains("label") {
                continue;
            }
            if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                debug!(model = %self.name, output = %name, "Using fallback output");
                return Ok(positive_class_value(&dims, data));
            }
        }

        Err(anyhow!("model {} produced no tensor output", self.name))
    }
}

/// Pick the positive-class value out of a [batch, classes] or [classes] tensor.
fn positive_class_value(dims: &[i64], data: &[f32]) -> f64 {
    let classes = dims.last().copied().unwrap_or(1);
    let value = if classes >= 2 {
        data.get(1)
    } else {
        data.first()
    };
    value.map(|&v| f64::from(v)).unwrap_or(f64::NAN)
}

impl ScoringModule for OnnxScorer {
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
        let raw = self.run(features.as_slice())?;
        let score = match self.output {
            OnnxOutput::Probability => raw,
            OnnxOutput::Anomaly => sigmoid(-ANOMALY_GAIN * raw),
        };
        debug!(model = %self.name, raw, score, "ONNX inference complete");
        Ok(score)
    }
}
