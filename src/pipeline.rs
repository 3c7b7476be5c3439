//! End-to-end decision pipeline for one transaction.
//!
//! validate -> build features -> adversarial screen -> ensemble -> drift
//! -> policy -> explanation. Everything except the drift monitor is read-only
//! after construction, so one pipeline is shared by all workers.

use crate::card::CardValidator;
use crate::config::AppConfig;
use crate::decision::explain::{DeviationAttributor, ExplanationAnnotator};
use crate::decision::policy::DecisionPolicy;
use crate::drift::DriftMonitor;
use crate::error::PipelineError;
use crate::features::baseline::BaselineStore;
use crate::features::builder::FeatureBuilder;
use crate::metrics::PipelineMetrics;
use crate::models::adversarial::{AdversarialCheck, BoundsCheck};
use crate::models::aggregator::perturbation_seed;
use crate::models::inference::InferenceEngine;
use crate::types::decision::{DecisionResult, GatewayResponse, RiskBand};
use crate::types::request::TransactionRequest;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

pub struct DecisionPipeline {
    validator: CardValidator,
    builder: FeatureBuilder,
    engine: InferenceEngine,
    adversarial: Box<dyn AdversarialCheck>,
    drift: DriftMonitor,
    policy: DecisionPolicy,
    annotator: ExplanationAnnotator,
    metrics: Arc<PipelineMetrics>,
}

impl DecisionPipeline {
    /// Build every component from configuration. Fails on any invalid setting.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let layout = config.features.layout.clone();
        let baselines = Arc::new(
            BaselineStore::load(Path::new(&config.features.baseline_file), &layout)
                .context("Failed to load baseline profiles")?,
        );
        let builder = FeatureBuilder::new(layout, baselines, config.features.injection.clone())?;
        let engine = InferenceEngine::new(config)?;
        let policy = DecisionPolicy::new(config.decision.clone())?;

        let pipeline = Self::new(
            builder,
            engine,
            policy,
            DriftMonitor::new(&config.drift),
            Box::new(BoundsCheck::new(&config.adversarial)),
        );

        info!(
            features = pipeline.builder.feature_count(),
            modules = pipeline.engine.model_count(),
            thresholds = ?pipeline.policy.thresholds(),
            "Decision pipeline ready"
        );
        Ok(pipeline)
    }

    /// Assemble a pipeline from ready components. The explanation annotator
    /// ranks deviations against the builder's baseline profiles.
    pub fn new(
        builder: FeatureBuilder,
        engine: InferenceEngine,
        policy: DecisionPolicy,
        drift: DriftMonitor,
        adversarial: Box<dyn AdversarialCheck>,
    ) -> Self {
        let attributor =
            DeviationAttributor::new(builder.baselines().clone(), builder.layout().clone());
        Self {
            validator: CardValidator::new(),
            builder,
            engine,
            adversarial,
            drift,
            policy,
            annotator: ExplanationAnnotator::new(Box::new(attributor)),
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Record into a shared collector instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn drift_monitor(&self) -> &DriftMonitor {
        &self.drift
    }

    /// Decide one transaction.
    pub fn process(&self, request: &TransactionRequest) -> Result<DecisionResult, PipelineError> {
        let started = Instant::now();
        let tx_id = request.transaction_id.as_str();

        let card = self
            .validator
            .validate(&request.card_number)
            .map_err(|e| PipelineError::Rejected(e.into()))?;
        request.validate_fields()?;

        let features = self
            .builder
            .build_vector(&card, request.amount, &request.cvv, &request.signals)?;

        if self.adversarial.is_adversarial(&features) {
            let verdict = self.policy.decide(1.0, true);
            let explanation = self.annotator.explain(&features, &BTreeMap::new());
            info!(
                transaction_id = %tx_id,
                card = %card.masked(),
                "Adversarial input blocked before scoring"
            );
            return Ok(DecisionResult {
                transaction_id: tx_id.to_string(),
                status: verdict.status,
                reason: verdict.reason().to_string(),
                risk_band: RiskBand::Adversarial,
                risk_score: 1.0,
                requires_human_review: verdict.requires_human_review,
                drift_detected: false,
                explanation,
                module_scores: BTreeMap::new(),
                processing_time_us: started.elapsed().as_micros() as u64,
            });
        }

        let prediction = self
            .engine
            .predict(&features, perturbation_seed(card.digits(), request.amount))?;
        for (module, elapsed) in &prediction.module_latency {
            self.metrics.record_module_time(module, *elapsed);
        }
        self.metrics.record_module_agreement(&prediction.module_scores);

        let risk_score = prediction.hybrid.score;
        let drift = self.drift.update(risk_score);
        if drift.drift_detected {
            self.metrics.record_drift();
        }

        let verdict = self.policy.decide(risk_score, false);
        let explanation = self.annotator.explain(&features, &prediction.module_scores);

        debug!(
            transaction_id = %tx_id,
            profile = %features.profile(),
            top_feature = %explanation.top_feature,
            drift_warning = drift.warning,
            "Explanation attached"
        );

        Ok(DecisionResult {
            transaction_id: tx_id.to_string(),
            status: verdict.status,
            reason: verdict.reason().to_string(),
            risk_band: verdict.band,
            risk_score,
            requires_human_review: verdict.requires_human_review,
            drift_detected: drift.drift_detected,
            explanation,
            module_scores: prediction.module_scores,
            processing_time_us: started.elapsed().as_micros() as u64,
        })
    }

    /// Decide one transaction and turn the outcome into the wire response,
    /// recording metrics and logs on the way.
    pub fn respond(&self, request: &TransactionRequest) -> GatewayResponse {
        let tx_id = request.transaction_id.as_str();
        let outcome = self.process(request);

        match &outcome {
            Ok(decision) => {
                self.metrics.record_decision(
                    decision.status,
                    std::time::Duration::from_micros(decision.processing_time_us),
                    decision.risk_score,
                );
                info!(
                    transaction_id = %tx_id,
                    status = %decision.status,
                    risk_score = decision.risk_score,
                    risk_band = decision.risk_band.as_str(),
                    hitl = decision.requires_human_review,
                    drift_detected = decision.drift_detected,
                    processing_time_us = decision.processing_time_us,
                    "Transaction decided"
                );
            }
            Err(PipelineError::Rejected(e)) => {
                self.metrics.record_rejection(e.kind());
                info!(transaction_id = %tx_id, kind = e.kind(), reason = %e, "Transaction rejected");
            }
            Err(e) => {
                self.metrics.record_internal_error();
                error!(transaction_id = %tx_id, error = %e, "Transaction failed");
            }
        }

        GatewayResponse::from_outcome(tx_id, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::policy::DecisionThresholds;
    use crate::error::{CardError, RequestError};
    use crate::features::builder::InjectionConfig;
    use crate::features::layout::{FeatureLayout, Slot};
    use crate::models::adversarial::AdversarialConfig;
    use crate::models::aggregator::EnsembleAggregator;
    use crate::models::module::{LogisticScorer, ModuleRole, ScoringModule};
    use crate::types::decision::DecisionStatus;
    use std::time::Duration;

    fn layout() -> FeatureLayout {
        FeatureLayout {
            length: 20,
            ..FeatureLayout::default()
        }
    }

    fn pipeline() -> DecisionPipeline {
        let layout = layout();
        let mut template = vec![0.0; 20];
        template[layout.index(Slot::Amount)] = 50.0;
        template[layout.index(Slot::VelocityProxy)] = 1.0;
        let store = BaselineStore::from_profiles(
            vec![("4000".to_string(), template)],
            Some("4000".to_string()),
            &layout,
        )
        .unwrap();
        let builder = FeatureBuilder::new(layout.clone(), Arc::new(store), InjectionConfig::default()).unwrap();

        let module: Arc<dyn ScoringModule> = Arc::new(
            LogisticScorer::new("supervised", ModuleRole::Supervised, -6.0, 20)
                .with_slot(&layout, Slot::VelocityProxy, 0.02)
                .with_slot(&layout, Slot::Amount, 0.0005),
        );
        let engine = InferenceEngine::with_modules(
            vec![module],
            EnsembleAggregator::new([("supervised", 1.0)]).unwrap(),
            20,
            Duration::from_secs(1),
        )
        .unwrap();

        DecisionPipeline::new(
            builder,
            engine,
            DecisionPolicy::new(DecisionThresholds::default()).unwrap(),
            DriftMonitor::default(),
            Box::new(BoundsCheck::new(&AdversarialConfig::default())),
        )
    }

    #[test]
    fn test_low_risk_is_approved() {
        let p = pipeline();
        let decision = p.process(&TransactionRequest::new("4000123456789017", 50.0, "123")).unwrap();
        assert_eq!(decision.status, DecisionStatus::Approved);
        assert!(!decision.requires_human_review);
        assert!(decision.module_scores.contains_key("supervised"));
    }

    #[test]
    fn test_checksum_failure_is_rejected() {
        let p = pipeline();
        let err = p
            .process(&TransactionRequest::new("1234567890123", 50.0, "123"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Rejected(RequestError::Card(CardError::InvalidChecksum))
        ));
        assert_eq!(p.drift_monitor().snapshot().updates, 0);
    }

    #[test]
    fn test_adversarial_short_circuits() {
        let p = pipeline();
        let decision = p.process(&TransactionRequest::new("4000123456789017", 1.0e12, "123")).unwrap();
        assert_eq!(decision.status, DecisionStatus::Blocked);
        assert_eq!(decision.risk_score, 1.0);
        assert!(decision.module_scores.is_empty());
        assert!(!decision.drift_detected);
        assert_eq!(p.drift_monitor().snapshot().updates, 0);
    }

    #[test]
    fn test_respond_records_metrics() {
        let p = pipeline();
        let ok = p.respond(&TransactionRequest::new("4000123456789017", 50.0, "123"));
        assert_eq!(ok.status(), "APPROVED");
        let rejected = p.respond(&TransactionRequest::new("1234567890123", 50.0, "123"));
        assert_eq!(rejected.status(), "REJECTED");

        let m = p.metrics();
        assert_eq!(m.decisions.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(m.get_rejections_by_kind()["invalid_checksum"], 1);
        assert_eq!(m.get_module_stats()["supervised"].calls, 1);
    }
}
