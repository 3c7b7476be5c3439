//! Feature construction: baseline template plus live-value injection.
//!
//! Injection works on the named [`FeatureRecord`]; the flat positional
//! [`FeatureVector`] only exists once the record is handed to the models.

use crate::card::ValidatedCard;
use crate::error::{ConfigError, PipelineError};
use crate::features::baseline::BaselineStore;
use crate::features::layout::{FeatureLayout, Slot};
use crate::types::request::BehavioralSignals;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Rules for injecting live values into the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Amounts strictly above this trigger the velocity spike
    pub large_amount: f64,
    /// CVV values that trigger the velocity spike
    pub sentinel_cvvs: Vec<String>,
    /// Multiplier applied to the velocity proxy when triggered
    pub spike_multiplier: f32,
    /// Divisor turning the numeric CVV into the velocity proxy
    pub cvv_scale: f32,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            large_amount: 5000.0,
            sentinel_cvvs: vec!["999".to_string()],
            spike_multiplier: 100.0,
            cvv_scale: 100.0,
        }
    }
}

impl InjectionConfig {
    pub fn spike_triggered(&self, amount: f64, cvv: &str) -> bool {
        amount > self.large_amount || self.sentinel_cvvs.iter().any(|s| s == cvv)
    }

    /// Scale factors must keep every injected value finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cvv_scale.is_finite() && self.cvv_scale > 0.0) {
            return Err(ConfigError::FeatureShape(format!(
                "injection cvv_scale must be finite and positive, got {}",
                self.cvv_scale
            )));
        }
        if !(self.spike_multiplier.is_finite() && self.spike_multiplier > 0.0) {
            return Err(ConfigError::FeatureShape(format!(
                "injection spike_multiplier must be finite and positive, got {}",
                self.spike_multiplier
            )));
        }
        if !self.large_amount.is_finite() {
            return Err(ConfigError::FeatureShape(format!(
                "injection large_amount must be finite, got {}",
                self.large_amount
            )));
        }
        Ok(())
    }
}

/// Named view of a transaction's features before flattening.
#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub profile: String,
    template: Arc<[f32]>,
    pub amount: f32,
    pub bin_code: Option<f32>,
    pub issuer_code: Option<f32>,
    pub velocity_proxy: f32,
    pub typing_latency: Option<f32>,
    pub geo_shift: Option<f32>,
    pub device_risk: Option<f32>,
    pub spike_applied: bool,
}

impl FeatureRecord {
    /// Flatten into the positional vector the models consume.
    pub fn to_vector(&self, layout: &FeatureLayout) -> FeatureVector {
        let mut values = self.template.to_vec();
        let mut put = |slot: Slot, value: Option<f32>| {
            if let (Some(v), Some(dst)) = (value, values.get_mut(layout.index(slot))) {
                *dst = v;
            }
        };

        put(Slot::Amount, Some(self.amount));
        put(Slot::BinCode, self.bin_code);
        put(Slot::IssuerCode, self.issuer_code);
        put(Slot::VelocityProxy, Some(self.velocity_proxy));
        put(Slot::TypingLatency, self.typing_latency);
        put(Slot::GeoShift, self.geo_shift);
        put(Slot::DeviceRisk, self.device_risk);

        FeatureVector {
            values,
            profile: self.profile.clone(),
            spike_applied: self.spike_applied,
        }
    }
}

/// Frozen positional feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
    profile: String,
    spike_applied: bool,
}

impl FeatureVector {
    /// Wrap raw values, e.g. for models exercised outside the builder.
    pub fn from_values(values: Vec<f32>, profile: impl Into<String>) -> Self {
        Self {
            values,
            profile: profile.into(),
            spike_applied: false,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    pub fn slot(&self, layout: &FeatureLayout, slot: Slot) -> Option<f32> {
        self.get(layout.index(slot))
    }

    /// Baseline profile this vector was built from.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn spike_applied(&self) -> bool {
        self.spike_applied
    }
}

/// Builds feature vectors from validated transactions.
pub struct FeatureBuilder {
    layout: FeatureLayout,
    baselines: Arc<BaselineStore>,
    injection: InjectionConfig,
}

impl FeatureBuilder {
    /// Fails when the layout, the injection rules, or any baseline template
    /// disagree with each other.
    pub fn new(
        layout: FeatureLayout,
        baselines: Arc<BaselineStore>,
        injection: InjectionConfig,
    ) -> Result<Self, ConfigError> {
        layout.validate()?;
        injection.validate()?;
        for key in baselines.profile_keys() {
            let len = baselines.get(key).map_or(0, <[f32]>::len);
            if len != layout.length {
                return Err(ConfigError::FeatureShape(format!(
                    "baseline {key} has {len} values, layout expects {}",
                    layout.length
                )));
            }
        }
        Ok(Self {
            layout,
            baselines,
            injection,
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn baselines(&self) -> &Arc<BaselineStore> {
        &self.baselines
    }

    /// Number of features produced.
    pub fn feature_count(&self) -> usize {
        self.layout.length
    }

    /// Select the template and inject the live values.
    pub fn build(
        &self,
        card: &ValidatedCard,
        amount: f64,
        cvv: &str,
        signals: &BehavioralSignals,
    ) -> Result<FeatureRecord, PipelineError> {
        let baseline = self.baselines.select(card)?;

        // BIN-derived codes only replace the template when the card is not
        // one the profile was recorded for.
        let (bin_code, issuer_code) = if baseline.canonical {
            (None, None)
        } else {
            (
                digits_as_f32(card.prefix(4)),
                digits_as_f32(card.digits().get(4..7).unwrap_or("")),
            )
        };

        let spike_applied = self.injection.spike_triggered(amount, cvv);
        let cvv_value = cvv.parse::<u32>().unwrap_or(0) as f32 / self.injection.cvv_scale;
        let velocity_proxy = if spike_applied {
            cvv_value * self.injection.spike_multiplier
        } else {
            cvv_value
        };

        debug!(
            profile = %baseline.key,
            canonical = baseline.canonical,
            spike_applied,
            "Feature record built"
        );

        Ok(FeatureRecord {
            profile: baseline.key,
            template: baseline.template,
            amount: amount as f32,
            bin_code,
            issuer_code,
            velocity_proxy,
            typing_latency: signals.typing_latency_ms.map(|v| v as f32),
            geo_shift: signals.geo_shift_km.map(|v| v as f32),
            device_risk: signals.device_fingerprint.as_deref().map(device_code),
            spike_applied,
        })
    }

    /// Build and flatten in one step.
    pub fn build_vector(
        &self,
        card: &ValidatedCard,
        amount: f64,
        cvv: &str,
        signals: &BehavioralSignals,
    ) -> Result<FeatureVector, PipelineError> {
        let record = self.build(card, amount, cvv, signals)?;
        let vector = record.to_vector(&self.layout);
        if vector.len() != self.layout.length {
            return Err(PipelineError::FeatureShape {
                module: "feature_builder".to_string(),
                expected: self.layout.length,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

fn digits_as_f32(digits: &str) -> Option<f32> {
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u32>().ok().map(|v| v as f32)
}

/// Stable code in [0, 1) for a device fingerprint (FNV-1a).
fn device_code(fingerprint: &str) -> f32 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in fingerprint.bytes() {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % 10_000) as f32 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardValidator;

    fn builder(fallback: Option<&str>) -> FeatureBuilder {
        let layout = FeatureLayout {
            length: 20,
            ..FeatureLayout::default()
        };
        let store = BaselineStore::from_profiles(
            vec![
                ("4000".to_string(), vec![1.0; 20]),
                ("5000".to_string(), vec![2.0; 20]),
            ],
            fallback.map(str::to_string),
            &layout,
        )
        .unwrap();
        FeatureBuilder::new(layout, Arc::new(store), InjectionConfig::default()).unwrap()
    }

    fn card(number: &str) -> ValidatedCard {
        CardValidator::new().validate(number).unwrap()
    }

    #[test]
    fn test_amount_and_cvv_injection() {
        let b = builder(None);
        let v = b
            .build_vector(&card("4000123456789017"), 50.0, "123", &BehavioralSignals::default())
            .unwrap();

        assert_eq!(v.len(), 20);
        assert_eq!(v.profile(), "4000");
        assert_eq!(v.get(2), Some(50.0));
        assert!((v.get(10).unwrap() - 1.23).abs() < 1e-6);
        // canonical match keeps the template BIN codes
        assert_eq!(v.get(3), Some(1.0));
        assert_eq!(v.get(4), Some(1.0));
        assert!(!v.spike_applied());
    }

    #[test]
    fn test_spike_on_large_amount_or_sentinel() {
        let b = builder(None);
        let signals = BehavioralSignals::default();

        let v = b.build_vector(&card("5000987654321097"), 6000.0, "999", &signals).unwrap();
        assert!(v.spike_applied());
        assert!((v.get(10).unwrap() - 999.0).abs() < 1e-3);

        let v = b.build_vector(&card("5000987654321097"), 10.0, "999", &signals).unwrap();
        assert!(v.spike_applied());

        let v = b.build_vector(&card("5000987654321097"), 5000.01, "321", &signals).unwrap();
        assert!(v.spike_applied());

        let v = b.build_vector(&card("5000987654321097"), 5000.0, "321", &signals).unwrap();
        assert!(!v.spike_applied());
    }

    #[test]
    fn test_bin_codes_for_non_canonical_card() {
        let b = builder(Some("4000"));
        let v = b
            .build_vector(&card("6011111111111117"), 20.0, "123", &BehavioralSignals::default())
            .unwrap();
        assert_eq!(v.profile(), "4000");
        assert_eq!(v.get(3), Some(6011.0));
        assert_eq!(v.get(4), Some(111.0));
    }

    #[test]
    fn test_missing_baseline_without_fallback() {
        let b = builder(None);
        let err = b
            .build_vector(&card("6011111111111117"), 20.0, "123", &BehavioralSignals::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingBaseline { .. }));
    }

    #[test]
    fn test_behavioral_signals_injected() {
        let b = builder(None);
        let signals = BehavioralSignals {
            typing_latency_ms: Some(85.0),
            geo_shift_km: Some(1200.0),
            device_fingerprint: Some("fp_abc".to_string()),
        };
        let v = b.build_vector(&card("4000123456789017"), 50.0, "123", &signals).unwrap();
        assert_eq!(v.get(11), Some(85.0));
        assert_eq!(v.get(12), Some(1200.0));
        let device = v.get(13).unwrap();
        assert!((0.0..1.0).contains(&device));
        assert_eq!(device, device_code("fp_abc"));
    }

    #[test]
    fn test_layout_outside_vector_fails_at_construction() {
        let store = builder(None).baselines().clone();
        let short = FeatureLayout {
            length: 10,
            ..FeatureLayout::default()
        };
        let err = FeatureBuilder::new(short, store, InjectionConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::FeatureShape(_)));
    }

    #[test]
    fn test_template_length_must_match_layout() {
        let store = builder(None).baselines().clone();
        let wider = FeatureLayout {
            length: 24,
            ..FeatureLayout::default()
        };
        let err = FeatureBuilder::new(wider, store, InjectionConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::FeatureShape(_)));
    }

    #[test]
    fn test_injection_scales_must_be_positive() {
        let zero_cvv = InjectionConfig {
            cvv_scale: 0.0,
            ..InjectionConfig::default()
        };
        assert!(zero_cvv.validate().is_err());

        let nan_spike = InjectionConfig {
            spike_multiplier: f32::NAN,
            ..InjectionConfig::default()
        };
        assert!(nan_spike.validate().is_err());

        let inf_amount = InjectionConfig {
            large_amount: f64::INFINITY,
            ..InjectionConfig::default()
        };
        assert!(inf_amount.validate().is_err());

        let store = builder(None).baselines().clone();
        let layout = builder(None).layout().clone();
        assert!(FeatureBuilder::new(layout, store, zero_cvv).is_err());
        assert!(InjectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_build_is_pure() {
        let b = builder(Some("4000"));
        let c = card("6011111111111117");
        let s = BehavioralSignals::default();
        let first = b.build_vector(&c, 42.0, "456", &s).unwrap();
        let second = b.build_vector(&c, 42.0, "456", &s).unwrap();
        assert_eq!(first, second);
    }
}
