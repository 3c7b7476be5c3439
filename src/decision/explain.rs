//! Explanation of a decision by its most suspicious feature.

use crate::features::baseline::BaselineStore;
use crate::features::builder::FeatureVector;
use crate::features::layout::FeatureLayout;
use crate::types::decision::Explanation;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Sentinel used when no attribution can be computed.
pub const UNKNOWN_FEATURE: &str = "unknown";

/// A named feature and how far it strays from normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub feature: String,
    pub deviation: f64,
}

/// Capability that names the feature contributing most to a score.
pub trait Attributor: Send + Sync {
    fn attribute(&self, features: &FeatureVector) -> Option<Attribution>;
}

/// Ranks positions by relative deviation from the baseline template the
/// vector was built from: |v - b| / (|b| + 1).
pub struct DeviationAttributor {
    baselines: Arc<BaselineStore>,
    layout: FeatureLayout,
}

impl DeviationAttributor {
    pub fn new(baselines: Arc<BaselineStore>, layout: FeatureLayout) -> Self {
        Self { baselines, layout }
    }
}

impl Attributor for DeviationAttributor {
    fn attribute(&self, features: &FeatureVector) -> Option<Attribution> {
        let baseline = self.baselines.get(features.profile())?;
        if baseline.len() != features.len() {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, (&v, &b)) in features.as_slice().iter().zip(baseline).enumerate() {
            let deviation = f64::from((v - b).abs()) / (f64::from(b.abs()) + 1.0);
            if !deviation.is_finite() || deviation <= 0.0 {
                continue;
            }
            // strict comparison keeps the lowest index on ties
            if best.map_or(true, |(_, d)| deviation > d) {
                best = Some((i, deviation));
            }
        }

        best.map(|(i, deviation)| Attribution {
            feature: self.layout.feature_name(i),
            deviation,
        })
    }
}

/// Attaches a rationale to each decision. Never fails.
pub struct ExplanationAnnotator {
    attributor: Box<dyn Attributor>,
}

impl ExplanationAnnotator {
    pub fn new(attributor: Box<dyn Attributor>) -> Self {
        Self { attributor }
    }

    pub fn explain(
        &self,
        features: &FeatureVector,
        module_scores: &BTreeMap<String, f64>,
    ) -> Explanation {
        let strongest = module_scores
            .iter()
            .fold(None::<(&String, f64)>, |best, (name, &score)| match best {
                Some((_, s)) if s >= score => best,
                _ => Some((name, score)),
            });
        let module_note = strongest
            .map(|(name, score)| format!("; strongest module signal: {name} at {score:.2}"))
            .unwrap_or_default();

        match self.attributor.attribute(features) {
            Some(attr) => {
                let spike_note = if features.spike_applied() {
                    " after an anomaly spike"
                } else {
                    ""
                };
                Explanation {
                    rationale: format!(
                        "{} deviates {:.1}x from the {} baseline profile{}{}",
                        attr.feature,
                        attr.deviation,
                        features.profile(),
                        spike_note,
                        module_note
                    ),
                    top_feature: attr.feature,
                }
            }
            None => Explanation {
                top_feature: UNKNOWN_FEATURE.to_string(),
                rationale: format!("No feature stands out from the baseline profile{module_note}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (ExplanationAnnotator, FeatureLayout) {
        let layout = FeatureLayout {
            length: 16,
            ..FeatureLayout::default()
        };
        let mut template = vec![0.0; 16];
        template[2] = 50.0;
        template[10] = 1.0;
        let store = BaselineStore::from_profiles(
            vec![("4000".to_string(), template)],
            None,
            &layout,
        )
        .unwrap();
        let attributor = DeviationAttributor::new(Arc::new(store), layout.clone());
        (ExplanationAnnotator::new(Box::new(attributor)), layout)
    }

    fn scores() -> BTreeMap<String, f64> {
        let mut s = BTreeMap::new();
        s.insert("behavioral".to_string(), 0.3);
        s.insert("supervised".to_string(), 0.9);
        s
    }

    #[test]
    fn test_top_feature_is_largest_deviation() {
        let (annotator, _) = setup();
        let mut values = vec![0.0; 16];
        values[2] = 6000.0; // 5950 / 51 = 116.7
        values[10] = 999.0; // 998 / 2 = 499
        let v = FeatureVector::from_values(values, "4000");

        let e = annotator.explain(&v, &scores());
        assert_eq!(e.top_feature, "velocity_proxy");
        assert!(e.rationale.contains("velocity_proxy"));
        assert!(e.rationale.contains("supervised at 0.90"));
    }

    #[test]
    fn test_unknown_profile_gives_sentinel() {
        let (annotator, _) = setup();
        let v = FeatureVector::from_values(vec![1.0; 16], "9999");
        let e = annotator.explain(&v, &BTreeMap::new());
        assert_eq!(e.top_feature, UNKNOWN_FEATURE);
    }

    #[test]
    fn test_identical_to_baseline_gives_sentinel() {
        let (annotator, _) = setup();
        let mut values = vec![0.0; 16];
        values[2] = 50.0;
        values[10] = 1.0;
        let e = annotator.explain(&FeatureVector::from_values(values, "4000"), &scores());
        assert_eq!(e.top_feature, UNKNOWN_FEATURE);
    }

    #[test]
    fn test_unreserved_position_named_by_index() {
        let (annotator, _) = setup();
        let mut values = vec![0.0; 16];
        values[2] = 50.0;
        values[10] = 1.0;
        values[7] = 3.0;
        let e = annotator.explain(&FeatureVector::from_values(values, "4000"), &scores());
        assert_eq!(e.top_feature, "feature_7");
    }

    #[test]
    fn test_explain_is_deterministic() {
        let (annotator, _) = setup();
        let v = FeatureVector::from_values(vec![2.0; 16], "4000");
        assert_eq!(annotator.explain(&v, &scores()), annotator.explain(&v, &scores()));
    }
}
