//! Baseline feature templates keyed by card prefix.

use crate::card::ValidatedCard;
use crate::error::{ConfigError, PipelineError};
use crate::features::layout::FeatureLayout;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// On-disk format of the baseline database.
#[derive(Debug, Deserialize)]
struct BaselineFile {
    #[serde(default)]
    fallback: Option<String>,
    profiles: BTreeMap<String, Vec<f32>>,
}

/// Result of matching a card against the store.
#[derive(Debug, Clone)]
pub struct BaselineMatch {
    pub key: String,
    pub template: Arc<[f32]>,
    /// True when the card itself starts with the profile key.
    pub canonical: bool,
}

/// Read-only set of baseline profiles, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    profiles: BTreeMap<String, Arc<[f32]>>,
    fallback: Option<String>,
}

impl BaselineStore {
    /// Build a store from in-memory profiles, checking every template length.
    pub fn from_profiles<I>(
        profiles: I,
        fallback: Option<String>,
        layout: &FeatureLayout,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        layout.validate()?;
        let mut map = BTreeMap::new();
        for (key, values) in profiles {
            if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::FeatureShape(format!(
                    "baseline key {key:?} must be a non-empty digit prefix"
                )));
            }
            if values.len() != layout.length {
                return Err(ConfigError::FeatureShape(format!(
                    "baseline {} has {} values, layout expects {}",
                    key,
                    values.len(),
                    layout.length
                )));
            }
            map.insert(key, Arc::from(values));
        }

        if let Some(fb) = &fallback {
            if !map.contains_key(fb) {
                return Err(ConfigError::MissingBaseline(format!(
                    "fallback profile {fb} is not defined"
                )));
            }
        }

        if map.is_empty() {
            return Err(ConfigError::MissingBaseline(
                "baseline store has no profiles".to_string(),
            ));
        }

        if fallback.is_none() {
            warn!("No fallback baseline configured; unknown card prefixes will fail");
        }

        Ok(Self {
            profiles: map,
            fallback,
        })
    }

    /// Load the baseline database from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P, layout: &FeatureLayout) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let load_err = |reason: String| ConfigError::BaselineLoad {
            path: path.display().to_string(),
            reason,
        };

        let raw = std::fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let file: BaselineFile = serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;

        let store = Self::from_profiles(file.profiles, file.fallback, layout)?;
        info!(
            path = %path.display(),
            profiles = store.profiles.len(),
            fallback = ?store.fallback,
            "Baseline profiles loaded"
        );
        Ok(store)
    }

    /// Pick the template for a card: the longest matching prefix wins,
    /// otherwise the fallback profile.
    pub fn select(&self, card: &ValidatedCard) -> Result<BaselineMatch, PipelineError> {
        let digits = card.digits();
        let canonical = self
            .profiles
            .iter()
            .filter(|(key, _)| digits.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len());

        if let Some((key, template)) = canonical {
            return Ok(BaselineMatch {
                key: key.clone(),
                template: template.clone(),
                canonical: true,
            });
        }

        match &self.fallback {
            Some(key) => {
                let template = self.profiles.get(key).cloned().ok_or_else(|| {
                    PipelineError::MissingBaseline {
                        prefix: card.prefix(4).to_string(),
                    }
                })?;
                Ok(BaselineMatch {
                    key: key.clone(),
                    template,
                    canonical: false,
                })
            }
            None => Err(PipelineError::MissingBaseline {
                prefix: card.prefix(4).to_string(),
            }),
        }
    }

    /// Template by profile key.
    pub fn get(&self, key: &str) -> Option<&[f32]> {
        self.profiles.get(key).map(|t| t.as_ref())
    }

    pub fn profile_keys(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
