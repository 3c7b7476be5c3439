//! Positional contract of the feature vector.
//!
//! The scoring models were trained on a fixed-length vector where a handful of
//! positions carry live transaction data. Everything else comes from the
//! baseline template.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Semantic names for the reserved positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Amount,
    BinCode,
    IssuerCode,
    VelocityProxy,
    TypingLatency,
    GeoShift,
    DeviceRisk,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::Amount,
        Slot::BinCode,
        Slot::IssuerCode,
        Slot::VelocityProxy,
        Slot::TypingLatency,
        Slot::GeoShift,
        Slot::DeviceRisk,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Slot::Amount => "transaction_amount",
            Slot::BinCode => "card_bin_code",
            Slot::IssuerCode => "card_issuer_code",
            Slot::VelocityProxy => "velocity_proxy",
            Slot::TypingLatency => "typing_latency",
            Slot::GeoShift => "geolocation_shift",
            Slot::DeviceRisk => "device_risk",
        }
    }

    pub fn from_name(name: &str) -> Option<Slot> {
        Slot::ALL.into_iter().find(|s| s.name() == name)
    }
}

/// Reserved indices and the expected vector length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureLayout {
    pub length: usize,
    pub amount_index: usize,
    pub bin_code_index: usize,
    pub issuer_code_index: usize,
    pub velocity_proxy_index: usize,
    pub typing_latency_index: usize,
    pub geo_shift_index: usize,
    pub device_risk_index: usize,
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self {
            length: 432,
            amount_index: 2,
            bin_code_index: 3,
            issuer_code_index: 4,
            velocity_proxy_index: 10,
            typing_latency_index: 11,
            geo_shift_index: 12,
            device_risk_index: 13,
        }
    }
}

impl FeatureLayout {
    pub fn index(&self, slot: Slot) -> usize {
        match slot {
            Slot::Amount => self.amount_index,
            Slot::BinCode => self.bin_code_index,
            Slot::IssuerCode => self.issuer_code_index,
            Slot::VelocityProxy => self.velocity_proxy_index,
            Slot::TypingLatency => self.typing_latency_index,
            Slot::GeoShift => self.geo_shift_index,
            Slot::DeviceRisk => self.device_risk_index,
        }
    }

    /// Reverse lookup: which slot (if any) owns this position.
    pub fn slot_at(&self, index: usize) -> Option<Slot> {
        Slot::ALL.into_iter().find(|&s| self.index(s) == index)
    }

    /// Human-readable name for any position.
    pub fn feature_name(&self, index: usize) -> String {
        match self.slot_at(index) {
            Some(slot) => slot.name().to_string(),
            None => format!("feature_{index}"),
        }
    }

    /// Reserved indices must be distinct and inside the vector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.length == 0 {
            return Err(ConfigError::FeatureShape(
                "feature length must be positive".to_string(),
            ));
        }
        let mut seen = Vec::with_capacity(Slot::ALL.len());
        for slot in Slot::ALL {
            let idx = self.index(slot);
            if idx >= self.length {
                return Err(ConfigError::FeatureShape(format!(
                    "{} index {} is outside a vector of length {}",
                    slot.name(),
                    idx,
                    self.length
                )));
            }
            if seen.contains(&idx) {
                return Err(ConfigError::FeatureShape(format!(
                    "index {} is reserved twice ({})",
                    idx,
                    slot.name()
                )));
            }
            seen.push(idx);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        let layout = FeatureLayout::default();
        assert!(layout.validate().is_ok());
        assert_eq!(layout.index(Slot::Amount), 2);
        assert_eq!(layout.index(Slot::VelocityProxy), 10);
    }

    #[test]
    fn test_feature_names() {
        let layout = FeatureLayout::default();
        assert_eq!(layout.feature_name(2), "transaction_amount");
        assert_eq!(layout.feature_name(10), "velocity_proxy");
        assert_eq!(layout.feature_name(200), "feature_200");
        assert_eq!(Slot::from_name("card_bin_code"), Some(Slot::BinCode));
        assert_eq!(Slot::from_name("nope"), None);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let layout = FeatureLayout {
            bin_code_index: 2,
            ..FeatureLayout::default()
        };
        assert!(matches!(layout.validate(), Err(ConfigError::FeatureShape(_))));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let layout = FeatureLayout {
            length: 12,
            ..FeatureLayout::default()
        };
        assert!(layout.validate().is_err());
    }
}
