//! Transaction request as received from the gateway.

use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Optional behavioral signals captured at checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralSignals {
    /// Mean keystroke latency while typing card details
    #[serde(default)]
    pub typing_latency_ms: Option<f64>,
    /// Distance from the last known location of the card holder
    #[serde(default)]
    pub geo_shift_km: Option<f64>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

/// A single payment authorization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default = "new_transaction_id")]
    pub transaction_id: String,

    /// Card number, digits with optional spaces
    pub card_number: String,

    pub amount: f64,

    pub cvv: String,

    /// MM/YY
    #[serde(default)]
    pub expiry: Option<String>,

    #[serde(flatten)]
    pub signals: BehavioralSignals,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_transaction_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl TransactionRequest {
    /// Create a request with the required fields.
    pub fn new(card_number: &str, amount: f64, cvv: &str) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            card_number: card_number.to_string(),
            amount,
            cvv: cvv.to_string(),
            expiry: None,
            signals: BehavioralSignals::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_expiry(mut self, expiry: &str) -> Self {
        self.expiry = Some(expiry.to_string());
        self
    }

    pub fn with_signals(mut self, signals: BehavioralSignals) -> Self {
        self.signals = signals;
        self
    }

    /// Checks on the non-card fields. The card number is checked by
    /// [`crate::card::CardValidator`].
    pub fn validate_fields(&self) -> Result<(), RequestError> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(RequestError::InvalidAmount(self.amount));
        }

        let cvv_ok = (3..=4).contains(&self.cvv.len()) && self.cvv.bytes().all(|b| b.is_ascii_digit());
        if !cvv_ok {
            return Err(RequestError::InvalidCvv);
        }

        if let Some(expiry) = &self.expiry {
            parse_expiry(expiry).ok_or(RequestError::InvalidExpiry)?;
        }

        Ok(())
    }
}

/// Parse `MM/YY` into (month, two-digit year).
pub fn parse_expiry(expiry: &str) -> Option<(u32, u32)> {
    let (mm, yy) = expiry.trim().split_once('/')?;
    if mm.len() != 2 || yy.len() != 2 {
        return None;
    }
    let month: u32 = mm.parse().ok()?;
    let year: u32 = yy.parse().ok()?;
    (1..=12).contains(&month).then_some((month, year))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserialization_defaults() {
        let json = r#"{"card_number":"4000 1234 5678 9017","amount":50.0,"cvv":"123"}"#;
        let req: TransactionRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.card_number, "4000 1234 5678 9017");
        assert!(!req.transaction_id.is_empty());
        assert_eq!(req.signals, BehavioralSignals::default());
        assert!(req.validate_fields().is_ok());
    }

    #[test]
    fn test_behavioral_fields_are_flat() {
        let json = r#"{"card_number":"4000123456789017","amount":5,"cvv":"123",
                       "typing_latency_ms":120.5,"device_fingerprint":"fp_1"}"#;
        let req: TransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.signals.typing_latency_ms, Some(120.5));
        assert_eq!(req.signals.device_fingerprint.as_deref(), Some("fp_1"));
        assert_eq!(req.signals.geo_shift_km, None);
    }

    #[test]
    fn test_field_validation() {
        let base = TransactionRequest::new("4000123456789017", 10.0, "123");

        let mut bad = base.clone();
        bad.amount = -1.0;
        assert_eq!(bad.validate_fields(), Err(RequestError::InvalidAmount(-1.0)));

        let mut bad = base.clone();
        bad.cvv = "12a".to_string();
        assert_eq!(bad.validate_fields(), Err(RequestError::InvalidCvv));

        let bad = base.clone().with_expiry("13/27");
        assert_eq!(bad.validate_fields(), Err(RequestError::InvalidExpiry));

        assert!(base.with_expiry("09/27").validate_fields().is_ok());
    }

    #[test]
    fn test_parse_expiry() {
        assert_eq!(parse_expiry("01/30"), Some((1, 30)));
        assert_eq!(parse_expiry("1/30"), None);
        assert_eq!(parse_expiry("00/30"), None);
        assert_eq!(parse_expiry("0130"), None);
    }
}
