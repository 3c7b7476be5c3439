//! Decision payloads returned to the gateway.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Terminal decision status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Approved,
    Flagged,
    Declined,
    Blocked,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Approved => "APPROVED",
            DecisionStatus::Flagged => "FLAGGED",
            DecisionStatus::Declined => "DECLINED",
            DecisionStatus::Blocked => "BLOCKED",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score band the decision fell into, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
    Adversarial,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Negligible => "negligible",
            RiskBand::Low => "low",
            RiskBand::Medium => "medium",
            RiskBand::High => "high",
            RiskBand::Critical => "critical",
            RiskBand::Adversarial => "adversarial",
        }
    }
}

/// Top contributing feature and a sentence about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    #[serde(rename = "primary_suspicious_feature")]
    pub top_feature: String,
    pub rationale: String,
}

/// Full decision for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub transaction_id: String,
    pub status: DecisionStatus,
    /// Short text shown to the payer
    pub reason: String,
    pub risk_band: RiskBand,
    pub risk_score: f64,
    #[serde(rename = "requires_human_in_the_loop")]
    pub requires_human_review: bool,
    #[serde(rename = "concept_drift_detected")]
    pub drift_detected: bool,
    #[serde(rename = "explainability")]
    pub explanation: Explanation,
    #[serde(rename = "module_breakdown")]
    pub module_scores: BTreeMap<String, f64>,
    pub processing_time_us: u64,
}

/// Validation failure: no score, no partial decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionResponse {
    pub transaction_id: String,
    pub status: String,
    pub reason: String,
    pub error_kind: String,
}

impl RejectionResponse {
    pub fn new(transaction_id: &str, error_kind: &str, reason: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            status: "REJECTED".to_string(),
            reason: reason.into(),
            error_kind: error_kind.to_string(),
        }
    }

    /// Rejection for a payload that did not decode as a request. Keeps the
    /// caller's `transaction_id` when one is readable, otherwise mints one.
    pub fn malformed(payload: &[u8], error: impl fmt::Display) -> Self {
        let transaction_id = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("transaction_id")?.as_str().map(str::to_string))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self::new(
            &transaction_id,
            "malformed_request",
            format!("Malformed request: {error}"),
        )
    }
}

/// Internal failure (configuration or model error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub transaction_id: String,
    pub status: String,
    pub reason: String,
}

/// Whatever goes back over the wire for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GatewayResponse {
    Decision(DecisionResult),
    Rejected(RejectionResponse),
    Error(ErrorResponse),
}

impl GatewayResponse {
    pub fn from_outcome(transaction_id: &str, outcome: Result<DecisionResult, PipelineError>) -> Self {
        match outcome {
            Ok(decision) => GatewayResponse::Decision(decision),
            Err(PipelineError::Rejected(e)) => GatewayResponse::Rejected(RejectionResponse::new(
                transaction_id,
                e.kind(),
                format!("Card declined: {e}"),
            )),
            Err(e) => GatewayResponse::Error(ErrorResponse {
                transaction_id: transaction_id.to_string(),
                status: "ERROR".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn transaction_id(&self) -> &str {
        match self {
            GatewayResponse::Decision(d) => &d.transaction_id,
            GatewayResponse::Rejected(r) => &r.transaction_id,
            GatewayResponse::Error(e) => &e.transaction_id,
        }
    }

    pub fn status(&self) -> &str {
        match self {
            GatewayResponse::Decision(d) => d.status.as_str(),
            GatewayResponse::Rejected(r) => &r.status,
            GatewayResponse::Error(e) => &e.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CardError, RequestError};

    fn decision() -> DecisionResult {
        let mut module_scores = BTreeMap::new();
        module_scores.insert("supervised".to_string(), 0.12);
        DecisionResult {
            transaction_id: "tx_1".to_string(),
            status: DecisionStatus::Flagged,
            reason: "Transaction held for review.".to_string(),
            risk_band: RiskBand::Medium,
            risk_score: 0.45,
            requires_human_review: true,
            drift_detected: false,
            explanation: Explanation {
                top_feature: "velocity_proxy".to_string(),
                rationale: "velocity spiked".to_string(),
            },
            module_scores,
            processing_time_us: 120,
        }
    }

    #[test]
    fn test_decision_wire_names() {
        let json = serde_json::to_value(decision()).unwrap();
        assert_eq!(json["status"], "FLAGGED");
        assert_eq!(json["risk_band"], "medium");
        assert_eq!(json["requires_human_in_the_loop"], true);
        assert_eq!(json["concept_drift_detected"], false);
        assert_eq!(json["explainability"]["primary_suspicious_feature"], "velocity_proxy");
        assert_eq!(json["module_breakdown"]["supervised"], 0.12);
    }

    #[test]
    fn test_rejection_has_no_score() {
        let outcome = Err(PipelineError::Rejected(RequestError::Card(CardError::InvalidChecksum)));
        let response = GatewayResponse::from_outcome("tx_2", outcome);
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(response.status(), "REJECTED");
        assert_eq!(json["error_kind"], "invalid_checksum");
        assert!(json["reason"].as_str().unwrap().contains("Luhn"));
        assert!(json.get("risk_score").is_none());
    }

    #[test]
    fn test_malformed_keeps_readable_transaction_id() {
        let r = RejectionResponse::malformed(br#"{"transaction_id": "tx_9", "amount": "lots"}"#, "bad amount");
        assert_eq!(r.transaction_id, "tx_9");
        assert_eq!(r.error_kind, "malformed_request");
        assert!(r.reason.contains("bad amount"));

        let r = RejectionResponse::malformed(b"not json", "expected value");
        assert!(uuid::Uuid::parse_str(&r.transaction_id).is_ok());

        let r = RejectionResponse::malformed(br#"{"transaction_id": 42}"#, "wrong type");
        assert!(uuid::Uuid::parse_str(&r.transaction_id).is_ok());
    }

    #[test]
    fn test_internal_error_response() {
        let outcome = Err(PipelineError::MissingBaseline {
            prefix: "6011".to_string(),
        });
        let response = GatewayResponse::from_outcome("tx_3", outcome);
        assert_eq!(response.status(), "ERROR");
        assert_eq!(response.transaction_id(), "tx_3");
    }

    #[test]
    fn test_status_severity_order() {
        assert!(DecisionStatus::Approved < DecisionStatus::Flagged);
        assert!(DecisionStatus::Declined < DecisionStatus::Blocked);
        assert!(RiskBand::Low < RiskBand::Critical);
    }
}
