//! Type definitions for requests and decisions

pub mod decision;
pub mod request;

pub use decision::{
    DecisionResult, DecisionStatus, ErrorResponse, Explanation, GatewayResponse, RejectionResponse,
    RiskBand,
};
pub use request::{BehavioralSignals, TransactionRequest};
