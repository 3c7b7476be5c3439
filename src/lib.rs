//! Payment Risk Engine Library
//!
//! Real-time risk decisions for card payments: card validation, baseline
//! feature construction, ensemble scoring, concept-drift tracking, tiered
//! decisions with human review routing, and per-decision explanations.

pub mod card;
pub mod config;
pub mod consumer;
pub mod decision;
pub mod drift;
pub mod error;
pub mod features;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod types;

pub use card::{CardValidator, ValidatedCard};
pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::{CardError, ConfigError, PipelineError, RequestError};
pub use models::inference::InferenceEngine;
pub use pipeline::DecisionPipeline;
pub use producer::DecisionPublisher;
pub use types::{DecisionResult, GatewayResponse, TransactionRequest};
