//! Feature vector construction

pub mod baseline;
pub mod builder;
pub mod layout;

pub use baseline::{BaselineMatch, BaselineStore};
pub use builder::{FeatureBuilder, FeatureRecord, FeatureVector, InjectionConfig};
pub use layout::{FeatureLayout, Slot};
