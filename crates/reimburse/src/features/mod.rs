//! Feature engineering.
//!
//! - [`FeatureTransformer`]: case to fixed-order numeric vector
//! - [`FeatureSchema`]: ordered feature names and their fingerprint
//! - [`TripCategory`]: the one-hot trip shape

mod schema;
mod transform;

pub use schema::{FEATURE_NAMES, FeatureSchema, N_FEATURES, SchemaFingerprint, columns};
pub use transform::{
    FeatureParams, FeatureTransformer, FeatureVector, TripCategory, receipt_multiplier,
};
