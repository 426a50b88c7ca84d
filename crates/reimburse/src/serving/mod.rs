//! Serving: model store, router and predictor.
//!
//! - [`ModelStore`]: lazily loaded or trained registry, single-flight
//! - [`Router`]: subsets and blend weights per case
//! - [`Predictor`]: estimates, explanations, batches and the fallback

mod predictor;
mod router;
mod store;

pub use predictor::{
    CaseEstimate, Contribution, Estimate, EstimateSource, FALLBACK_PER_DAY, FALLBACK_PER_MILE,
    FALLBACK_RECEIPT_RATE, Prediction, Predictor, fallback_estimate,
};
pub use router::{INVERSE_ERROR_EPSILON, Route, RouteLeg, Router};
pub use store::{ModelStore, StoreStats};
