//! Learned estimator for a legacy travel reimbursement formula.
//!
//! A trip is described by its duration in days, miles traveled and total
//! receipts. The crate learns the legacy amount from labeled examples:
//!
//! 1. [`features::FeatureTransformer`] encodes a case as a fixed-order vector.
//! 2. [`training::train_registry`] partitions the corpus by [`routing::RoutingTable`]
//!    and fits a seeded ensemble of regression trees per subset.
//! 3. [`serving::Predictor`] routes each case to its primary subset and at
//!    most one specialist, averages each ensemble, and blends by weight.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use reimburse::config::PipelineConfig;
//! use reimburse::serving::{ModelStore, Predictor};
//! use reimburse::testing::synthetic_corpus;
//!
//! let config = PipelineConfig::builder()
//!     .ensemble_seeds(vec![42, 123])
//!     .build()
//!     .unwrap();
//! let store = Arc::new(ModelStore::in_memory(config, synthetic_corpus(200, 1)));
//! let predictor = Predictor::new(store);
//!
//! let amount = predictor.estimate(3, 120.0, 45.5).unwrap();
//! assert!(amount.is_finite());
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod model;
pub mod persist;
pub mod repr;
pub mod routing;
pub mod serving;
pub mod testing;
pub mod training;
pub mod utils;

// Re-export approx traits for users' float comparisons against estimates.
pub use approx;

pub use config::{ArtifactFormat, BlendPolicy, ConfigError, PipelineConfig};
pub use data::{Case, Corpus, CorpusSource, JsonCorpusFile, LabeledCase};
pub use error::{Error, Result, SchemaMismatchError, UnavailableModelError};
pub use evaluation::{EvalReport, evaluate};
pub use features::{FeatureSchema, FeatureTransformer, FeatureVector};
pub use model::{Ensemble, ModelRegistry, TrainedModel};
pub use persist::ArtifactStore;
pub use routing::{RoutingParams, RoutingTable, Subset};
pub use serving::{ModelStore, Prediction, Predictor, fallback_estimate};
pub use training::{TrainingError, TreeParams, Verbosity};
pub use utils::Parallelism;

/// Train every subset on `corpus` and persist the result to `artifacts`.
///
/// Deterministic: the same corpus and config produce byte-identical
/// artifacts.
pub fn train(
    corpus: &Corpus,
    config: &PipelineConfig,
    artifacts: &ArtifactStore,
) -> Result<ModelRegistry> {
    config.validate()?;
    let registry = training::train_registry(corpus, config)?;
    artifacts.save(&registry)?;
    Ok(registry)
}
