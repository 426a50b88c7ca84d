//! Training infrastructure.
//!
//! - [`DatasetPartitioner`]: labeled cases to per-subset training sets
//! - [`TreeTrainer`]: deterministic regression trees and seed ensembles
//! - [`train_registry`]: the whole-corpus training run
//! - [`TrainingLogger`], [`Verbosity`]: structured logging
//! - [`Mse`], [`Rmse`], [`Mae`]: regression metrics

mod grower;
mod logger;
mod metrics;
mod params;
mod partition;
mod trainer;

pub use grower::TreeGrower;
pub use logger::{TrainingLogger, Verbosity};
pub use metrics::{Mae, MetricFn, Mse, Rmse};
pub use params::{ParamValidationError, TreeParams};
pub use partition::{DatasetPartitioner, Partition, SkippedSubset};
pub use trainer::{TrainingError, TrainingSet, TreeTrainer, train_registry};
