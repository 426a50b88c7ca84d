//! Pipeline configuration with builder pattern.
//!
//! [`PipelineConfig`] gathers every constant that shapes training and
//! serving: the routing thresholds, feature constants, per-subset tree
//! limits, ensemble seeds and blend policy. It uses the `bon` crate for
//! builder generation with validation in `build()`.
//!
//! # Example
//!
//! ```
//! use reimburse::config::{BlendPolicy, PipelineConfig};
//! use reimburse::training::TreeParams;
//!
//! // All defaults
//! let config = PipelineConfig::builder().build().unwrap();
//! assert_eq!(config.outlier_threshold, 1400.0);
//!
//! let config = PipelineConfig::builder()
//!     .outlier_threshold(1500.0)
//!     .main_tree(TreeParams::new(10, 4))
//!     .ensemble_seeds(vec![1, 2, 3])
//!     .blend(BlendPolicy::InverseError)
//!     .build()
//!     .unwrap();
//! ```

use bon::Builder;
use thiserror::Error;

use crate::features::{FeatureParams, FeatureTransformer};
use crate::routing::{RoutingParams, RoutingTable, Subset};
use crate::training::{ParamValidationError, TreeParams, Verbosity};

/// Default ensemble seeds.
pub const DEFAULT_SEEDS: [u64; 5] = [42, 123, 456, 789, 999];

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be finite and positive, got {value}")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("{field} must be in (0, 1], got {value}")]
    InvalidWeight { field: &'static str, value: f64 },

    #[error("at least one ensemble seed is required")]
    EmptySeeds,

    #[error("ensemble seed {0} is listed twice")]
    DuplicateSeed(u64),

    #[error("short trips (<= {short_max_days} days) must end before long trips (>= {long_min_days} days)")]
    OverlappingTripLengths { short_max_days: u32, long_min_days: u32 },

    #[error("invalid tree parameters for {subset}: {source}")]
    InvalidTree {
        subset: Subset,
        #[source]
        source: ParamValidationError,
    },

    #[error("invalid routing table: {0}")]
    InvalidRoutingTable(String),
}

// =============================================================================
// BlendPolicy / ArtifactFormat
// =============================================================================

/// How per-subset estimates are weighted into one amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlendPolicy {
    /// Fixed primary and specialist weights, renormalized per case.
    Fixed { primary: f64, specialist: f64 },
    /// Weights proportional to `1 / (train_mse + 1e-6)` of each subset.
    InverseError,
}

impl Default for BlendPolicy {
    fn default() -> Self {
        BlendPolicy::Fixed {
            primary: 0.8,
            specialist: 0.2,
        }
    }
}

/// On-disk encoding of model artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactFormat {
    /// Pretty JSON, one file per ensemble member.
    #[default]
    Json,
    /// Checksummed postcard binary, one file per ensemble member.
    Binary,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Json => "model.json",
            ArtifactFormat::Binary => "model.bin",
        }
    }
}

// =============================================================================
// PipelineConfig
// =============================================================================

/// Configuration for training and serving the estimator.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct PipelineConfig {
    // === Routing ===
    /// Receipts strictly above this go to the outlier subset. Default: 1400.
    #[builder(default = 1400.0)]
    pub outlier_threshold: f64,

    /// Trips of at most this many days use the short specialist. Default: 2.
    #[builder(default = 2)]
    pub short_trip_max_days: u32,

    /// Trips of at least this many days use the long specialist. Default: 8.
    #[builder(default = 8)]
    pub long_trip_min_days: u32,

    /// A specialist with fewer cases is not trained. Default: 20.
    #[builder(default = 20)]
    pub min_specialist_samples: usize,

    // === Features ===
    #[builder(default)]
    pub features: FeatureParams,

    // === Trees ===
    /// Limits for the main subset. Default: depth 12, leaf 3.
    #[builder(default = TreeParams::new(12, 3))]
    pub main_tree: TreeParams,

    /// Limits for the outlier subset. Default: depth 8, leaf 2.
    #[builder(default = TreeParams::new(8, 2))]
    pub outlier_tree: TreeParams,

    /// Limits for both specialists. Default: depth 10, leaf 2.
    #[builder(default = TreeParams::new(10, 2))]
    pub specialist_tree: TreeParams,

    // === Ensemble ===
    /// One ensemble member per seed. Default: `[42, 123, 456, 789, 999]`.
    #[builder(default = DEFAULT_SEEDS.to_vec())]
    pub ensemble_seeds: Vec<u64>,

    #[builder(default)]
    pub blend: BlendPolicy,

    // === Persistence ===
    #[builder(default)]
    pub artifact_format: ArtifactFormat,

    // === Resources ===
    /// Number of threads. 0 = auto, 1 = sequential.
    #[builder(default = 0)]
    pub n_threads: usize,

    // === Logging ===
    /// Verbosity level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

/// Custom finishing function that validates the config.
impl<S: pipeline_config_builder::IsComplete> PipelineConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for non-positive thresholds, blend weights
    /// outside (0, 1], empty or duplicated seeds, overlapping trip lengths,
    /// or invalid tree parameters.
    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: 1400.0,
            short_trip_max_days: 2,
            long_trip_min_days: 8,
            min_specialist_samples: 20,
            features: FeatureParams::default(),
            main_tree: TreeParams::new(12, 3),
            outlier_tree: TreeParams::new(8, 2),
            specialist_tree: TreeParams::new(10, 2),
            ensemble_seeds: DEFAULT_SEEDS.to_vec(),
            blend: BlendPolicy::default(),
            artifact_format: ArtifactFormat::default(),
            n_threads: 0,
            verbosity: Verbosity::default(),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("outlier_threshold", self.outlier_threshold)?;
        check_positive("receipt_cap", self.features.receipt_cap)?;
        check_positive("receipt_cap_factor", self.features.receipt_cap_factor)?;

        if self.short_trip_max_days >= self.long_trip_min_days {
            return Err(ConfigError::OverlappingTripLengths {
                short_max_days: self.short_trip_max_days,
                long_min_days: self.long_trip_min_days,
            });
        }

        if let BlendPolicy::Fixed {
            primary,
            specialist,
        } = self.blend
        {
            check_weight("primary weight", primary)?;
            check_weight("specialist weight", specialist)?;
        }

        if self.ensemble_seeds.is_empty() {
            return Err(ConfigError::EmptySeeds);
        }
        for (i, seed) in self.ensemble_seeds.iter().enumerate() {
            if self.ensemble_seeds[..i].contains(seed) {
                return Err(ConfigError::DuplicateSeed(*seed));
            }
        }

        for subset in Subset::ALL {
            self.tree_params(subset)
                .validate()
                .map_err(|source| ConfigError::InvalidTree { subset, source })?;
        }
        Ok(())
    }

    /// Tree limits used for a subset.
    pub fn tree_params(&self, subset: Subset) -> &TreeParams {
        match subset {
            Subset::Main => &self.main_tree,
            Subset::Outlier => &self.outlier_tree,
            Subset::Short | Subset::Long => &self.specialist_tree,
        }
    }

    pub fn routing_params(&self) -> RoutingParams {
        RoutingParams {
            outlier_threshold: self.outlier_threshold,
            short_trip_max_days: self.short_trip_max_days,
            long_trip_min_days: self.long_trip_min_days,
        }
    }

    pub fn routing_table(&self) -> RoutingTable {
        self.routing_params().table()
    }

    pub fn transformer(&self) -> FeatureTransformer {
        FeatureTransformer::new(self.features)
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { field, value })
    }
}

fn check_weight(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidWeight { field, value })
    }
}
