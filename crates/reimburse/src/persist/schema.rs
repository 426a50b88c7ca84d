//! Schema types for artifact serialization.
//!
//! These types provide a stable on-disk format independent of runtime types.
//! Schema types are separate from runtime types for:
//! - Forward/backward compatibility (schema can evolve independently)
//! - Validation during deserialization
//!
//! Maps use `BTreeMap` so JSON output is deterministic. Model schemas avoid
//! optional/skipped fields because the binary codec is not self-describing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::features::SchemaFingerprint;

/// Current version of [`TrainedModelSchema`].
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Current version of [`ManifestSchema`].
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Tree growth limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParamsSchema {
    pub max_depth: u32,
    pub min_samples_leaf: u32,
    pub min_samples_split: u32,
}

/// Tree schema (SoA layout).
///
/// `children_left[i] == 0` marks node `i` as a leaf; the root is never a child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSchema {
    /// Number of nodes (internal + leaves).
    pub num_nodes: u32,
    /// Split feature index per node (0 for leaves).
    pub split_indices: Vec<u32>,
    /// Split threshold per node (0 for leaves).
    pub thresholds: Vec<f64>,
    pub children_left: Vec<u32>,
    pub children_right: Vec<u32>,
    /// Leaf value per node (0 for internal nodes).
    pub leaf_values: Vec<f64>,
}

/// One persisted ensemble member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModelSchema {
    pub format_version: u32,
    pub subset: String,
    pub member: u32,
    pub seed: u64,
    /// Ordered feature names at fit time.
    pub feature_names: Vec<String>,
    pub params: TreeParamsSchema,
    pub n_samples: u64,
    pub tree: TreeSchema,
}

/// Receipt-cap feature constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureParamsSchema {
    pub receipt_cap: f64,
    pub receipt_cap_factor: f64,
}

/// Routing constants the subsets were partitioned with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingParamsSchema {
    pub outlier_threshold: f64,
    pub short_trip_max_days: u32,
    pub long_trip_min_days: u32,
}

/// Encoding of member files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormatSchema {
    Json,
    Binary,
}

/// A trained subset as listed in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetEntrySchema {
    /// One member file per seed, in member order.
    pub seeds: Vec<u64>,
    pub n_samples: u64,
    pub train_mse: f64,
}

/// Index of an artifact directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSchema {
    pub format_version: u32,
    pub schema_fingerprint: SchemaFingerprint,
    pub feature_names: Vec<String>,
    pub artifact_format: ArtifactFormatSchema,
    pub routing: RoutingParamsSchema,
    pub features: FeatureParamsSchema,
    /// Trained subsets by name.
    pub subsets: BTreeMap<String, SubsetEntrySchema>,
    /// Untrained subsets by name, with the reason.
    #[serde(default)]
    pub unavailable: BTreeMap<String, String>,
}
