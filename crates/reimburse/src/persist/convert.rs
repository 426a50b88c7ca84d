//! Conversion between runtime types and schema types.
//!
//! Runtime to schema is lossless (`From`). Schema to runtime validates
//! (`TryFrom`, failing with [`ReadError::Validation`]), so a loaded model
//! is structurally sound before it is ever traversed.

use std::io::{Read, Write};

use super::error::{ReadError, WriteError};
use super::native;
use super::schema::{
    ArtifactFormatSchema, FeatureParamsSchema, MODEL_FORMAT_VERSION, RoutingParamsSchema,
    TrainedModelSchema, TreeParamsSchema, TreeSchema,
};
use crate::config::ArtifactFormat;
use crate::features::{FeatureParams, FeatureSchema};
use crate::model::TrainedModel;
use crate::repr::Tree;
use crate::routing::{RoutingParams, Subset};
use crate::training::TreeParams;

// =============================================================================
// Parameter conversions
// =============================================================================

impl From<&TreeParams> for TreeParamsSchema {
    fn from(params: &TreeParams) -> Self {
        Self {
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            min_samples_split: params.min_samples_split,
        }
    }
}

impl TryFrom<TreeParamsSchema> for TreeParams {
    type Error = ReadError;

    fn try_from(schema: TreeParamsSchema) -> Result<Self, Self::Error> {
        let params = TreeParams::new(schema.max_depth, schema.min_samples_leaf)
            .with_min_samples_split(schema.min_samples_split);
        params
            .validate()
            .map_err(|e| ReadError::Validation(format!("tree params: {e}")))?;
        Ok(params)
    }
}

impl From<&FeatureParams> for FeatureParamsSchema {
    fn from(params: &FeatureParams) -> Self {
        Self {
            receipt_cap: params.receipt_cap,
            receipt_cap_factor: params.receipt_cap_factor,
        }
    }
}

impl From<FeatureParamsSchema> for FeatureParams {
    fn from(schema: FeatureParamsSchema) -> Self {
        Self {
            receipt_cap: schema.receipt_cap,
            receipt_cap_factor: schema.receipt_cap_factor,
        }
    }
}

impl From<&RoutingParams> for RoutingParamsSchema {
    fn from(params: &RoutingParams) -> Self {
        Self {
            outlier_threshold: params.outlier_threshold,
            short_trip_max_days: params.short_trip_max_days,
            long_trip_min_days: params.long_trip_min_days,
        }
    }
}

impl TryFrom<RoutingParamsSchema> for RoutingParams {
    type Error = ReadError;

    fn try_from(schema: RoutingParamsSchema) -> Result<Self, Self::Error> {
        if !(schema.outlier_threshold.is_finite() && schema.outlier_threshold > 0.0) {
            return Err(ReadError::Validation(format!(
                "outlier threshold must be positive, got {}",
                schema.outlier_threshold
            )));
        }
        if schema.short_trip_max_days >= schema.long_trip_min_days {
            return Err(ReadError::Validation(format!(
                "short trips (<= {} days) overlap long trips (>= {} days)",
                schema.short_trip_max_days, schema.long_trip_min_days
            )));
        }
        Ok(Self {
            outlier_threshold: schema.outlier_threshold,
            short_trip_max_days: schema.short_trip_max_days,
            long_trip_min_days: schema.long_trip_min_days,
        })
    }
}

impl From<ArtifactFormat> for ArtifactFormatSchema {
    fn from(format: ArtifactFormat) -> Self {
        match format {
            ArtifactFormat::Json => Self::Json,
            ArtifactFormat::Binary => Self::Binary,
        }
    }
}

impl From<ArtifactFormatSchema> for ArtifactFormat {
    fn from(schema: ArtifactFormatSchema) -> Self {
        match schema {
            ArtifactFormatSchema::Json => Self::Json,
            ArtifactFormatSchema::Binary => Self::Binary,
        }
    }
}

// =============================================================================
// Tree conversions
// =============================================================================

impl From<&Tree> for TreeSchema {
    fn from(tree: &Tree) -> Self {
        let leaves = tree.leaf_flags();
        Self {
            num_nodes: tree.n_nodes() as u32,
            split_indices: tree.split_indices().to_vec(),
            thresholds: tree.thresholds().to_vec(),
            children_left: tree
                .left_children()
                .iter()
                .zip(leaves)
                .map(|(&c, &leaf)| if leaf { 0 } else { c })
                .collect(),
            children_right: tree
                .right_children()
                .iter()
                .zip(leaves)
                .map(|(&c, &leaf)| if leaf { 0 } else { c })
                .collect(),
            leaf_values: tree.leaf_values().to_vec(),
        }
    }
}

impl TreeSchema {
    /// Convert to a runtime tree addressing `n_features` columns.
    pub fn into_tree(self, n_features: usize) -> Result<Tree, ReadError> {
        let n_nodes = self.num_nodes as usize;
        for (field, len) in [
            ("split_indices", self.split_indices.len()),
            ("thresholds", self.thresholds.len()),
            ("children_left", self.children_left.len()),
            ("children_right", self.children_right.len()),
            ("leaf_values", self.leaf_values.len()),
        ] {
            if len != n_nodes {
                return Err(ReadError::Validation(format!(
                    "{field} has {len} entries, num_nodes is {n_nodes}"
                )));
            }
        }

        let is_leaf: Vec<bool> = self.children_left.iter().map(|&left| left == 0).collect();
        let tree = Tree::new(
            self.split_indices,
            self.thresholds,
            self.children_left,
            self.children_right,
            is_leaf,
            self.leaf_values,
        );
        tree.validate(n_features)
            .map_err(|e| ReadError::Validation(format!("tree: {e}")))?;
        Ok(tree)
    }
}

// =============================================================================
// TrainedModel conversions
// =============================================================================

impl From<&TrainedModel> for TrainedModelSchema {
    fn from(model: &TrainedModel) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            subset: model.subset().as_str().to_string(),
            member: model.member() as u32,
            seed: model.seed(),
            feature_names: model.schema().names().to_vec(),
            params: model.params().into(),
            n_samples: model.n_samples() as u64,
            tree: model.tree().into(),
        }
    }
}

impl TryFrom<TrainedModelSchema> for TrainedModel {
    type Error = ReadError;

    fn try_from(schema: TrainedModelSchema) -> Result<Self, Self::Error> {
        if schema.format_version > MODEL_FORMAT_VERSION {
            return Err(ReadError::UnsupportedVersion {
                found: schema.format_version,
                supported: MODEL_FORMAT_VERSION,
            });
        }
        let subset = Subset::parse(&schema.subset)
            .ok_or_else(|| ReadError::Validation(format!("unknown subset {:?}", schema.subset)))?;
        let params = TreeParams::try_from(schema.params)?;
        let n_features = schema.feature_names.len();
        let tree = schema.tree.into_tree(n_features)?;

        Ok(TrainedModel::new(
            subset,
            schema.member as usize,
            schema.seed,
            FeatureSchema::from_names(schema.feature_names),
            params,
            schema.n_samples as usize,
            tree,
        ))
    }
}

// =============================================================================
// Reading and writing single models
// =============================================================================

impl TrainedModel {
    /// Write as pretty JSON.
    pub fn write_json<W: Write>(&self, mut writer: W) -> Result<(), WriteError> {
        serde_json::to_writer_pretty(&mut writer, &TrainedModelSchema::from(self))?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Read from JSON, validating structure.
    pub fn read_json<R: Read>(reader: R) -> Result<Self, ReadError> {
        let schema: TrainedModelSchema = serde_json::from_reader(reader)?;
        TrainedModel::try_from(schema)
    }

    /// Encode in the native binary format.
    pub fn to_binary(&self) -> Result<Vec<u8>, WriteError> {
        Ok(native::encode(&TrainedModelSchema::from(self))?)
    }

    /// Decode from the native binary format, validating structure.
    pub fn from_binary(bytes: &[u8]) -> Result<Self, ReadError> {
        let schema: TrainedModelSchema = native::decode(bytes)?;
        TrainedModel::try_from(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::MutableTree;

    fn sample_model() -> TrainedModel {
        let mut tree = MutableTree::new();
        let root = tree.init_root();
        let (l, r) = tree.apply_numeric_split(root, 3, 180.25);
        tree.make_leaf(l, 412.37);
        tree.make_leaf(r, 1203.0000000001);
        TrainedModel::new(
            Subset::Outlier,
            2,
            456,
            FeatureSchema::current(),
            TreeParams::new(8, 2),
            77,
            tree.freeze(),
        )
    }

    #[test]
    fn json_preserves_model_exactly() {
        let model = sample_model();
        let mut buf = Vec::new();
        model.write_json(&mut buf).unwrap();
        assert_eq!(TrainedModel::read_json(buf.as_slice()).unwrap(), model);
    }

    #[test]
    fn binary_preserves_model_exactly() {
        let model = sample_model();
        let bytes = model.to_binary().unwrap();
        assert_eq!(TrainedModel::from_binary(&bytes).unwrap(), model);
    }

    #[test]
    fn routing_params_are_validated() {
        let mut schema = RoutingParamsSchema::from(&RoutingParams::default());
        assert_eq!(RoutingParams::try_from(schema).unwrap(), RoutingParams::default());

        schema.short_trip_max_days = 8;
        assert!(matches!(
            RoutingParams::try_from(schema),
            Err(ReadError::Validation(_))
        ));

        schema.short_trip_max_days = 2;
        schema.outlier_threshold = -1.0;
        assert!(matches!(
            RoutingParams::try_from(schema),
            Err(ReadError::Validation(_))
        ));
    }

    #[test]
    fn leaf_children_serialize_as_zero() {
        let schema = TrainedModelSchema::from(&sample_model());
        assert_eq!(schema.tree.children_left, vec![1, 0, 0]);
        assert_eq!(schema.tree.children_right, vec![2, 0, 0]);
        assert_eq!(schema.subset, "outlier");
    }

    #[test]
    fn unknown_subset_is_validation_error() {
        let mut schema = TrainedModelSchema::from(&sample_model());
        schema.subset = "weekend".into();
        assert!(matches!(
            TrainedModel::try_from(schema),
            Err(ReadError::Validation(_))
        ));
    }

    #[test]
    fn newer_format_version_rejected() {
        let mut schema = TrainedModelSchema::from(&sample_model());
        schema.format_version = MODEL_FORMAT_VERSION + 1;
        assert!(matches!(
            TrainedModel::try_from(schema),
            Err(ReadError::UnsupportedVersion { .. })
        ));
    }
}
