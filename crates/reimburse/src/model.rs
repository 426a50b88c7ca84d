//! Trained models and the per-subset registry.
//!
//! - [`TrainedModel`]: one fitted tree plus the facts needed to trust it
//! - [`Ensemble`]: the members trained for a subset, differing only by seed
//! - [`ModelRegistry`]: every subset's ensemble, or why it has none

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::UnavailableModelError;
use crate::features::{FeatureParams, FeatureSchema};
use crate::repr::Tree;
use crate::routing::{RoutingParams, Subset};
use crate::training::TreeParams;

// =============================================================================
// TrainedModel
// =============================================================================

/// A fitted regression tree with its provenance.
///
/// Never mutated after training; a retrain replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    subset: Subset,
    member: usize,
    seed: u64,
    schema: FeatureSchema,
    params: TreeParams,
    n_samples: usize,
    tree: Tree,
}

impl TrainedModel {
    pub fn new(
        subset: Subset,
        member: usize,
        seed: u64,
        schema: FeatureSchema,
        params: TreeParams,
        n_samples: usize,
        tree: Tree,
    ) -> Self {
        Self {
            subset,
            member,
            seed,
            schema,
            params,
            n_samples,
            tree,
        }
    }

    pub fn subset(&self) -> Subset {
        self.subset
    }

    /// Position within the subset's ensemble.
    pub fn member(&self) -> usize {
        self.member
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Ordered feature names the tree was fit on.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.tree.predict_row(features)
    }
}

// =============================================================================
// Ensemble
// =============================================================================

/// The trained members of one subset.
#[derive(Debug, Clone, PartialEq)]
pub struct Ensemble {
    subset: Subset,
    members: Vec<TrainedModel>,
    train_mse: f64,
}

impl Ensemble {
    /// `train_mse` is the in-sample mean squared error of the ensemble mean.
    pub fn new(subset: Subset, members: Vec<TrainedModel>, train_mse: f64) -> Self {
        debug_assert!(!members.is_empty());
        debug_assert!(members.iter().all(|m| m.subset() == subset));
        Self {
            subset,
            members,
            train_mse,
        }
    }

    pub(crate) fn with_train_mse(mut self, train_mse: f64) -> Self {
        self.train_mse = train_mse;
        self
    }

    pub fn subset(&self) -> Subset {
        self.subset
    }

    pub fn members(&self) -> &[TrainedModel] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn train_mse(&self) -> f64 {
        self.train_mse
    }

    /// Unweighted mean of member predictions, summed in member order.
    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        let sum: f64 = self.members.iter().map(|m| m.predict(features)).sum();
        sum / self.members.len() as f64
    }
}

// =============================================================================
// ModelRegistry
// =============================================================================

/// Everything a training run produced.
///
/// Records the feature and routing constants the ensembles were fit under,
/// the ensembles themselves, and a reason for every subset that has none.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRegistry {
    schema: FeatureSchema,
    features: FeatureParams,
    routing: RoutingParams,
    ensembles: BTreeMap<Subset, Arc<Ensemble>>,
    unavailable: BTreeMap<Subset, String>,
}

impl ModelRegistry {
    pub fn new(schema: FeatureSchema, features: FeatureParams, routing: RoutingParams) -> Self {
        Self {
            schema,
            features,
            routing,
            ensembles: BTreeMap::new(),
            unavailable: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, ensemble: Ensemble) {
        let subset = ensemble.subset();
        self.unavailable.remove(&subset);
        self.ensembles.insert(subset, Arc::new(ensemble));
    }

    pub fn mark_unavailable(&mut self, subset: Subset, reason: impl Into<String>) {
        self.ensembles.remove(&subset);
        self.unavailable.insert(subset, reason.into());
    }

    pub fn get(&self, subset: Subset) -> Option<&Arc<Ensemble>> {
        self.ensembles.get(&subset)
    }

    pub fn contains(&self, subset: Subset) -> bool {
        self.ensembles.contains_key(&subset)
    }

    /// The subset's ensemble, or why there is none.
    pub fn require(&self, subset: Subset) -> Result<&Arc<Ensemble>, UnavailableModelError> {
        self.ensembles.get(&subset).ok_or_else(|| {
            let reason = self
                .unavailable
                .get(&subset)
                .cloned()
                .unwrap_or_else(|| "no model trained for this subset".to_string());
            UnavailableModelError::for_subset(subset, reason)
        })
    }

    pub fn ensembles(&self) -> impl Iterator<Item = &Arc<Ensemble>> {
        self.ensembles.values()
    }

    pub fn trained_subsets(&self) -> Vec<Subset> {
        self.ensembles.keys().copied().collect()
    }

    pub fn unavailable(&self) -> &BTreeMap<Subset, String> {
        &self.unavailable
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn feature_params(&self) -> &FeatureParams {
        &self.features
    }

    pub fn routing_params(&self) -> &RoutingParams {
        &self.routing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_member(subset: Subset, member: usize, value: f64) -> TrainedModel {
        TrainedModel::new(
            subset,
            member,
            member as u64,
            FeatureSchema::current(),
            TreeParams::default(),
            10,
            Tree::constant(value),
        )
    }

    #[test]
    fn ensemble_mean() {
        let ensemble = Ensemble::new(
            Subset::Main,
            vec![
                constant_member(Subset::Main, 0, 100.0),
                constant_member(Subset::Main, 1, 200.0),
                constant_member(Subset::Main, 2, 600.0),
            ],
            1.5,
        );
        assert_eq!(ensemble.len(), 3);
        assert_eq!(ensemble.predict(&[0.0; 19]), 300.0);
        assert_eq!(ensemble.train_mse(), 1.5);
    }

    #[test]
    fn registry_require_reports_reason() {
        let mut registry = ModelRegistry::new(
            FeatureSchema::current(),
            FeatureParams::default(),
            RoutingParams::default(),
        );
        registry.mark_unavailable(Subset::Short, "7 cases, need 20");

        let err = registry.require(Subset::Short).unwrap_err();
        assert_eq!(err.subset, Some(Subset::Short));
        assert_eq!(err.reason, "7 cases, need 20");

        let err = registry.require(Subset::Long).unwrap_err();
        assert_eq!(err.reason, "no model trained for this subset");
    }

    #[test]
    fn insert_clears_unavailable() {
        let mut registry = ModelRegistry::new(
            FeatureSchema::current(),
            FeatureParams::default(),
            RoutingParams::default(),
        );
        registry.mark_unavailable(Subset::Main, "failed");
        registry.insert(Ensemble::new(
            Subset::Main,
            vec![constant_member(Subset::Main, 0, 1.0)],
            0.0,
        ));
        assert!(registry.contains(Subset::Main));
        assert!(registry.unavailable().is_empty());
        assert_eq!(registry.trained_subsets(), vec![Subset::Main]);
    }
}
