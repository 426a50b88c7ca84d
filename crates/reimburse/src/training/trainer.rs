//! Ensemble training.
//!
//! - [`TrainingSet`]: one subset's feature matrix and targets
//! - [`TreeTrainer`]: fits single trees and seed ensembles
//! - [`train_registry`]: partitions a corpus and trains every subset

use ndarray::{Array1, Array2};
use thiserror::Error;

use super::grower::TreeGrower;
use super::logger::TrainingLogger;
use super::metrics::{MetricFn, Mse};
use super::params::{ParamValidationError, TreeParams};
use super::partition::DatasetPartitioner;
use crate::config::PipelineConfig;
use crate::data::{Corpus, LabeledCase};
use crate::features::{FeatureSchema, FeatureTransformer};
use crate::model::{Ensemble, ModelRegistry, TrainedModel};
use crate::routing::Subset;
use crate::utils::{Parallelism, run_with_threads};

// =============================================================================
// TrainingError
// =============================================================================

/// A subset could not be trained.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("subset {subset} has {n_samples} cases, at least 2 are required")]
    TooFewSamples { subset: Subset, n_samples: usize },

    #[error("subset {subset}: no feature varies across its {n_samples} cases")]
    ZeroFeatureVariance { subset: Subset, n_samples: usize },

    #[error("subset {subset}: target of case {row} is not finite")]
    NonFiniteTarget { subset: Subset, row: usize },

    #[error("subset {subset}: no ensemble seeds given")]
    NoSeeds { subset: Subset },

    #[error("subset {subset}: {source}")]
    InvalidParams {
        subset: Subset,
        #[source]
        source: ParamValidationError,
    },
}

impl TrainingError {
    pub fn subset(&self) -> Subset {
        match self {
            Self::TooFewSamples { subset, .. }
            | Self::ZeroFeatureVariance { subset, .. }
            | Self::NonFiniteTarget { subset, .. }
            | Self::NoSeeds { subset }
            | Self::InvalidParams { subset, .. } => *subset,
        }
    }
}

// =============================================================================
// TrainingSet
// =============================================================================

/// Transformed training data for one subset.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    subset: Subset,
    schema: FeatureSchema,
    /// `[n_samples, n_features]`
    features: Array2<f64>,
    targets: Array1<f64>,
}

impl TrainingSet {
    pub fn from_cases(
        subset: Subset,
        cases: &[LabeledCase],
        transformer: &FeatureTransformer,
    ) -> Self {
        let inputs: Vec<_> = cases.iter().map(|c| c.case).collect();
        Self {
            subset,
            schema: transformer.schema(),
            features: transformer.transform_batch(&inputs),
            targets: cases.iter().map(|c| c.expected).collect(),
        }
    }

    pub fn subset(&self) -> Subset {
        self.subset
    }

    pub fn n_samples(&self) -> usize {
        self.targets.len()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn targets(&self) -> &Array1<f64> {
        &self.targets
    }

    fn check(&self) -> Result<(), TrainingError> {
        let n_samples = self.n_samples();
        if n_samples < 2 {
            return Err(TrainingError::TooFewSamples {
                subset: self.subset,
                n_samples,
            });
        }
        if let Some(row) = self.targets.iter().position(|t| !t.is_finite()) {
            return Err(TrainingError::NonFiniteTarget {
                subset: self.subset,
                row,
            });
        }
        let any_varies = self.features.columns().into_iter().any(|col| {
            let first = col[0];
            col.iter().any(|&v| v != first)
        });
        if !any_varies {
            return Err(TrainingError::ZeroFeatureVariance {
                subset: self.subset,
                n_samples,
            });
        }
        Ok(())
    }
}

// =============================================================================
// TreeTrainer
// =============================================================================

/// Fits regression trees with fixed structure limits.
#[derive(Debug, Clone, Copy)]
pub struct TreeTrainer {
    params: TreeParams,
}

impl TreeTrainer {
    pub fn new(params: TreeParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    /// Fit one tree. Deterministic in `(set, seed, params)`.
    pub fn fit(
        &self,
        set: &TrainingSet,
        member: usize,
        seed: u64,
    ) -> Result<TrainedModel, TrainingError> {
        self.check(set)?;
        Ok(self.fit_unchecked(set, member, seed))
    }

    /// Fit one member per seed. Members are ordered as `seeds`.
    pub fn fit_ensemble(
        &self,
        set: &TrainingSet,
        seeds: &[u64],
        parallelism: Parallelism,
    ) -> Result<Ensemble, TrainingError> {
        self.check(set)?;
        if seeds.is_empty() {
            return Err(TrainingError::NoSeeds {
                subset: set.subset(),
            });
        }

        let jobs: Vec<(usize, u64)> = seeds.iter().copied().enumerate().collect();
        let members = parallelism.maybe_par_map(jobs, |(member, seed)| {
            self.fit_unchecked(set, member, seed)
        });
        let ensemble = Ensemble::new(set.subset(), members, 0.0);

        let predictions: Array1<f64> = set
            .features()
            .rows()
            .into_iter()
            .map(|row| match row.as_slice() {
                Some(slice) => ensemble.predict(slice),
                None => ensemble.predict(&row.to_vec()),
            })
            .collect();
        let train_mse = Mse.compute(predictions.view(), set.targets().view());

        Ok(ensemble.with_train_mse(train_mse))
    }

    fn check(&self, set: &TrainingSet) -> Result<(), TrainingError> {
        self.params
            .validate()
            .map_err(|source| TrainingError::InvalidParams {
                subset: set.subset(),
                source,
            })?;
        set.check()
    }

    fn fit_unchecked(&self, set: &TrainingSet, member: usize, seed: u64) -> TrainedModel {
        let tree = TreeGrower::new(self.params, set.features().view(), set.targets().view())
            .grow(seed);
        TrainedModel::new(
            set.subset(),
            member,
            seed,
            set.schema.clone(),
            self.params,
            set.n_samples(),
            tree,
        )
    }
}

// =============================================================================
// Registry training
// =============================================================================

/// Train every subset of `corpus` under `config`.
///
/// Skipped specialists and subsets whose training fails are recorded as
/// unavailable with a reason. Fails only when no primary subset could be
/// trained, returning the first primary failure.
pub fn train_registry(
    corpus: &Corpus,
    config: &PipelineConfig,
) -> Result<ModelRegistry, TrainingError> {
    let mut logger = TrainingLogger::new(config.verbosity);
    logger.start_training(corpus.len(), config.ensemble_seeds.len());

    let transformer = config.transformer();
    let table = config.routing_table();
    let partition =
        DatasetPartitioner::new(&table, config.min_specialist_samples).partition(corpus.cases());

    let mut registry =
        ModelRegistry::new(transformer.schema(), config.features, config.routing_params());
    for skipped in partition.skipped() {
        logger.log_skipped(skipped.subset, skipped.n_samples, skipped.min_samples);
        registry.mark_unavailable(skipped.subset, skipped.reason());
    }

    let mut primary_failures = Vec::new();
    run_with_threads(config.n_threads, |parallelism| {
        for (subset, cases) in partition.subsets() {
            logger.log_partition(subset, cases.len());
            let set = TrainingSet::from_cases(subset, cases, &transformer);
            let trainer = TreeTrainer::new(*config.tree_params(subset));

            match trainer.fit_ensemble(&set, &config.ensemble_seeds, parallelism) {
                Ok(ensemble) => {
                    for member in ensemble.members() {
                        logger.log_member(
                            subset,
                            member.member(),
                            member.seed(),
                            member.tree().n_nodes(),
                            member.tree().depth(),
                        );
                    }
                    logger.log_ensemble(subset, ensemble.len(), ensemble.train_mse());
                    registry.insert(ensemble);
                }
                Err(err) => {
                    logger.log_failure(subset, &err);
                    registry.mark_unavailable(subset, err.to_string());
                    if subset.is_primary() {
                        primary_failures.push(err);
                    }
                }
            }
        }
    });

    if !table
        .primary_subsets()
        .into_iter()
        .any(|s| registry.contains(s))
        && let Some(first) = primary_failures.into_iter().next()
    {
        return Err(first);
    }

    logger.finish_training(registry.trained_subsets().len(), registry.unavailable().len());
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Case;

    fn labeled(days: u32, miles: f64, receipts: f64, expected: f64) -> LabeledCase {
        LabeledCase::new(Case::new(days, miles, receipts).unwrap(), expected).unwrap()
    }

    fn small_set() -> TrainingSet {
        let cases: Vec<_> = (1..=12)
            .map(|i| labeled(i % 5 + 1, (i * 40) as f64, (i * 55) as f64, (i * 100) as f64))
            .collect();
        TrainingSet::from_cases(Subset::Main, &cases, &FeatureTransformer::default())
    }

    #[test]
    fn fit_is_deterministic() {
        let set = small_set();
        let trainer = TreeTrainer::new(TreeParams::new(6, 1));
        let a = trainer.fit(&set, 0, 42).unwrap();
        let b = trainer.fit(&set, 0, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_samples(), 12);
        assert_eq!(a.schema(), &FeatureSchema::current());
    }

    #[test]
    fn ensemble_members_follow_seed_order() {
        let set = small_set();
        let trainer = TreeTrainer::new(TreeParams::new(6, 1));
        let seeds = [42, 123, 456];
        let seq = trainer
            .fit_ensemble(&set, &seeds, Parallelism::Sequential)
            .unwrap();
        let par = trainer
            .fit_ensemble(&set, &seeds, Parallelism::Parallel)
            .unwrap();

        assert_eq!(seq, par);
        let got: Vec<u64> = seq.members().iter().map(|m| m.seed()).collect();
        assert_eq!(got, seeds.to_vec());
        assert!(seq.train_mse() >= 0.0);
    }

    #[test]
    fn too_few_samples() {
        let cases = vec![labeled(3, 10.0, 10.0, 5.0)];
        let set = TrainingSet::from_cases(Subset::Outlier, &cases, &FeatureTransformer::default());
        let err = TreeTrainer::new(TreeParams::default())
            .fit(&set, 0, 1)
            .unwrap_err();
        assert_eq!(
            err,
            TrainingError::TooFewSamples {
                subset: Subset::Outlier,
                n_samples: 1
            }
        );
        assert_eq!(err.subset(), Subset::Outlier);
    }

    #[test]
    fn zero_feature_variance() {
        let cases = vec![labeled(3, 10.0, 10.0, 5.0), labeled(3, 10.0, 10.0, 9.0)];
        let set = TrainingSet::from_cases(Subset::Short, &cases, &FeatureTransformer::default());
        let err = TreeTrainer::new(TreeParams::default())
            .fit_ensemble(&set, &[1, 2], Parallelism::Sequential)
            .unwrap_err();
        assert!(matches!(err, TrainingError::ZeroFeatureVariance { n_samples: 2, .. }));
    }

    #[test]
    fn invalid_params_are_training_errors() {
        let err = TreeTrainer::new(TreeParams::new(0, 1))
            .fit(&small_set(), 0, 1)
            .unwrap_err();
        assert!(matches!(err, TrainingError::InvalidParams { .. }));
    }

    #[test]
    fn empty_seed_list() {
        let err = TreeTrainer::new(TreeParams::default())
            .fit_ensemble(&small_set(), &[], Parallelism::Sequential)
            .unwrap_err();
        assert_eq!(err, TrainingError::NoSeeds { subset: Subset::Main });
    }
}
