//! Blended estimates over the model store.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use ndarray::ArrayView1;

use super::router::{Route, RouteLeg, Router};
use super::store::ModelStore;
use crate::config::BlendPolicy;
use crate::data::Case;
use crate::error::{Error, Result, UnavailableModelError};
use crate::features::FeatureTransformer;
use crate::model::{Ensemble, ModelRegistry};
use crate::routing::Subset;
use crate::utils::Parallelism;

/// Per-day rate of the fallback formula.
pub const FALLBACK_PER_DAY: f64 = 100.0;
/// Per-mile rate of the fallback formula.
pub const FALLBACK_PER_MILE: f64 = 0.6;
/// Receipt rate of the fallback formula.
pub const FALLBACK_RECEIPT_RATE: f64 = 0.8;

/// Closed-form estimate for when no model is available:
/// `days * 100 + miles * 0.6 + receipts * 0.8`.
pub fn fallback_estimate(case: &Case) -> f64 {
    case.days() as f64 * FALLBACK_PER_DAY
        + case.miles() * FALLBACK_PER_MILE
        + case.receipts() * FALLBACK_RECEIPT_RATE
}

// =============================================================================
// Prediction types
// =============================================================================

/// One subset's part in a blended estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub subset: Subset,
    pub weight: f64,
    /// Mean of the subset's ensemble members.
    pub estimate: f64,
}

/// A blended estimate with the per-subset estimates behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub amount: f64,
    pub contributions: Vec<Contribution>,
}

/// Where an [`Estimate`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub amount: f64,
    pub source: EstimateSource,
}

// =============================================================================
// Predictor
// =============================================================================

/// Outcome of one case in a batch.
pub type CaseEstimate<T = f64> = std::result::Result<T, UnavailableModelError>;

/// Router and transformer built from the constants a registry was trained under.
#[derive(Debug, Clone)]
struct ServingPlan {
    router: Router,
    transformer: FeatureTransformer,
}

impl ServingPlan {
    fn for_registry(registry: &ModelRegistry, policy: BlendPolicy) -> Self {
        Self {
            router: Router::for_registry(registry, policy),
            transformer: FeatureTransformer::new(*registry.feature_params()),
        }
    }
}

/// Transforms, routes and blends.
///
/// Routing thresholds and feature constants are taken from the registry the
/// store serves, never from the current config, so a case is routed and
/// transformed exactly as its subset's training cases were.
#[derive(Debug, Clone)]
pub struct Predictor {
    store: Arc<ModelStore>,
    policy: BlendPolicy,
    plan: OnceLock<ServingPlan>,
}

impl Predictor {
    /// The blend policy comes from the store's config.
    pub fn new(store: Arc<ModelStore>) -> Self {
        let policy = store.config().blend;
        Self {
            store,
            policy,
            plan: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn policy(&self) -> BlendPolicy {
        self.policy
    }

    /// Estimate the reimbursement for one trip.
    pub fn estimate(&self, days: u32, miles: f64, receipts: f64) -> Result<f64> {
        let case = Case::new(days, miles, receipts)?;
        self.estimate_case(&case)
    }

    pub fn estimate_case(&self, case: &Case) -> Result<f64> {
        Ok(self.explain(case)?.amount)
    }

    /// Estimate with its per-subset contributions.
    pub fn explain(&self, case: &Case) -> Result<Prediction> {
        let registry = self.store.registry()?;
        self.explain_with(&registry, case)
    }

    /// Model estimate, or the fallback formula when no model is available.
    ///
    /// Errors other than an unavailable model are returned.
    pub fn estimate_or_fallback(&self, case: &Case) -> Result<Estimate> {
        match self.estimate_case(case) {
            Ok(amount) => Ok(Estimate {
                amount,
                source: EstimateSource::Model,
            }),
            Err(Error::UnavailableModel(err)) => {
                tracing::warn!(error = %err, "using fallback estimate");
                Ok(fallback(case))
            }
            Err(err) => Err(err),
        }
    }

    /// Estimate many cases.
    ///
    /// Features are computed in one batch and each subset's ensemble runs
    /// over the rows routed to it. Every element equals what
    /// [`Predictor::estimate_case`] returns for that case: a case routed to
    /// an unavailable subset fails alone. The outer error is reserved for
    /// failing to populate the store.
    pub fn estimate_batch(
        &self,
        cases: &[Case],
        parallelism: Parallelism,
    ) -> Result<Vec<CaseEstimate>> {
        if cases.is_empty() {
            return Ok(Vec::new());
        }
        let registry = self.store.registry()?;
        let plan = self.plan(&registry);
        let features = plan.transformer.transform_batch(cases);
        let routes: Vec<Route> = cases
            .iter()
            .map(|case| plan.router.route(case, &registry))
            .collect();

        // Rows per subset, in case order.
        let mut groups: BTreeMap<Subset, Vec<usize>> = BTreeMap::new();
        for (row, route) in routes.iter().enumerate() {
            for leg in route.legs() {
                groups.entry(leg.subset).or_default().push(row);
            }
        }

        let mut estimates: BTreeMap<Subset, CaseEstimate<Vec<f64>>> = BTreeMap::new();
        for (&subset, rows) in &groups {
            let values = registry.require(subset).map(|ensemble| {
                parallelism.maybe_par_map(rows.as_slice(), |&row| {
                    predict_row(ensemble, features.row(row))
                })
            });
            estimates.insert(subset, values);
        }

        // Scatter back, consuming each subset's estimates in row order.
        let mut cursors: BTreeMap<Subset, usize> = BTreeMap::new();
        let outcomes = routes
            .iter()
            .map(|route| -> CaseEstimate {
                let legs: Vec<(RouteLeg, usize)> = route
                    .legs()
                    .iter()
                    .map(|&leg| {
                        let cursor = cursors.entry(leg.subset).or_default();
                        let row = *cursor;
                        *cursor += 1;
                        (leg, row)
                    })
                    .collect();

                let contributions = legs
                    .into_iter()
                    .map(|(leg, row)| -> CaseEstimate<Contribution> {
                        let values = estimates[&leg.subset].as_ref().map_err(Clone::clone)?;
                        Ok(Contribution {
                            subset: leg.subset,
                            weight: leg.weight,
                            estimate: values[row],
                        })
                    })
                    .collect::<CaseEstimate<Vec<_>>>()?;
                Ok(blend(&contributions))
            })
            .collect();
        Ok(outcomes)
    }

    /// [`Predictor::estimate_or_fallback`] over many cases.
    pub fn estimate_batch_or_fallback(
        &self,
        cases: &[Case],
        parallelism: Parallelism,
    ) -> Result<Vec<Estimate>> {
        let outcomes = match self.estimate_batch(cases, parallelism) {
            Ok(outcomes) => outcomes,
            Err(Error::UnavailableModel(err)) => {
                tracing::warn!(error = %err, n_cases = cases.len(), "using fallback estimates");
                return Ok(cases.iter().map(fallback).collect());
            }
            Err(err) => return Err(err),
        };

        let mut n_fallback = 0usize;
        let estimates = cases
            .iter()
            .zip(outcomes)
            .map(|(case, outcome)| match outcome {
                Ok(amount) => Estimate {
                    amount,
                    source: EstimateSource::Model,
                },
                Err(_) => {
                    n_fallback += 1;
                    fallback(case)
                }
            })
            .collect();
        if n_fallback > 0 {
            tracing::warn!(n_fallback, n_cases = cases.len(), "using fallback estimates");
        }
        Ok(estimates)
    }

    /// Non-blocking estimate: fails instead of waiting for population.
    pub fn try_estimate_now(&self, case: &Case) -> Result<f64> {
        let registry = self.store.peek()?;
        Ok(self.explain_with(&registry, case)?.amount)
    }

    /// The store never replaces a published registry, so the plan built
    /// from the first one stays valid.
    fn plan(&self, registry: &ModelRegistry) -> &ServingPlan {
        self.plan
            .get_or_init(|| ServingPlan::for_registry(registry, self.policy))
    }

    fn explain_with(&self, registry: &ModelRegistry, case: &Case) -> Result<Prediction> {
        let plan = self.plan(registry);
        let features = plan.transformer.transform(case);
        let route = plan.router.route(case, registry);

        let contributions = route
            .legs()
            .iter()
            .map(|leg| -> Result<Contribution> {
                let ensemble = registry.require(leg.subset)?;
                Ok(Contribution {
                    subset: leg.subset,
                    weight: leg.weight,
                    estimate: ensemble.predict(features.as_slice()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Prediction {
            amount: blend(&contributions),
            contributions,
        })
    }
}

fn fallback(case: &Case) -> Estimate {
    Estimate {
        amount: fallback_estimate(case),
        source: EstimateSource::Fallback,
    }
}

/// Weighted sum in route order.
#[inline]
fn blend(contributions: &[Contribution]) -> f64 {
    contributions
        .iter()
        .fold(0.0, |acc, c| acc + c.weight * c.estimate)
}

#[inline]
fn predict_row(ensemble: &Ensemble, row: ArrayView1<f64>) -> f64 {
    match row.as_slice() {
        Some(slice) => ensemble.predict(slice),
        None => ensemble.predict(&row.to_vec()),
    }
}
