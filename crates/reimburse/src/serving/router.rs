//! Per-case routing with blend weights.

use crate::config::BlendPolicy;
use crate::data::Case;
use crate::model::ModelRegistry;
use crate::routing::{RoutingTable, Subset};

/// Added to training MSE before inverting it.
pub const INVERSE_ERROR_EPSILON: f64 = 1e-6;

/// One subset and its share of the blended estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLeg {
    pub subset: Subset,
    pub weight: f64,
}

/// The subsets a case is estimated with. The primary leg is always first
/// and weights sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    legs: Vec<RouteLeg>,
}

impl Route {
    fn primary_only(subset: Subset) -> Self {
        Self {
            legs: vec![RouteLeg {
                subset,
                weight: 1.0,
            }],
        }
    }

    fn blended(primary: Subset, specialist: Subset, primary_weight: f64, specialist_weight: f64) -> Self {
        let total = primary_weight + specialist_weight;
        Self {
            legs: vec![
                RouteLeg {
                    subset: primary,
                    weight: primary_weight / total,
                },
                RouteLeg {
                    subset: specialist,
                    weight: specialist_weight / total,
                },
            ],
        }
    }

    pub fn primary(&self) -> RouteLeg {
        self.legs[0]
    }

    pub fn specialist(&self) -> Option<RouteLeg> {
        self.legs.get(1).copied()
    }

    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    pub fn total_weight(&self) -> f64 {
        self.legs.iter().map(|leg| leg.weight).sum()
    }
}

/// Chooses subsets for a case and weights them under a [`BlendPolicy`].
#[derive(Debug, Clone, PartialEq)]
pub struct Router {
    table: RoutingTable,
    policy: BlendPolicy,
}

impl Router {
    pub fn new(table: RoutingTable, policy: BlendPolicy) -> Self {
        Self { table, policy }
    }

    /// Route with the constants `registry` was trained under.
    pub fn for_registry(registry: &ModelRegistry, policy: BlendPolicy) -> Self {
        Self::new(registry.routing_params().table(), policy)
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn policy(&self) -> BlendPolicy {
        self.policy
    }

    /// Route `case` against the ensembles present in `registry`.
    ///
    /// The specialist leg is included only when its ensemble exists. When
    /// the primary ensemble itself is missing the route is primary-only;
    /// estimating it reports the primary as unavailable.
    pub fn route(&self, case: &Case, registry: &ModelRegistry) -> Route {
        let primary = self.table.primary_subset(case);
        let Some(specialist) = self.table.specialist_subset(case) else {
            return Route::primary_only(primary);
        };

        let (Some(primary_model), Some(specialist_model)) =
            (registry.get(primary), registry.get(specialist))
        else {
            tracing::debug!(%primary, %specialist, "specialist not available, primary only");
            return Route::primary_only(primary);
        };

        match self.policy {
            BlendPolicy::Fixed {
                primary: p,
                specialist: s,
            } => Route::blended(primary, specialist, p, s),
            BlendPolicy::InverseError => Route::blended(
                primary,
                specialist,
                inverse_error(primary_model.train_mse()),
                inverse_error(specialist_model.train_mse()),
            ),
        }
    }
}

#[inline]
fn inverse_error(mse: f64) -> f64 {
    1.0 / (mse + INVERSE_ERROR_EPSILON)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;
    use crate::features::{FeatureParams, FeatureSchema};
    use crate::model::{Ensemble, TrainedModel};
    use crate::repr::Tree;
    use crate::routing::RoutingParams;
    use crate::training::TreeParams;

    fn ensemble(subset: Subset, train_mse: f64) -> Ensemble {
        let member = TrainedModel::new(
            subset,
            0,
            42,
            FeatureSchema::current(),
            TreeParams::default(),
            25,
            Tree::constant(100.0),
        );
        Ensemble::new(subset, vec![member], train_mse)
    }

    fn registry(subsets: &[(Subset, f64)]) -> ModelRegistry {
        let mut registry = ModelRegistry::new(
            FeatureSchema::current(),
            FeatureParams::default(),
            RoutingParams::default(),
        );
        for &(subset, mse) in subsets {
            registry.insert(ensemble(subset, mse));
        }
        registry
    }

    fn standard_router(policy: BlendPolicy) -> Router {
        Router::new(RoutingTable::standard(1400.0, 2, 8), policy)
    }

    #[rstest]
    #[case(1, 500.0, Subset::Main, Some(Subset::Short))]
    #[case(5, 500.0, Subset::Main, None)]
    #[case(10, 500.0, Subset::Main, Some(Subset::Long))]
    #[case(2, 1400.01, Subset::Outlier, Some(Subset::Short))]
    #[case(9, 2000.0, Subset::Outlier, Some(Subset::Long))]
    fn fixed_weights(
        #[case] days: u32,
        #[case] receipts: f64,
        #[case] primary: Subset,
        #[case] specialist: Option<Subset>,
    ) {
        let registry = registry(&[
            (Subset::Main, 1.0),
            (Subset::Outlier, 1.0),
            (Subset::Short, 1.0),
            (Subset::Long, 1.0),
        ]);
        let route = standard_router(BlendPolicy::default())
            .route(&Case::new(days, 300.0, receipts).unwrap(), &registry);

        assert_eq!(route.primary().subset, primary);
        assert_eq!(route.specialist().map(|l| l.subset), specialist);
        match route.specialist() {
            Some(leg) => {
                assert_relative_eq!(route.primary().weight, 0.8);
                assert_relative_eq!(leg.weight, 0.2);
            }
            None => assert_eq!(route.primary().weight, 1.0),
        }
        assert_relative_eq!(route.total_weight(), 1.0);
    }

    #[test]
    fn missing_specialist_gives_primary_full_weight() {
        let registry = registry(&[(Subset::Main, 1.0)]);
        let route = standard_router(BlendPolicy::default())
            .route(&Case::new(1, 100.0, 20.0).unwrap(), &registry);
        assert_eq!(route.legs().len(), 1);
        assert_eq!(route.primary().weight, 1.0);
    }

    #[test]
    fn fixed_weights_are_renormalized() {
        let registry = registry(&[(Subset::Main, 1.0), (Subset::Long, 1.0)]);
        let policy = BlendPolicy::Fixed {
            primary: 0.6,
            specialist: 0.6,
        };
        let route = standard_router(policy).route(&Case::new(8, 0.0, 0.0).unwrap(), &registry);
        assert_eq!(route.primary().weight, 0.5);
        assert_eq!(route.specialist().map(|l| l.weight), Some(0.5));
    }

    #[test]
    fn inverse_error_favours_lower_mse() {
        let registry = registry(&[(Subset::Main, 3.0), (Subset::Short, 1.0)]);
        let route = standard_router(BlendPolicy::InverseError)
            .route(&Case::new(2, 50.0, 10.0).unwrap(), &registry);

        let specialist = route.specialist().unwrap();
        assert!(specialist.weight > route.primary().weight);
        assert_relative_eq!(specialist.weight, 0.75, epsilon = 1e-6);
        assert_relative_eq!(route.total_weight(), 1.0);
    }

    #[test]
    fn registry_constants_decide_the_route() {
        let routing = RoutingParams {
            outlier_threshold: 500.0,
            short_trip_max_days: 3,
            long_trip_min_days: 10,
        };
        let mut registry =
            ModelRegistry::new(FeatureSchema::current(), FeatureParams::default(), routing);
        for subset in Subset::ALL {
            registry.insert(ensemble(subset, 1.0));
        }
        let router = Router::for_registry(&registry, BlendPolicy::default());

        let route = router.route(&Case::new(3, 100.0, 900.0).unwrap(), &registry);
        assert_eq!(route.primary().subset, Subset::Outlier);
        assert_eq!(route.specialist().map(|l| l.subset), Some(Subset::Short));

        let route = router.route(&Case::new(9, 100.0, 100.0).unwrap(), &registry);
        assert_eq!(route.primary().subset, Subset::Main);
        assert_eq!(route.specialist(), None);
    }
}
