//! Router laws over arbitrary cases, policies and registries.

use approx::assert_relative_eq;
use proptest::prelude::*;

use reimburse::config::BlendPolicy;
use reimburse::data::{Case, Corpus, LabeledCase};
use reimburse::features::{FeatureParams, FeatureSchema};
use reimburse::model::{Ensemble, ModelRegistry, TrainedModel};
use reimburse::repr::Tree;
use reimburse::routing::{RoutingParams, RoutingTable, Subset};
use reimburse::serving::Router;
use reimburse::training::{DatasetPartitioner, TreeParams};

fn registry(present: &[bool; 4], mses: &[f64; 4]) -> ModelRegistry {
    let mut registry = ModelRegistry::new(
        FeatureSchema::current(),
        FeatureParams::default(),
        RoutingParams::default(),
    );
    for ((subset, &keep), &mse) in Subset::ALL.iter().zip(present).zip(mses) {
        if keep {
            let member = TrainedModel::new(
                *subset,
                0,
                7,
                FeatureSchema::current(),
                TreeParams::default(),
                20,
                Tree::constant(1.0),
            );
            registry.insert(Ensemble::new(*subset, vec![member], mse));
        }
    }
    registry
}

fn arb_policy() -> impl Strategy<Value = BlendPolicy> {
    prop_oneof![
        Just(BlendPolicy::default()),
        Just(BlendPolicy::InverseError),
        (0.01f64..=1.0, 0.01f64..=1.0)
            .prop_map(|(primary, specialist)| BlendPolicy::Fixed { primary, specialist }),
    ]
}

proptest! {
    #[test]
    fn weights_sum_to_one(
        days in 1u32..=20,
        miles in 0.0f64..1500.0,
        receipts in 0.0f64..3000.0,
        present in prop::array::uniform4(any::<bool>()),
        mses in prop::array::uniform4(0.0f64..5000.0),
        policy in arb_policy(),
    ) {
        let case = Case::new(days, miles, receipts).expect("valid case");
        let table = RoutingTable::standard(1400.0, 2, 8);
        let router = Router::new(table.clone(), policy);
        let route = router.route(&case, &registry(&present, &mses));

        assert_relative_eq!(route.total_weight(), 1.0, epsilon = 1e-12);
        prop_assert!(route.legs().len() <= 2);
        prop_assert_eq!(route.primary().subset, table.primary_subset(&case));
        prop_assert!(route.primary().subset.is_primary());
        if let Some(specialist) = route.specialist() {
            prop_assert!(!specialist.subset.is_primary());
            prop_assert!(route.primary().weight > 0.0 && specialist.weight > 0.0);
        }
    }
}

#[test]
fn partitioner_and_router_agree_on_subsets() {
    let cases = [
        (1, 10.0, 50.0),
        (2, 10.0, 1500.0),
        (5, 300.0, 1400.0),
        (5, 300.0, 1400.01),
        (8, 900.0, 200.0),
        (14, 900.0, 2400.0),
    ];
    let corpus: Corpus = cases
        .iter()
        .map(|&(d, m, r)| {
            LabeledCase::new(Case::new(d, m, r).expect("valid case"), 100.0)
                .expect("valid label")
        })
        .collect();

    let table = RoutingTable::standard(1400.0, 2, 8);
    let partition = DatasetPartitioner::new(&table, 0).partition(corpus.cases());

    for labeled in corpus.iter() {
        let primary = table.primary_subset(&labeled.case);
        let members = partition.get(primary).expect("primary subset present");
        assert!(members.contains(labeled));
        if let Some(specialist) = table.specialist_subset(&labeled.case) {
            assert!(partition.get(specialist).expect("specialist present").contains(labeled));
        }
    }
    assert_eq!(partition.get(Subset::Outlier).map(<[_]>::len), Some(3));
}
